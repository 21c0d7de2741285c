//! Retry policy decisions.

use crate::coordinator::{RetryDecision, RetryPolicy};
use crate::execution::domain::{ExecutionError, TimeoutPhase};
use crate::task::domain::FailureKind;
use rstest::rstest;
use std::time::Duration;

fn unreachable() -> ExecutionError {
    ExecutionError::Unreachable("refused".to_owned())
}

fn timeout() -> ExecutionError {
    ExecutionError::Timeout {
        phase: TimeoutPhase::Command,
        after: Duration::from_secs(5),
    }
}

#[rstest]
#[case::first_unreachable(unreachable(), 0, true, RetryDecision::RetryElsewhere(FailureKind::Unreachable))]
#[case::first_timeout(timeout(), 0, true, RetryDecision::RetryElsewhere(FailureKind::Timeout))]
#[case::budget_spent(unreachable(), 1, true, RetryDecision::Fail(FailureKind::Unreachable))]
#[case::no_alternate(timeout(), 0, false, RetryDecision::Fail(FailureKind::Timeout))]
#[case::remote_error(
    ExecutionError::RemoteError("exit status 1".to_owned()),
    0,
    true,
    RetryDecision::Fail(FailureKind::RemoteError)
)]
#[case::pool_exhausted(
    ExecutionError::PoolExhausted { host: "build-01".to_owned(), cap: 2 },
    1,
    false,
    RetryDecision::Requeue
)]
#[case::cancelled(ExecutionError::Cancelled, 0, true, RetryDecision::Ignore)]
fn default_policy_decides(
    #[case] error: ExecutionError,
    #[case] failed_attempts: u32,
    #[case] has_alternate: bool,
    #[case] expected: RetryDecision,
) {
    assert_eq!(
        RetryPolicy::default().decide(&error, failed_attempts, has_alternate),
        expected
    );
}

#[rstest]
fn zero_budget_never_retries() {
    assert_eq!(
        RetryPolicy::new(0).decide(&unreachable(), 0, true),
        RetryDecision::Fail(FailureKind::Unreachable)
    );
}
