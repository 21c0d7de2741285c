//! Domain model for submitted tasks.
//!
//! A task carries an opaque payload to an agent declaring the required
//! capability. The lifecycle only moves forward, except for the return to
//! `pending` when a failed dispatch is retried.

mod error;
mod failure;
mod ids;
mod task;

pub use error::{ParseFailureKindError, ParseTaskStatusError, TaskDomainError};
pub use failure::{FailureKind, TaskFailure};
pub use ids::{Priority, TaskId};
pub use task::{Task, TaskStatus};
