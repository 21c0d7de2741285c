//! Task services.

pub mod queue;

pub use queue::{QueueError, QueueResult, TaskQueue};
