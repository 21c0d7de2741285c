//! Unit tests for the coordinator.

mod requests_tests;
mod retry_tests;
