//! Unit tests for the agent module.

mod registry_tests;
mod selector_tests;
