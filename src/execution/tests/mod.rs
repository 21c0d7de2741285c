//! Unit tests for the execution module.

mod remote_tests;
