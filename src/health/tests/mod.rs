//! Unit tests for the health monitor.
