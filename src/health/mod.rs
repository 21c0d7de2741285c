//! Periodic and on-demand agent health probing.
//!
//! The monitor probes every registered agent through the executor matching
//! its kind and feeds the outcome into the registry's health state machine.
//! Thresholds live on [`crate::agent::domain::HealthPolicy`].

pub mod monitor;

pub use monitor::{HealthCheckReport, HealthMonitor, ProbeOutcome};

#[cfg(test)]
mod tests;
