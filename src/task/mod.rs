//! Task lifecycle and the priority queue feeding the dispatcher.
//!
//! - Domain types in [`domain`]
//! - The queue service in [`services`]

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
