//! Shared utilities.
//!
//! Content hashing for freshness checks, and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
