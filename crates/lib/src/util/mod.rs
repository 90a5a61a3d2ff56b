//! Shared utilities.
//!
//! Content hashing, filesystem helpers and test doubles.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
