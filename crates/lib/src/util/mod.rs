//! Shared utilities.
//!
//! Hashing and filesystem helpers used by the store, extractor and fingerprinting.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
