//! ferrosplice Testing Suite
//!
//! This crate provides integration tests and benchmarks for the ferrosplice
//! workspace, plus the loopback fixtures they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared test utilities
///
/// Loopback socket pairs, deterministic payloads and a proxy harness used by
/// both the integration tests and the benchmarks.
pub mod test_utils;
