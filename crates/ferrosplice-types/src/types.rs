//! Core data types for ferrosplice
//!
//! This module provides the statistics types shared by the engine, the proxy
//! and the command line front-end.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Snapshot of transfer statistics collected by a splice engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransferStats {
    /// Number of transfers requested
    pub attempts: u64,
    /// Transfers the splice path handled
    pub spliced: u64,
    /// Transfers the splice path declined
    pub declined: u64,
    /// Declined transfers completed by the buffered fallback
    pub fallbacks: u64,
    /// Transfers that ended with an error
    pub errors: u64,
    /// Bytes delivered by splice
    pub bytes_spliced: u64,
    /// Bytes delivered by the buffered fallback
    pub bytes_fallback: u64,
}

impl TransferStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes delivered by either path
    pub fn total_bytes(&self) -> u64 {
        self.bytes_spliced + self.bytes_fallback
    }

    /// Fraction of attempts the splice path handled
    pub fn splice_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.spliced as f64 / self.attempts as f64
        }
    }

    /// Fraction of delivered bytes that never transited user space
    pub fn efficiency(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            0.0
        } else {
            self.bytes_spliced as f64 / total as f64
        }
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &TransferStats) {
        self.attempts += other.attempts;
        self.spliced += other.spliced;
        self.declined += other.declined;
        self.fallbacks += other.fallbacks;
        self.errors += other.errors;
        self.bytes_spliced += other.bytes_spliced;
        self.bytes_fallback += other.bytes_fallback;
    }
}
