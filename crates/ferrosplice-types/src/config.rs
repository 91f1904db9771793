//! Configuration types for ferrosplice
//!
//! This module provides type-safe configuration values with validation
//! and serialization support.

use std::time::Duration;

/// Upper bound on the bytes a single splice call may move into the relay pipe
///
/// The chunk ceiling must never exceed the capacity of the intermediate pipe:
/// a relay that fills the pipe without draining it can stall permanently.
/// The engine checks this against the real pipe capacity when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct ChunkSize(usize);

impl ChunkSize {
    /// Minimum chunk size (one page)
    pub const MIN: usize = 4 * 1024;
    /// Maximum chunk size (default `/proc/sys/fs/pipe-max-size`)
    pub const MAX: usize = 1024 * 1024;
    /// Default chunk size (default Linux pipe capacity)
    pub const DEFAULT: usize = 64 * 1024;

    /// Create a new chunk size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Chunk size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Chunk size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the chunk size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = String;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<ChunkSize> for usize {
    fn from(size: ChunkSize) -> Self {
        size.0
    }
}

/// Requested capacity for the intermediate relay pipe
///
/// The kernel rounds the request up to a power-of-two number of pages, so the
/// effective capacity is read back after resizing rather than trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "usize", into = "usize"))]
pub struct PipeSize(usize);

impl PipeSize {
    /// Minimum pipe size (one page)
    pub const MIN: usize = 4 * 1024;
    /// Maximum pipe size an unprivileged process may request by default
    pub const MAX: usize = 1024 * 1024;

    /// Create a new pipe size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Pipe size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Pipe size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the pipe size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for PipeSize {
    type Error = String;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<PipeSize> for usize {
    fn from(size: PipeSize) -> Self {
        size.0
    }
}

/// Timeout configuration for proxied connections
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeoutConfig {
    /// Timeout for dialing the upstream
    pub connect_timeout: Duration,
    /// Longest wait for a connection to become readable
    pub read_timeout: Option<Duration>,
    /// Longest wait for a connection to become writable
    pub write_timeout: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ChunkSize::MIN, true)]
    #[case(ChunkSize::DEFAULT, true)]
    #[case(ChunkSize::MAX, true)]
    #[case(100 * 1000, true)]
    #[case(ChunkSize::MIN - 1, false)]
    #[case(ChunkSize::MAX + 1, false)]
    #[case(0, false)]
    fn test_chunk_size_validation(#[case] size: usize, #[case] valid: bool) {
        assert_eq!(ChunkSize::new(size).is_ok(), valid);
    }

    #[rstest]
    #[case(PipeSize::MIN, true)]
    #[case(256 * 1024, true)]
    #[case(PipeSize::MAX, true)]
    #[case(512, false)]
    #[case(4 * 1024 * 1024, false)]
    fn test_pipe_size_validation(#[case] size: usize, #[case] valid: bool) {
        assert_eq!(PipeSize::new(size).is_ok(), valid);
    }

    #[test]
    fn test_chunk_size_default_matches_pipe_capacity() {
        assert_eq!(ChunkSize::default().get(), 64 * 1024);
        assert_eq!(usize::from(ChunkSize::default()), ChunkSize::DEFAULT);
    }

    #[test]
    fn test_timeouts_default_to_no_deadline() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.connect_timeout, Duration::from_secs(30));
        assert!(timeouts.read_timeout.is_none());
        assert!(timeouts.write_timeout.is_none());
    }
}
