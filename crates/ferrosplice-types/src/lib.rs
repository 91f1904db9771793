//! Core type system and error handling for ferrosplice
//!
//! This crate provides the foundational types shared by the ferrosplice crates:
//!
//! - **Error handling**: connection-scoped operation errors and a common `Result`
//! - **Configuration values**: validated chunk and pipe sizes, connection timeouts
//! - **Statistics**: transfer counters reported by the engine
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use ferrosplice_types::{ChunkSize, Error, Result};
//!
//! fn chunk_from_flag(size: usize) -> Result<ChunkSize> {
//!     ChunkSize::new(size).map_err(Error::config)
//! }
//!
//! assert!(chunk_from_flag(64 * 1024).is_ok());
//! assert!(chunk_from_flag(16).is_err());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use config::{ChunkSize, PipeSize, TimeoutConfig};
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use types::TransferStats;
