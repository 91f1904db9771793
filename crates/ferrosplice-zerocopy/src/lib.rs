//! Zero-copy socket relays for ferrosplice
//!
//! This crate moves bytes from files and sockets into sockets with the Linux
//! `splice(2)` primitive, relaying through a private kernel pipe so the data
//! never crosses into user space. It includes:
//!
//! - **Connections**: [`Connection`] wraps a TCP stream with per-direction
//!   access tokens, deadlines and half-close helpers
//! - **Endpoint resolution**: [`SpliceSource`] decides up front whether a
//!   reader can be spliced at all
//! - **Transfer engine**: [`SpliceEngine::transfer`] runs the splice loop with
//!   bounded or unbounded budgets
//! - **Fallback**: [`copy_buffered`] and [`SpliceEngine::copy`] cover every
//!   source the splice path declines
//! - **Proxy**: [`proxy()`] relays two connections in both directions
//!
//! # Platform Support
//!
//! Splicing is Linux-only. Elsewhere the engine declines every transfer and
//! [`SpliceEngine::copy`] always takes the buffered path.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ferrosplice_zerocopy::{Budget, Connection, SpliceEngine};
//! use ferrosplice_types::TimeoutConfig;
//!
//! # tokio_test::block_on(async {
//! let engine = SpliceEngine::with_defaults()?;
//! let conn = Connection::connect("127.0.0.1:8080", &TimeoutConfig::default()).await?;
//! let file = std::fs::File::open("payload.bin")?;
//!
//! let outcome = engine.transfer(&file, &conn, Budget::Unbounded).await;
//! if outcome.handled {
//!     println!("Spliced {} bytes", outcome.written);
//! } else {
//!     println!("Splice declined, use a buffered copy");
//! }
//! # Ok::<(), ferrosplice_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod connection;
pub mod copy;
pub mod endpoint;
pub mod engine;
pub mod proxy;

#[cfg(target_os = "linux")]
mod pipe;
#[cfg(target_os = "linux")]
mod sys;

#[cfg(test)]
mod testing;

// Re-export main types
pub use connection::{Connection, Direction};
pub use copy::{copy_buffered, CopyOutcome};
pub use endpoint::{Resolved, SpliceSource};
pub use engine::{Budget, SpliceEngine, TransferOutcome};
pub use proxy::{proxy, DirectionReport, ProxyReport};

#[cfg(target_os = "linux")]
pub use pipe::probe_capacity;
