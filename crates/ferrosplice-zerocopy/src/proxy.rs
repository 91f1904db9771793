//! Bidirectional proxy between two connections
//!
//! Each direction runs as its own task and copies until its source reports
//! end-of-stream. A finished direction half-closes its own channel only: the
//! destination's write half and the source's read half. The other direction
//! keeps running, so a client that stops sending still receives the rest of
//! the response. Both connections are closed once both directions are done.

use crate::connection::Connection;
use crate::engine::{Budget, SpliceEngine};
use ferrosplice_types::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one proxied direction
#[derive(Debug)]
pub struct DirectionReport {
    /// Bytes delivered in this direction
    pub bytes: u64,
    /// Terminal error of this direction, if any
    pub error: Option<Error>,
}

/// Outcome of a proxied session
#[derive(Debug)]
pub struct ProxyReport {
    /// Traffic from the first connection to the second
    pub a_to_b: DirectionReport,
    /// Traffic from the second connection to the first
    pub b_to_a: DirectionReport,
}

impl ProxyReport {
    /// Bytes delivered in both directions
    pub fn total_bytes(&self) -> u64 {
        self.a_to_b.bytes + self.b_to_a.bytes
    }

    /// Check whether both directions ended at end-of-stream
    pub fn is_clean(&self) -> bool {
        self.a_to_b.error.is_none() && self.b_to_a.error.is_none()
    }
}

/// Relay `a` and `b` in both directions until each side finishes sending
pub async fn proxy(
    engine: &SpliceEngine,
    a: Arc<Connection>,
    b: Arc<Connection>,
) -> Result<ProxyReport> {
    info!(a = ?a.peer_addr(), b = ?b.peer_addr(), "proxy session started");

    let forward = tokio::spawn(relay(engine.clone(), Arc::clone(&a), Arc::clone(&b)));
    let backward = tokio::spawn(relay(engine.clone(), Arc::clone(&b), Arc::clone(&a)));
    let (forward, backward) = tokio::join!(forward, backward);

    for conn in [&a, &b] {
        if let Err(e) = conn.close() {
            debug!(peer = ?conn.peer_addr(), error = %e, "close after proxy failed");
        }
    }

    let report = ProxyReport {
        a_to_b: forward.map_err(|e| Error::task(format!("Forward relay failed: {}", e)))?,
        b_to_a: backward.map_err(|e| Error::task(format!("Backward relay failed: {}", e)))?,
    };

    for (name, direction) in [("a_to_b", &report.a_to_b), ("b_to_a", &report.b_to_a)] {
        if let Some(e) = &direction.error {
            warn!(direction = name, bytes = direction.bytes, error = %e, "relay ended with error");
        }
    }
    info!(
        a_to_b = report.a_to_b.bytes,
        b_to_a = report.b_to_a.bytes,
        "proxy session finished"
    );

    Ok(report)
}

async fn relay(engine: SpliceEngine, src: Arc<Connection>, dst: Arc<Connection>) -> DirectionReport {
    let mut reader = src.as_ref();
    let outcome = engine.copy(&mut reader, &dst, Budget::Unbounded).await;

    if let Err(e) = dst.close_write() {
        debug!(error = %e, "half-close of destination failed");
    }
    if let Err(e) = src.close_read() {
        debug!(error = %e, "half-close of source failed");
    }

    DirectionReport {
        bytes: outcome.written,
        error: outcome.error,
    }
}
