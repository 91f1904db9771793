//! Unified test utilities for ferrosplice tests and benchmarks

use ferrosplice_types::Result;
use ferrosplice_zerocopy::{proxy, Connection, ProxyReport, SpliceEngine};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Test data generation patterns
#[derive(Debug, Clone, Copy)]
pub enum TestDataPattern {
    /// All zeros
    Zeros,
    /// Byte `i` is `i % 251`, so misplaced pages are detectable
    Sequential,
    /// Deterministic pseudo-random bytes
    Random,
}

/// Generate test data with specified pattern
pub fn generate_test_data(size: usize, pattern: TestDataPattern) -> Vec<u8> {
    match pattern {
        TestDataPattern::Zeros => vec![0u8; size],
        TestDataPattern::Sequential => (0..size).map(|i| (i % 251) as u8).collect(),
        TestDataPattern::Random => {
            // xorshift keeps benchmarks reproducible
            let mut state = 0x9E37_79B9_7F4A_7C15u64;
            (0..size)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state >> 24) as u8
                })
                .collect()
        }
    }
}

/// Create a temporary file with test data, returning its path and contents
pub fn create_test_file(
    temp_dir: &TempDir,
    name: &str,
    size: usize,
    pattern: TestDataPattern,
) -> (PathBuf, Vec<u8>) {
    let file_path = temp_dir.path().join(name);
    let data = generate_test_data(size, pattern);
    fs::write(&file_path, &data).expect("Failed to write test file");
    (file_path, data)
}

/// A connected loopback pair: the wrapped local side and its raw peer
pub async fn loopback() -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind loopback listener");
    let addr = listener.local_addr().expect("Listener has no address");

    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server, _) = accepted.expect("Failed to accept loopback connection");
    (
        Connection::new(client.expect("Failed to connect loopback")),
        server,
    )
}

/// Read everything the peer sends until it closes its write side
pub fn drain(mut peer: TcpStream) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut received = Vec::new();
        peer.read_to_end(&mut received)
            .await
            .expect("Failed to drain peer");
        received
    })
}

/// Two raw endpoints joined through a running proxy session
///
/// Bytes written to `client` reach `server` through the proxy and the
/// other way round.
pub struct ProxyHarness {
    /// Client-side peer
    pub client: TcpStream,
    /// Server-side peer
    pub server: TcpStream,
    /// The running proxy session
    pub session: JoinHandle<Result<ProxyReport>>,
}

impl ProxyHarness {
    /// Start a proxy session between two fresh loopback pairs
    pub async fn start(engine: &SpliceEngine) -> Self {
        let (a, client) = loopback().await;
        let (b, server) = loopback().await;
        let engine = engine.clone();
        let session =
            tokio::spawn(async move { proxy(&engine, Arc::new(a), Arc::new(b)).await });

        Self {
            client,
            server,
            session,
        }
    }
}

/// Common payload sizes for tests and benchmarks
pub struct CommonSizes;

impl CommonSizes {
    /// 4KB, a single page
    pub const PAGE: usize = 4 * 1024;
    /// 64KB, the default chunk ceiling
    pub const CHUNK: usize = 64 * 1024;
    /// 1MB
    pub const LARGE: usize = 1024 * 1024;
    /// 8MB, far larger than any relay pipe
    pub const XLARGE: usize = 8 * 1024 * 1024;

    /// Sizes suitable for benchmarks
    pub fn benchmark() -> Vec<(&'static str, usize)> {
        vec![
            ("64KB", Self::CHUNK),
            ("1MB", Self::LARGE),
            ("8MB", Self::XLARGE),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_data_patterns() {
        let zeros = generate_test_data(1024, TestDataPattern::Zeros);
        assert!(zeros.iter().all(|&b| b == 0));

        let sequential = generate_test_data(600, TestDataPattern::Sequential);
        assert_eq!(sequential[251], 0);
        assert_eq!(sequential[252], 1);

        let random = generate_test_data(1024, TestDataPattern::Random);
        assert_eq!(random, generate_test_data(1024, TestDataPattern::Random));
        assert!(random.iter().any(|&b| b != random[0]));
    }

    #[test]
    fn test_create_test_file() {
        let temp_dir = TempDir::new().unwrap();
        let (path, data) = create_test_file(&temp_dir, "test.dat", 4096, TestDataPattern::Random);

        assert_eq!(fs::read(path).unwrap(), data);
    }

    #[tokio::test]
    async fn test_loopback_pair_is_connected() {
        let (conn, peer) = loopback().await;
        assert_eq!(conn.peer_addr(), Some(peer.local_addr().unwrap()));
    }
}
