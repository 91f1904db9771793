//! Loopback fixtures shared by the unit tests

use crate::Connection;
use tokio::net::{TcpListener, TcpStream};

/// A connected loopback pair: the wrapped local side and its raw peer
pub(crate) async fn socket_pair() -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server, _) = accepted.unwrap();
    (Connection::new(client.unwrap()), server)
}

/// Deterministic, non-repeating-per-page payload
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
