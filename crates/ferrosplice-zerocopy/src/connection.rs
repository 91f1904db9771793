//! Socket connections usable as splice endpoints
//!
//! A [`Connection`] wraps a non-blocking TCP stream with the pieces a zero-copy
//! transfer needs beyond the raw descriptor: one exclusive access token per
//! direction, a readiness wait that honours optional deadlines, and shutdown
//! helpers for half-closing a proxied session.
//!
//! There is no cancellation token. A transfer is abandoned by calling
//! [`Connection::close`], which makes every pending or future lock acquisition
//! and readiness wait on the connection fail, and shuts the socket down so an
//! in-flight splice observes end-of-stream or an error.

use ferrosplice_types::{Error, Result, TimeoutConfig};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, Interest, ReadBuf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Sleep;
use tracing::debug;

/// One half of a full-duplex connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The receive half
    Read,
    /// The send half
    Write,
}

impl Direction {
    fn interest(self) -> Interest {
        match self {
            Self::Read => Interest::READABLE,
            Self::Write => Interest::WRITABLE,
        }
    }
}

/// A TCP connection with per-direction access tokens and deadlines
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    read_lock: Semaphore,
    write_lock: Semaphore,
    closed: AtomicBool,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    /// Deadline armed by a pending `poll_read`, cleared by any progress
    read_deadline: Mutex<Option<Pin<Box<Sleep>>>>,
}

impl Connection {
    /// Network family reported in wrapped errors
    pub const NETWORK: &'static str = "tcp";

    /// Wrap an established stream
    pub fn new(stream: TcpStream) -> Self {
        let peer_addr = stream.peer_addr().ok();
        Self {
            stream,
            peer_addr,
            read_lock: Semaphore::new(1),
            write_lock: Semaphore::new(1),
            closed: AtomicBool::new(false),
            read_timeout: None,
            write_timeout: None,
            read_deadline: Mutex::new(None),
        }
    }

    /// Apply read and write deadlines to readiness waits
    pub fn with_timeouts(mut self, timeouts: &TimeoutConfig) -> Self {
        self.read_timeout = timeouts.read_timeout;
        self.write_timeout = timeouts.write_timeout;
        self
    }

    /// Dial `addr`, giving up after the configured connect timeout
    pub async fn connect<A: ToSocketAddrs>(addr: A, timeouts: &TimeoutConfig) -> Result<Self> {
        let stream = tokio::time::timeout(timeouts.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::op("dial", Self::NETWORK, None, timeout_error()))?
            .map_err(|e| Error::op("dial", Self::NETWORK, None, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::op("dial", Self::NETWORK, None, e))?;

        Ok(Self::new(stream).with_timeouts(timeouts))
    }

    /// Remote address, if the socket was connected when wrapped
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Local address of the socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.stream.local_addr().map_err(|e| self.wrap("getsockname", e))
    }

    /// The underlying stream
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Check if [`Connection::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Acquire the exclusive access token for one direction
    ///
    /// The token is released when the returned permit is dropped. Fails
    /// without blocking further once the connection is closed.
    pub async fn lock(&self, direction: Direction) -> io::Result<SemaphorePermit<'_>> {
        if self.is_closed() {
            return Err(closed_error());
        }
        let lock = match direction {
            Direction::Read => &self.read_lock,
            Direction::Write => &self.write_lock,
        };
        lock.acquire().await.map_err(|_| closed_error())
    }

    /// Suspend until the socket is ready for `direction`
    pub async fn wait(&self, direction: Direction) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let deadline = match direction {
            Direction::Read => self.read_timeout,
            Direction::Write => self.write_timeout,
        };
        let ready = self.stream.ready(direction.interest());
        match deadline {
            Some(limit) => {
                tokio::time::timeout(limit, ready)
                    .await
                    .map_err(|_| timeout_error())??;
            }
            None => {
                ready.await?;
            }
        }

        if self.is_closed() {
            Err(closed_error())
        } else {
            Ok(())
        }
    }

    /// Run a raw syscall against the socket, clearing readiness on `EAGAIN`
    pub(crate) fn try_io<R>(
        &self,
        direction: Direction,
        f: impl FnOnce() -> io::Result<R>,
    ) -> io::Result<R> {
        self.stream.try_io(direction.interest(), f)
    }

    /// Read into `buf`, waiting for readability until data or end-of-stream
    /// arrives
    ///
    /// Honours the read deadline and fails once the connection is closed.
    pub async fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.is_closed() {
                return Err(closed_error());
            }
            match self.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(Direction::Read).await?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Write part of `buf`, waiting for writability until at least one byte
    /// is accepted
    pub async fn write_some(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.try_write(buf) {
                Ok(0) if !buf.is_empty() => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(Direction::Write).await?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the whole buffer, waiting for writability as needed
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write_some(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Signal that no more data will be read
    pub fn close_read(&self) -> Result<()> {
        self.shutdown(libc::SHUT_RD)
            .map_err(|e| self.wrap("shutdown", e))
    }

    /// Signal that no more data will be written; the peer observes EOF
    pub fn close_write(&self) -> Result<()> {
        self.shutdown(libc::SHUT_WR)
            .map_err(|e| self.wrap("shutdown", e))
    }

    /// Close the connection for every pending and future transfer
    ///
    /// The descriptor stays open until the `Connection` is dropped, so no
    /// concurrent user can observe a recycled descriptor number.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.read_lock.close();
        self.write_lock.close();

        match self.shutdown(libc::SHUT_RDWR) {
            Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => Ok(()),
            result => result.map_err(|e| self.wrap("close", e)),
        }
    }

    /// Wrap an OS error with this connection's network and remote address
    pub(crate) fn wrap(&self, op: &'static str, source: io::Error) -> Error {
        Error::op(op, Self::NETWORK, self.peer_addr, source)
    }

    /// Park a pending read on the read deadline, if one is configured
    fn poll_read_deadline(&self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let Some(limit) = self.read_timeout else {
            return Poll::Pending;
        };
        let mut slot = self
            .read_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sleep = slot.get_or_insert_with(|| Box::pin(tokio::time::sleep(limit)));
        match sleep.as_mut().poll(cx) {
            Poll::Ready(()) => {
                *slot = None;
                Poll::Ready(Err(timeout_error()))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn clear_read_deadline(&self) {
        if self.read_timeout.is_some() {
            *self
                .read_deadline
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
        }
    }

    fn shutdown(&self, how: libc::c_int) -> io::Result<()> {
        // SAFETY: the descriptor is owned by `self.stream` and outlives the call.
        let rc = unsafe { libc::shutdown(self.stream.as_raw_fd(), how) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            debug!(peer = ?self.peer_addr, error = %err, "shutdown failed");
            Err(err)
        } else {
            Ok(())
        }
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl AsyncRead for &Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let conn: &Connection = *self;
        loop {
            if conn.is_closed() {
                return Poll::Ready(Err(closed_error()));
            }
            match conn.stream.poll_read_ready(cx) {
                Poll::Ready(ready) => ready?,
                Poll::Pending => return conn.poll_read_deadline(cx),
            }
            match conn.stream.try_read(buf.initialize_unfilled()) {
                Ok(n) => {
                    conn.clear_read_deadline();
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "use of closed network connection",
    )
}

fn timeout_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::socket_pair;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_lock_is_exclusive_per_direction() {
        let (conn, _peer) = socket_pair().await;

        let write = conn.lock(Direction::Write).await.unwrap();
        // The read side is independent of the write side
        let read = conn.lock(Direction::Read).await.unwrap();
        assert!(conn.write_lock.try_acquire().is_err());

        drop(write);
        assert!(conn.write_lock.try_acquire().is_ok());
        drop(read);
    }

    #[tokio::test]
    async fn test_lock_fails_after_close() {
        let (conn, _peer) = socket_pair().await;
        conn.close().unwrap();

        let err = conn.lock(Direction::Write).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_lock() {
        let (conn, _peer) = socket_pair().await;
        let conn = std::sync::Arc::new(conn);
        let held = conn.lock(Direction::Read).await.unwrap();

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.lock(Direction::Read).await.map(drop) })
        };
        tokio::task::yield_now().await;
        conn.close().unwrap();

        let result = waiter.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotConnected);
        drop(held);
    }

    #[tokio::test]
    async fn test_wait_honours_read_deadline() {
        let (conn, _peer) = socket_pair().await;
        let conn = conn.with_timeouts(&TimeoutConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..TimeoutConfig::default()
        });

        let err = conn.wait(Direction::Read).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_close_write_delivers_eof() {
        let (conn, mut peer) = socket_pair().await;
        conn.write_all(b"hello").await.unwrap();
        conn.close_write().unwrap();

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn test_async_read_through_shared_reference() {
        let (conn, mut peer) = socket_pair().await;
        peer.write_all(b"ping").await.unwrap();
        peer.shutdown().await.unwrap();

        let mut reader = &conn;
        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping");
    }

    #[tokio::test]
    async fn test_connect_records_peer_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let timeouts = TimeoutConfig::default();
        let (conn, accepted) =
            tokio::join!(Connection::connect(addr, &timeouts), listener.accept());
        let conn = conn.unwrap();
        accepted.unwrap();

        assert_eq!(conn.peer_addr(), Some(addr));
        assert!(conn.local_addr().is_ok());
    }

    #[tokio::test]
    async fn test_read_some_honours_deadline_and_close() {
        let (conn, mut peer) = socket_pair().await;
        let conn = conn.with_timeouts(&TimeoutConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..TimeoutConfig::default()
        });
        let mut buf = [0u8; 16];

        peer.write_all(b"abc").await.unwrap();
        assert_eq!(conn.read_some(&mut buf).await.unwrap(), 3);

        let err = conn.read_some(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        conn.close().unwrap();
        let err = conn.read_some(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_async_read_honours_read_deadline() {
        let (conn, mut peer) = socket_pair().await;
        let conn = conn.with_timeouts(&TimeoutConfig {
            read_timeout: Some(Duration::from_millis(30)),
            ..TimeoutConfig::default()
        });

        let mut reader = &conn;
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);

        // The deadline re-arms for the next read
        peer.write_all(b"late").await.unwrap();
        assert_eq!(reader.read(&mut buf).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_async_read_fails_after_close() {
        let (conn, _peer) = socket_pair().await;
        conn.close().unwrap();

        let mut reader = &conn;
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
