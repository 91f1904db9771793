//! Buffered fallback for transfers the splice path declines

use crate::connection::{Connection, Direction};
use crate::endpoint::{Resolved, SpliceSource};
use crate::engine::{Budget, SpliceEngine};
use ferrosplice_types::{Error, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Result of a copy that may have used either path
#[derive(Debug)]
pub struct CopyOutcome {
    /// Bytes delivered to the destination
    pub written: u64,
    /// Terminal error, if the copy failed
    pub error: Option<Error>,
    /// Whether the bytes moved through the splice path
    pub spliced: bool,
}

impl CopyOutcome {
    /// Convert into a plain result, dropping the partial count on failure
    pub fn into_result(self) -> Result<u64> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }
}

/// Copy from `reader` into `dst` through a user-space buffer
///
/// Honours the same budget rules as [`SpliceEngine::transfer`]: a bounded
/// budget caps the bytes read and receives the unconsumed remainder. A
/// [`Connection`] source is read under its read token and deadline.
pub async fn copy_buffered<R>(
    reader: &mut R,
    dst: &Connection,
    budget: Budget<'_>,
    buffer_size: usize,
) -> CopyOutcome
where
    R: SpliceSource + AsyncRead + Unpin + ?Sized,
{
    if let Resolved::SocketConnection(conn) = reader.resolve() {
        return pump(Reader::<R>::Socket(conn), dst, budget, buffer_size).await;
    }
    pump(Reader::Stream(reader), dst, budget, buffer_size).await
}

/// The read side of a buffered copy
enum Reader<'a, R: ?Sized> {
    Socket(&'a Connection),
    Stream(&'a mut R),
}

impl<'a, R: AsyncRead + Unpin + ?Sized> Reader<'a, R> {
    fn socket(&self) -> Option<&'a Connection> {
        match self {
            Self::Socket(conn) => Some(*conn),
            Self::Stream(_) => None,
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Socket(conn) => conn.read_some(buf).await,
            Self::Stream(reader) => reader.read(buf).await,
        }
    }
}

async fn pump<R>(mut reader: Reader<'_, R>, dst: &Connection, budget: Budget<'_>, buffer_size: usize) -> CopyOutcome
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut remaining = budget.initial();
    let mut written = 0u64;

    let source = reader.socket();
    let read_error = |e| source.unwrap_or(dst).wrap("read", e);

    let locked = async {
        let write = dst
            .lock(Direction::Write)
            .await
            .map_err(|e| dst.wrap("write", e))?;
        let read = match source {
            Some(conn) => Some(conn.lock(Direction::Read).await.map_err(read_error)?),
            None => None,
        };
        Ok::<_, Error>((write, read))
    };

    let error = match locked.await {
        Err(e) => Some(e),
        Ok(_permits) => {
            let mut buf = vec![0u8; buffer_size.max(1)];
            loop {
                if remaining <= 0 {
                    break None;
                }
                let want = buf
                    .len()
                    .min(usize::try_from(remaining).unwrap_or(usize::MAX));
                let n = match reader.read(&mut buf[..want]).await {
                    Ok(0) => break None,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => break Some(read_error(e)),
                };
                remaining -= n as i64;

                let mut pending = &buf[..n];
                let failed = loop {
                    if pending.is_empty() {
                        break None;
                    }
                    match dst.write_some(pending).await {
                        Ok(sent) => {
                            written += sent as u64;
                            pending = &pending[sent..];
                        }
                        Err(e) => break Some(e),
                    }
                };
                if let Some(e) = failed {
                    break Some(dst.wrap("write", e));
                }
            }
        }
    };

    budget.write_back(remaining);
    CopyOutcome {
        written,
        error,
        spliced: false,
    }
}

impl SpliceEngine {
    /// Copy from `src` into `dst`, splicing when possible
    ///
    /// A transfer declined for lack of splice support falls back to
    /// [`copy_buffered`] with the same budget, using the chunk ceiling as the
    /// buffer size.
    pub async fn copy<R>(&self, src: &mut R, dst: &Connection, mut budget: Budget<'_>) -> CopyOutcome
    where
        R: SpliceSource + AsyncRead + Unpin + ?Sized,
    {
        let outcome = self.transfer(&*src, dst, budget.reborrow()).await;
        if !outcome.should_fall_back() {
            return CopyOutcome {
                written: outcome.written,
                error: outcome.error,
                spliced: outcome.handled,
            };
        }
        if let Some(e) = &outcome.error {
            debug!(error = %e, "relay pipe unavailable, using buffered copy");
        }

        let fallback = copy_buffered(src, dst, budget, self.config().max_chunk.get()).await;
        self.counters()
            .record_fallback(fallback.written, fallback.error.is_some());
        fallback
    }
}

impl Connection {
    /// Read from `src` until end-of-stream or budget exhaustion, writing
    /// everything to this connection
    pub async fn read_from<R>(&self, engine: &SpliceEngine, src: &mut R, budget: Budget<'_>) -> Result<u64>
    where
        R: SpliceSource + AsyncRead + Unpin + ?Sized,
    {
        engine.copy(src, self, budget).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{payload, socket_pair};
    use ferrosplice_types::TimeoutConfig;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_buffered_copy_respects_budget() {
        let (conn, mut peer) = socket_pair().await;
        let data = payload(5_000);
        let mut reader = Cursor::new(data.clone());

        let mut left = 1_500;
        let outcome = copy_buffered(&mut reader, &conn, Budget::Bounded(&mut left), 512).await;
        conn.close_write().unwrap();

        assert_eq!(outcome.written, 1_500);
        assert!(outcome.error.is_none());
        assert!(!outcome.spliced);
        assert_eq!(left, 0);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, &data[..1_500]);
    }

    #[tokio::test]
    async fn test_buffered_copy_reports_leftover_budget() {
        let (conn, _peer) = socket_pair().await;
        let mut reader: &[u8] = b"short";

        let mut left = 100;
        let outcome = copy_buffered(&mut reader, &conn, Budget::Bounded(&mut left), 64).await;

        assert_eq!(outcome.written, 5);
        assert_eq!(left, 95);
    }

    #[tokio::test]
    async fn test_copy_falls_back_for_memory_source() {
        let engine = SpliceEngine::with_defaults().unwrap();
        let (conn, mut peer) = socket_pair().await;
        let data = payload(70_000);
        let mut reader = Cursor::new(data.clone());

        let reader_task = tokio::spawn(async move {
            let mut received = Vec::new();
            peer.read_to_end(&mut received).await.unwrap();
            received
        });

        let written = conn
            .read_from(&engine, &mut reader, Budget::Unbounded)
            .await
            .unwrap();
        conn.close_write().unwrap();

        assert_eq!(written, data.len() as u64);
        assert_eq!(reader_task.await.unwrap(), data);

        let stats = engine.stats();
        assert_eq!(stats.declined, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.bytes_fallback, data.len() as u64);
    }

    #[tokio::test]
    async fn test_copy_to_closed_connection_fails() {
        let (conn, _peer) = socket_pair().await;
        conn.close().unwrap();
        let mut reader: &[u8] = b"never sent";

        let outcome = copy_buffered(&mut reader, &conn, Budget::Unbounded, 64).await;
        assert_eq!(outcome.written, 0);
        assert!(outcome.error.unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_buffered_copy_takes_source_read_token() {
        let (source, mut writer) = socket_pair().await;
        let (dest, mut peer) = socket_pair().await;
        writer.write_all(b"queued").await.unwrap();
        writer.shutdown().await.unwrap();

        let held = source.lock(Direction::Read).await.unwrap();
        let mut reader = &source;
        let copy = copy_buffered(&mut reader, &dest, Budget::Unbounded, 64);
        tokio::pin!(copy);

        let blocked = tokio::time::timeout(Duration::from_millis(50), &mut copy).await;
        assert!(blocked.is_err());

        drop(held);
        let outcome = copy.await;
        assert_eq!(outcome.written, 6);
        assert!(outcome.error.is_none());

        dest.close_write().unwrap();
        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"queued");
    }

    #[tokio::test]
    async fn test_buffered_copy_reports_source_deadline() {
        let (source, _writer) = socket_pair().await;
        let source = source.with_timeouts(&TimeoutConfig {
            read_timeout: Some(Duration::from_millis(30)),
            ..TimeoutConfig::default()
        });
        let (dest, _peer) = socket_pair().await;

        let mut reader = &source;
        let outcome = copy_buffered(&mut reader, &dest, Budget::Unbounded, 64).await;

        let error = outcome.error.unwrap();
        assert!(error.is_timeout());
        assert_eq!(
            error.to_string(),
            format!("read tcp {}: i/o timeout", source.peer_addr().unwrap())
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_copy_returns_source_deadline_without_fallback() {
        let engine = SpliceEngine::with_defaults().unwrap();
        let (source, _writer) = socket_pair().await;
        let source = source.with_timeouts(&TimeoutConfig {
            read_timeout: Some(Duration::from_millis(30)),
            ..TimeoutConfig::default()
        });
        let (dest, _peer) = socket_pair().await;

        let mut reader = &source;
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            engine.copy(&mut reader, &dest, Budget::Unbounded),
        )
        .await
        .unwrap();

        assert!(!outcome.spliced);
        assert!(outcome.error.unwrap().is_timeout());
        assert_eq!(engine.stats().fallbacks, 0);
    }
}
