//! Splice transfer engine
//!
//! [`SpliceEngine::transfer`] moves bytes from a file or socket into a socket
//! without copying them through user space. The kernel primitive only moves
//! data between a pipe and another descriptor, so every transfer relays through
//! a private pipe: source into the pipe, then pipe into the destination.
//!
//! # Chunk ceiling
//!
//! The number of bytes buffered in the pipe never exceeds the chunk ceiling,
//! and the ceiling never exceeds the pipe's real capacity. A ceiling above the
//! capacity lets the relay fill the pipe with nothing draining it, stalling the
//! transfer for good. The engine checks the configured ceiling against a probe
//! pipe at construction and clamps it against each transfer's pipe again.
//!
//! # Cancellation
//!
//! A transfer runs to completion; there is no cancellation token. To abandon
//! one, call [`Connection::close`] on either side. Pending lock acquisitions
//! and readiness waits then fail, and the next primitive call observes the
//! shutdown, so the loop unwinds through its error path.

use crate::connection::Connection;
use crate::endpoint::{Resolved, SpliceSource};
use ferrosplice_config::SpliceConfig;
use ferrosplice_types::{Error, Result, TransferStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Internal stand-in for "copy until end-of-stream"
const UNBOUNDED: i64 = 1 << 62;

/// How many bytes a transfer may move
#[derive(Debug)]
pub enum Budget<'a> {
    /// Copy until the source reports end-of-stream
    Unbounded,
    /// Copy at most this many bytes; the unconsumed remainder is written back
    /// when the transfer returns
    Bounded(&'a mut i64),
}

impl Budget<'_> {
    /// Borrow this budget for a nested transfer
    pub fn reborrow(&mut self) -> Budget<'_> {
        match self {
            Self::Unbounded => Budget::Unbounded,
            Self::Bounded(remaining) => Budget::Bounded(&mut **remaining),
        }
    }

    pub(crate) fn initial(&self) -> i64 {
        match self {
            Self::Unbounded => UNBOUNDED,
            Self::Bounded(remaining) => **remaining,
        }
    }

    pub(crate) fn write_back(self, remaining: i64) {
        if let Self::Bounded(slot) = self {
            *slot = remaining;
        }
    }
}

/// Result of one splice transfer
///
/// `written` counts bytes confirmed delivered to the destination, including
/// when `error` is set. `handled == false` means no byte left the source, so
/// the caller may fall back to a generic copy without losing data.
#[derive(Debug)]
pub struct TransferOutcome {
    /// Bytes delivered to the destination
    pub written: u64,
    /// Terminal error, if the transfer failed
    pub error: Option<Error>,
    /// Whether the splice path took responsibility for the transfer
    pub handled: bool,
}

impl TransferOutcome {
    pub(crate) const fn declined() -> Self {
        Self {
            written: 0,
            error: None,
            handled: false,
        }
    }

    /// Check whether a buffered copy should take over this transfer
    ///
    /// Only transfers that never took bytes from the source qualify, and only
    /// when splicing was unavailable: an unsupported source, a disabled engine
    /// or a relay pipe that could not be created. Deadline and closure errors
    /// belong to the caller.
    pub fn should_fall_back(&self) -> bool {
        !self.handled
            && self
                .error
                .as_ref()
                .map_or(true, |e| matches!(e, Error::Op { op: "pipe", .. }))
    }

    /// Convert into a plain result, dropping the partial count on failure
    pub fn into_result(self) -> Result<u64> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.written),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    attempts: AtomicU64,
    spliced: AtomicU64,
    declined: AtomicU64,
    fallbacks: AtomicU64,
    errors: AtomicU64,
    bytes_spliced: AtomicU64,
    bytes_fallback: AtomicU64,
}

impl StatsCounters {
    fn record_transfer(&self, outcome: &TransferOutcome) {
        let counter = if outcome.handled {
            &self.spliced
        } else {
            &self.declined
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if outcome.error.is_some() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_spliced
            .fetch_add(outcome.written, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self, written: u64, failed: bool) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_fallback.fetch_add(written, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TransferStats {
        TransferStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            spliced: self.spliced.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_spliced: self.bytes_spliced.load(Ordering::Relaxed),
            bytes_fallback: self.bytes_fallback.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.attempts,
            &self.spliced,
            &self.declined,
            &self.fallbacks,
            &self.errors,
            &self.bytes_spliced,
            &self.bytes_fallback,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Zero-copy transfer engine
///
/// Cheap to clone; clones share statistics.
#[derive(Debug, Clone)]
pub struct SpliceEngine {
    config: SpliceConfig,
    pipe_capacity: Option<usize>,
    stats: Arc<StatsCounters>,
}

impl SpliceEngine {
    /// Create an engine, validating the chunk ceiling against a probe pipe
    ///
    /// Fails with [`Error::Config`] when `max_chunk` exceeds the capacity the
    /// kernel grants a relay pipe.
    pub fn new(config: SpliceConfig) -> Result<Self> {
        let pipe_capacity = Self::probe(&config)?;
        if let Some(capacity) = pipe_capacity {
            debug!(capacity, max_chunk = config.max_chunk.get(), "relay pipe probed");
        }

        Ok(Self {
            config,
            pipe_capacity,
            stats: Arc::new(StatsCounters::default()),
        })
    }

    /// Create an engine with the default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(SpliceConfig::default())
    }

    #[cfg(target_os = "linux")]
    fn probe(config: &SpliceConfig) -> Result<Option<usize>> {
        if !config.enabled {
            return Ok(None);
        }
        let capacity = crate::pipe::probe_capacity(config.pipe_size)?;
        if config.max_chunk.get() > capacity {
            return Err(Error::config(format!(
                "Chunk size {} exceeds the relay pipe capacity {}",
                config.max_chunk.get(),
                capacity
            )));
        }
        Ok(Some(capacity))
    }

    #[cfg(not(target_os = "linux"))]
    fn probe(_config: &SpliceConfig) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Engine configuration
    pub fn config(&self) -> &SpliceConfig {
        &self.config
    }

    /// Capacity of the probe pipe, or `None` when splicing is unavailable
    pub fn pipe_capacity(&self) -> Option<usize> {
        self.pipe_capacity
    }

    /// Snapshot of the statistics shared by this engine and its clones
    pub fn stats(&self) -> TransferStats {
        self.stats.snapshot()
    }

    /// Reset all statistics counters
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    /// Splice bytes from `src` into `dst`
    ///
    /// Sources other than plain files and socket connections are declined
    /// with `handled == false`, whatever the budget. A bounded budget that is
    /// already exhausted is a successful no-op.
    pub async fn transfer<S: SpliceSource + ?Sized>(
        &self,
        src: &S,
        dst: &Connection,
        budget: Budget<'_>,
    ) -> TransferOutcome {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        let resolved = src.resolve();
        let outcome = if !resolved.is_supported() {
            debug!(peer = ?dst.peer_addr(), "source cannot be spliced");
            TransferOutcome::declined()
        } else if !self.config.enabled || self.pipe_capacity.is_none() {
            debug!(peer = ?dst.peer_addr(), "splice disabled");
            TransferOutcome::declined()
        } else {
            let mut remaining = budget.initial();
            let outcome = if remaining <= 0 {
                TransferOutcome {
                    written: 0,
                    error: None,
                    handled: true,
                }
            } else {
                self.run(resolved, dst, &mut remaining).await
            };
            budget.write_back(remaining);
            outcome
        };

        self.stats.record_transfer(&outcome);
        outcome
    }

    #[cfg(not(target_os = "linux"))]
    #[allow(clippy::unused_async)]
    async fn run(
        &self,
        _resolved: Resolved<'_>,
        _dst: &Connection,
        _remaining: &mut i64,
    ) -> TransferOutcome {
        TransferOutcome::declined()
    }

    #[cfg(target_os = "linux")]
    async fn run(
        &self,
        resolved: Resolved<'_>,
        dst: &Connection,
        remaining: &mut i64,
    ) -> TransferOutcome {
        use crate::endpoint::Endpoint;
        use crate::pipe::RelayPipe;
        use crate::sys::{self, SpliceStatus};

        let Some(source) = Endpoint::source(resolved) else {
            return TransferOutcome::declined();
        };
        let sink = Endpoint::destination(dst);
        // Failures belong to the side they happened on
        let source_error = |e| source.connection().unwrap_or(dst).wrap("splice", e);
        let sink_error = |e| dst.wrap("splice", e);

        let locked = async {
            let write = sink.lock().await.map_err(sink_error)?;
            let read = source.lock().await.map_err(source_error)?;
            Ok::<_, Error>((write, read))
        };
        let _permits = match locked.await {
            Ok(permits) => permits,
            Err(e) => {
                return TransferOutcome {
                    written: 0,
                    error: Some(e),
                    handled: true,
                }
            }
        };

        let pipe = match RelayPipe::new(self.config.pipe_size) {
            Ok(pipe) => pipe,
            Err(e) => {
                return TransferOutcome {
                    written: 0,
                    error: Some(dst.wrap("pipe", e)),
                    handled: false,
                }
            }
        };
        let chunk = self.config.max_chunk.get().min(pipe.capacity());

        let mut written = 0u64;
        let mut consumed = 0u64;
        let mut pipe_len = 0usize;
        let mut source_done = false;

        let error = loop {
            let more = !source_done && *remaining > 0;
            if !more && pipe_len == 0 {
                break None;
            }

            if more && pipe_len < chunk {
                let want = usize::try_from(*remaining).unwrap_or(usize::MAX);
                let to_read = (chunk - pipe_len).min(want);
                let hint = (to_read as i64) < *remaining;
                let fill = |fd_in| sys::splice(fd_in, pipe.write_end(), to_read, sys::flags(hint));

                // With bytes in the pipe, EAGAIN may mean the pipe is out of
                // slots, which says nothing about the source.
                let status = if pipe_len == 0 {
                    source.attempt(fill)
                } else {
                    source.attempt_unchecked(fill)
                };
                match status {
                    SpliceStatus::Progress(0) => source_done = true,
                    SpliceStatus::Progress(n) => {
                        *remaining -= n as i64;
                        consumed += n as u64;
                        pipe_len += n;
                    }
                    SpliceStatus::WouldBlock if pipe_len == 0 => {
                        if let Err(e) = source.wait().await {
                            break Some(source_error(e));
                        }
                        continue;
                    }
                    SpliceStatus::WouldBlock => {}
                    SpliceStatus::Fatal(e) => break Some(source_error(e)),
                }
            }

            if pipe_len > 0 {
                let hint = !source_done && *remaining > 0;
                let status =
                    sink.attempt(|fd_out| sys::splice(pipe.read_end(), fd_out, pipe_len, sys::flags(hint)));
                match status {
                    SpliceStatus::Progress(0) => break None,
                    SpliceStatus::Progress(n) => {
                        written += n as u64;
                        pipe_len -= n;
                    }
                    SpliceStatus::WouldBlock => {
                        if let Err(e) = sink.wait().await {
                            break Some(sink_error(e));
                        }
                    }
                    SpliceStatus::Fatal(e) => break Some(sink_error(e)),
                }
            }
        };

        if pipe_len > 0 {
            debug!(stranded = pipe_len, "relay pipe dropped with undelivered bytes");
        }
        tracing::trace!(written, consumed, remaining = *remaining, "splice loop finished");

        // Bytes taken from the source cannot be replayed by a fallback copy
        TransferOutcome {
            written,
            error,
            handled: written > 0 || consumed > 0,
        }
    }
}
