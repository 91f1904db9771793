//! Endpoint resolution for splice transfers
//!
//! A transfer source is resolved exactly once, at the entry point, into a
//! closed set of variants. Only plain files and socket connections can feed
//! the kernel primitive; everything else resolves to
//! [`Resolved::Unsupported`] and the transfer is declined before any side
//! effect takes place.

use crate::connection::Connection;
use std::io::Cursor;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;

/// The resolved kind of a transfer source
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// A regular file read at its current offset
    PlainFile(BorrowedFd<'a>),
    /// The read half of a socket connection
    SocketConnection(&'a Connection),
    /// A type the splice primitive cannot read from
    Unsupported,
}

impl Resolved<'_> {
    /// Check whether the source can be spliced at all
    pub const fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// A value that may serve as the source of a splice transfer
///
/// The default resolution is [`Resolved::Unsupported`], so any reader type can
/// opt in to the generic copy path with an empty impl.
pub trait SpliceSource {
    /// Resolve this value into a splice-capable endpoint, if it is one
    ///
    /// Resolution must not touch the underlying descriptor.
    fn resolve(&self) -> Resolved<'_> {
        Resolved::Unsupported
    }
}

impl SpliceSource for std::fs::File {
    fn resolve(&self) -> Resolved<'_> {
        Resolved::PlainFile(self.as_fd())
    }
}

impl SpliceSource for Connection {
    fn resolve(&self) -> Resolved<'_> {
        Resolved::SocketConnection(self)
    }
}

impl<T: SpliceSource + ?Sized> SpliceSource for &T {
    fn resolve(&self) -> Resolved<'_> {
        (**self).resolve()
    }
}

impl<T: SpliceSource + ?Sized> SpliceSource for Arc<T> {
    fn resolve(&self) -> Resolved<'_> {
        (**self).resolve()
    }
}

impl<T: SpliceSource + ?Sized> SpliceSource for Box<T> {
    fn resolve(&self) -> Resolved<'_> {
        (**self).resolve()
    }
}

// In-memory readers have no descriptor to splice from.
impl SpliceSource for [u8] {}
impl<T> SpliceSource for Cursor<T> {}
impl SpliceSource for tokio::io::Empty {}

// A bare stream has no access tokens, and an async file may hold a read-ahead
// buffer that would be skipped by reading the descriptor directly.
impl SpliceSource for tokio::net::TcpStream {}
impl SpliceSource for tokio::fs::File {}

#[cfg(target_os = "linux")]
pub(crate) use self::linux::Endpoint;

#[cfg(target_os = "linux")]
mod linux {
    use super::Resolved;
    use crate::connection::{Connection, Direction};
    use crate::sys::SpliceStatus;
    use std::io;
    use std::os::fd::{AsFd, BorrowedFd};
    use tokio::sync::SemaphorePermit;

    /// One side of a splice transfer with its locking and waiting capability
    ///
    /// A file endpoint carries no connection: its lock and wait are no-ops.
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct Endpoint<'a> {
        fd: BorrowedFd<'a>,
        direction: Direction,
        socket: Option<&'a Connection>,
    }

    impl<'a> Endpoint<'a> {
        /// The read side of a resolved source, or `None` when unsupported
        pub(crate) fn source(resolved: Resolved<'a>) -> Option<Self> {
            match resolved {
                Resolved::PlainFile(fd) => Some(Self {
                    fd,
                    direction: Direction::Read,
                    socket: None,
                }),
                Resolved::SocketConnection(conn) => Some(Self {
                    fd: conn.as_fd(),
                    direction: Direction::Read,
                    socket: Some(conn),
                }),
                Resolved::Unsupported => None,
            }
        }

        /// The write side of a destination connection
        pub(crate) fn destination(conn: &'a Connection) -> Self {
            Self {
                fd: conn.as_fd(),
                direction: Direction::Write,
                socket: Some(conn),
            }
        }

        /// The connection behind this side, or `None` for a file
        pub(crate) const fn connection(&self) -> Option<&'a Connection> {
            self.socket
        }

        /// Acquire the access token for this side, if it has one
        pub(crate) async fn lock(&self) -> io::Result<Option<SemaphorePermit<'a>>> {
            match self.socket {
                Some(conn) => conn.lock(self.direction).await.map(Some),
                None => Ok(None),
            }
        }

        /// Suspend until this side is ready again
        pub(crate) async fn wait(&self) -> io::Result<()> {
            match self.socket {
                Some(conn) => conn.wait(self.direction).await,
                None => {
                    tokio::task::yield_now().await;
                    Ok(())
                }
            }
        }

        /// Run a splice call against this side, consuming socket readiness
        ///
        /// A socket reported not ready is not touched at all, and `EAGAIN`
        /// clears its readiness so the next [`Endpoint::wait`] parks the task.
        pub(crate) fn attempt(
            &self,
            f: impl FnOnce(BorrowedFd<'a>) -> io::Result<usize>,
        ) -> SpliceStatus {
            let fd = self.fd;
            match self.socket {
                Some(conn) => conn.try_io(self.direction, || f(fd)).into(),
                None => f(fd).into(),
            }
        }

        /// Run a splice call without consulting or clearing readiness
        ///
        /// Used when `EAGAIN` may come from the pipe rather than this side.
        pub(crate) fn attempt_unchecked(
            &self,
            f: impl FnOnce(BorrowedFd<'a>) -> io::Result<usize>,
        ) -> SpliceStatus {
            f(self.fd).into()
        }
    }
}
