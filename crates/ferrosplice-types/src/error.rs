//! Error types and handling for ferrosplice
//!
//! Every terminal failure of the kernel transfer primitive is wrapped in
//! [`Error::Op`], which records the operation, the network family and the remote
//! address of the connection the failure belongs to. Whether a caller should
//! fall back to a buffered copy is never decided by inspecting these errors; the
//! transfer outcome carries a separate `handled` flag for that.

use std::io;
use std::net::SocketAddr;

/// Main error type for ferrosplice operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network operation failed on a specific connection
    #[error("{op} {net}{}: {source}", addr_suffix(.addr))]
    Op {
        /// Operation that failed (`"splice"`, `"pipe"`, ...)
        op: &'static str,
        /// Network family of the connection
        net: &'static str,
        /// Remote address of the connection, when known
        addr: Option<SocketAddr>,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// I/O operation failed outside of a connection context
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A spawned transfer task panicked or was aborted
    #[error("Transfer task failed: {message}")]
    Task {
        /// Error message from the runtime
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

fn addr_suffix(addr: &Option<SocketAddr>) -> String {
    addr.map(|addr| format!(" {}", addr)).unwrap_or_default()
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection-scoped operation errors
    Op,
    /// Configuration errors
    Config,
    /// I/O related errors
    Io,
    /// Task join errors
    Task,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Op { .. } => ErrorKind::Op,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Task { .. } => ErrorKind::Task,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// The underlying I/O error, if this error wraps one
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Op { source, .. } | Self::Io { source } => Some(source),
            _ => None,
        }
    }

    /// The raw OS error code (errno) of the wrapped I/O error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// Check if the error was caused by an expired deadline
    pub fn is_timeout(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
    }

    /// Check if the error was caused by using a closed connection
    pub fn is_closed(&self) -> bool {
        self.io_error()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotConnected)
    }

    /// Wrap an OS error with the connection it happened on
    pub fn op(
        op: &'static str,
        net: &'static str,
        addr: Option<SocketAddr>,
        source: io::Error,
    ) -> Self {
        Self::Op {
            op,
            net,
            addr,
            source,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new task error
    pub fn task<S: Into<String>>(message: S) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_error_kind_consistency(message in ".*") {
            let errors = vec![
                Error::config(message.clone()),
                Error::task(message.clone()),
                Error::other(message.clone()),
                Error::from(io::Error::new(io::ErrorKind::Other, message.clone())),
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::Task { .. } => prop_assert_eq!(kind, ErrorKind::Task),
                    Error::Other { .. } => prop_assert_eq!(kind, ErrorKind::Other),
                    Error::Io { .. } => prop_assert_eq!(kind, ErrorKind::Io),
                    Error::Op { .. } => prop_assert!(false, "unexpected op error"),
                }
            }
        }

        #[test]
        fn test_op_error_keeps_errno(errno in 1i32..130) {
            let error = Error::op("splice", "tcp", None, io::Error::from_raw_os_error(errno));
            prop_assert_eq!(error.kind(), ErrorKind::Op);
            prop_assert_eq!(error.raw_os_error(), Some(errno));
        }
    }

    #[test]
    fn test_op_error_display_with_address() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let error = Error::op(
            "splice",
            "tcp",
            Some(addr),
            io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
        );

        assert_eq!(error.to_string(), "splice tcp 127.0.0.1:8080: broken pipe");
    }

    #[test]
    fn test_op_error_display_without_address() {
        let error = Error::op(
            "pipe",
            "tcp",
            None,
            io::Error::new(io::ErrorKind::Other, "too many open files"),
        );

        assert_eq!(error.to_string(), "pipe tcp: too many open files");
    }

    #[test]
    fn test_timeout_and_closed_classification() {
        let timeout = Error::op(
            "splice",
            "tcp",
            None,
            io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"),
        );
        assert!(timeout.is_timeout());
        assert!(!timeout.is_closed());

        let closed = Error::op(
            "splice",
            "tcp",
            None,
            io::Error::new(io::ErrorKind::NotConnected, "use of closed network connection"),
        );
        assert!(closed.is_closed());
        assert!(!closed.is_timeout());

        assert!(!Error::config("bad").is_timeout());
        assert_eq!(Error::config("bad").raw_os_error(), None);
    }

    #[test]
    fn test_io_error_conversion() {
        let error = Error::from(io::Error::new(io::ErrorKind::NotFound, "test file"));

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("test file"));
    }
}
