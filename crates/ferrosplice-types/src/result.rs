//! Result type alias for ferrosplice operations

use crate::Error;

/// Result type alias for ferrosplice operations
pub type Result<T> = std::result::Result<T, Error>;
