//! Error types for tokio-pq.

use std::time::Duration;

use thiserror::Error;

/// Result type for tokio-pq operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for tokio-pq.
#[derive(Debug, Error)]
pub enum Error {
    /// The driver reported a connection-level failure
    #[error("connection error: {0}")]
    Connection(String),

    /// A result carried an unexpected status
    #[error("result error: {0}")]
    Result(String),

    /// The engine was torn down while the operation was current or pending
    #[error("operation aborted")]
    Aborted,

    /// The operation exceeded its timeout
    #[error("operation exceeded timeout of {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// Invalid usage (e.g., a result where none was expected)
    #[error("logic error: {0}")]
    Logic(String),

    /// Socket duplication, family query, or reactor registration failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a driver-sourced connection error message.
    ///
    /// Driver messages conventionally end in a newline; trailing `\n` and
    /// `\r` characters are stripped before wrapping.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection(trimmed(message.into()))
    }

    /// Wrap a result error message, stripping trailing newlines as for
    /// [`Error::connection`].
    pub fn result(message: impl Into<String>) -> Self {
        Error::Result(trimmed(message.into()))
    }

    /// Returns true if the operation was aborted by engine teardown.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// The elapsed timeout, if this error is a timeout.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Error::TimedOut(limit) => Some(*limit),
            _ => None,
        }
    }
}

fn trimmed(mut message: String) -> String {
    while message.ends_with(['\n', '\r']) {
        message.pop();
    }
    message
}
