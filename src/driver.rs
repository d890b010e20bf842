//! The contract between the engine and a poll-based PostgreSQL driver.
//!
//! A driver is a synchronous-style, non-blocking client library: it owns
//! the TCP connection and the command protocol, and exposes a handle whose
//! state is advanced by repeated polling. The engine never performs I/O on
//! the driver's socket; it only waits for readiness and polls the driver
//! again. Implementations must be edge-compatible: a method that reports
//! "wait for readable" must first have drained the socket to the point of
//! blocking, and "wait for writable" must follow a write that could not
//! complete, or the readiness event may never recur.

use std::os::fd::RawFd;

use crate::error::Result;

/// Connection status reported by a driver handle.
///
/// `Bad` is the failure sentinel; the remaining values describe the phase
/// a non-blocking connection attempt is in and are surfaced to status
/// observers during connect polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    /// Connection is ready for commands
    Ok,
    /// Connection is broken or the attempt failed
    Bad,
    /// Waiting for the connection to be made
    Started,
    /// Connection established; waiting to send
    Made,
    /// Awaiting a response from the server
    AwaitingResponse,
    /// Authentication accepted; finishing startup
    AuthOk,
    /// Negotiating SSL encryption
    SslStartup,
    /// Checking if the session is writable
    CheckWritable,
    /// Consuming remaining response data
    Consume,
}

/// Outcome of one round of connect or reset polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polling {
    /// Poll again once the socket is readable
    Reading,
    /// Poll again once the socket is writable
    Writing,
    /// The connection attempt succeeded
    Ok,
    /// The connection attempt failed
    Failed,
}

/// Outcome of flushing queued outbound data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// The queue was fully sent
    Sent,
    /// Data remains queued; retry once the socket is writable
    Pending,
    /// The flush failed
    Failed,
}

/// Status of a command result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    /// The query string was empty
    EmptyQuery,
    /// A command that returns no rows completed
    CommandOk,
    /// A command that returns rows completed
    TuplesOk,
    /// Copy-out transfer started
    CopyOut,
    /// Copy-in transfer started
    CopyIn,
    /// The server's response was not understood
    BadResponse,
    /// A notice or warning occurred
    NonfatalError,
    /// The command failed
    FatalError,
}

/// An owned command result produced by a driver.
///
/// Dropping a result releases it; the engine never releases results
/// itself, it hands them whole to the operation that requested them.
pub trait DriverResult: Send {
    /// Status of the command this result belongs to.
    fn status(&self) -> ResultStatus;

    /// Error message attached to the result, empty if none.
    fn error_message(&self) -> String;

    /// Number of rows in the result.
    fn ntuples(&self) -> usize;

    /// Number of columns in the result.
    fn nfields(&self) -> usize;

    /// Text value at `(row, col)`, or `None` for SQL NULL.
    fn value(&self, row: usize, col: usize) -> Option<String>;
}

/// An owned, non-blocking PostgreSQL connection handle.
///
/// Ownership is exclusive: dropping the handle finishes the connection.
/// Every method that can fail signals failure through its return value;
/// the accompanying text is available from [`error_message`].
///
/// [`error_message`]: Driver::error_message
pub trait Driver: Send + 'static {
    /// The result type produced by [`result`](Driver::result).
    type Result: DriverResult + 'static;

    /// Start a non-blocking connection attempt from a conninfo string.
    ///
    /// The returned handle may already be in the [`ConnStatus::Bad`] state;
    /// callers inspect [`status`](Driver::status) before polling.
    fn start(conninfo: &str) -> Result<Self>
    where
        Self: Sized;

    /// Start a non-blocking connection attempt from keyword/value pairs.
    fn start_params(params: &[(&str, &str)]) -> Result<Self>
    where
        Self: Sized;

    /// Current connection status.
    fn status(&self) -> ConnStatus;

    /// Put the handle in non-blocking command mode. Returns false on
    /// failure.
    fn set_nonblocking(&mut self) -> bool;

    /// Advance a connection attempt by one polling round.
    fn connect_poll(&mut self) -> Polling;

    /// Begin a non-blocking reset of an established connection. Returns
    /// false on failure.
    fn reset_start(&mut self) -> bool;

    /// Advance a reset by one polling round.
    fn reset_poll(&mut self) -> Polling;

    /// File descriptor of the underlying socket, or `None` when the driver
    /// currently has no socket. The driver may swap descriptors between
    /// polling rounds; callers re-query after every poll.
    fn socket(&self) -> Option<RawFd>;

    /// Dispatch a command. Returns false on failure.
    fn send_query(&mut self, sql: &str) -> bool;

    /// Flush queued outbound data.
    fn flush(&mut self) -> Flush;

    /// Absorb whatever input is available on the socket. Returns false on
    /// failure. Must read until the socket would block.
    fn consume_input(&mut self) -> bool;

    /// Whether a call to [`result`](Driver::result) would block.
    fn is_busy(&mut self) -> bool;

    /// Pop the next result of the current command, or `None` when the
    /// command is done.
    fn result(&mut self) -> Option<Self::Result>;

    /// Most recent error message on the handle.
    fn error_message(&self) -> String;
}
