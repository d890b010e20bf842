//! The asynchronous operation contract and its completion channel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::driver::Driver;
use crate::error::{Error, Result};

/// Which socket access an operation is waiting for, or whether it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The operation has succeeded or failed
    Done,
    /// Continue once the socket is readable
    Read,
    /// Continue once the socket is writable
    Write,
    /// Continue once the socket is readable or writable
    ReadWrite,
}

/// The socket access that satisfied the last reported [`Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The socket can be read without blocking
    Readable,
    /// The socket can be written without blocking
    Writable,
}

/// A unit of work executed against a connection.
///
/// The engine drives each submitted operation through `begin`, zero or
/// more `perform` rounds, and exactly one `complete`, in that order, all
/// on the engine's worker task. An `Err` from `begin` or `perform` is
/// routed to `complete`; it never escapes the worker.
pub trait Operation<D: Driver>: Send {
    /// Invoked once when the operation becomes current.
    fn begin(&mut self, driver: &mut D) -> Result<Progress>;

    /// Invoked each time the readiness requested by the last reported
    /// [`Progress`] is satisfied.
    fn perform(&mut self, driver: &mut D, readiness: Readiness) -> Result<Progress>;

    /// Invoked when the operation terminates: `Ok(())` on success, or the
    /// error that ended it (driver failure, timeout, abort).
    fn complete(&mut self, outcome: Result<()>);

    /// Total time the operation may take, read once when it becomes
    /// current. `None` means the operation may take arbitrarily long.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// One-shot receiver for an operation's outcome.
///
/// Returned alongside each operation at construction. Resolves to the
/// operation's success value or the error passed to its `complete`. If
/// the engine is dropped without draining (e.g. at runtime shutdown) the
/// channel closes and the completion resolves to [`Error::Aborted`].
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (CompletionSender<T>, Completion<T>) {
        let (tx, rx) = oneshot::channel();
        (CompletionSender { tx: Some(tx) }, Completion { rx })
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sending half of a [`Completion`] channel, held by the operation.
pub(crate) struct CompletionSender<T> {
    tx: Option<oneshot::Sender<Result<T>>>,
}

impl<T> CompletionSender<T> {
    /// Deliver the outcome. A second call, or a receiver that is already
    /// gone, is a no-op.
    pub(crate) fn send(&mut self, outcome: Result<T>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(outcome);
        }
    }
}
