//! The operation execution engine.
//!
//! A [`Connection`] owns a driver handle and executes submitted
//! operations against it, one at a time, in submission order. The handle
//! itself lives on a spawned worker task; the `Connection` value is only
//! the submission side. Dropping the `Connection` tears the engine down:
//! the current operation and every pending one complete with
//! [`Error::Aborted`], then the handle is finished.

use std::collections::VecDeque;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::operation::{Operation, Progress, Readiness};
use crate::socket::BoundSocket;

type BoxedOperation<D> = Box<dyn Operation<D>>;

struct Queue<D: Driver> {
    pending: VecDeque<BoxedOperation<D>>,
    stopped: bool,
}

/// Shared record between the submission handle and the worker.
///
/// The lock guards only the queue and the stop flag; the driver and the
/// socket binding are owned by the worker and never touched under it.
struct Shared<D: Driver> {
    queue: Mutex<Queue<D>>,
    wakeup: Notify,
}

impl<D: Driver> Shared<D> {
    fn lock(&self) -> MutexGuard<'_, Queue<D>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopped(&self) -> bool {
        self.lock().stopped
    }
}

/// An asynchronous PostgreSQL connection driving queued operations.
pub struct Connection<D: Driver> {
    shared: Arc<Shared<D>>,
}

impl<D: Driver> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl<D: Driver> Connection<D> {
    /// Assume ownership of a driver handle and start the engine.
    ///
    /// The handle is put into non-blocking command mode; failure to do so
    /// is a connection error and the rejected handle is finished. Must be
    /// called from within a tokio runtime.
    pub fn new(mut driver: D) -> Result<Self> {
        if !driver.set_nonblocking() {
            return Err(Error::connection(driver.error_message()));
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                stopped: false,
            }),
            wakeup: Notify::new(),
        });
        tokio::spawn(run(driver, Arc::clone(&shared)));

        Ok(Connection { shared })
    }

    /// Enqueue an operation.
    ///
    /// Operations execute in FIFO order. None of the operation's methods
    /// run within this call; all run on the engine's worker task.
    pub fn add<O>(&self, operation: O)
    where
        O: Operation<D> + 'static,
    {
        self.shared.lock().pending.push_back(Box::new(operation));
        self.shared.wakeup.notify_one();
    }
}

impl<D: Driver> Drop for Connection<D> {
    fn drop(&mut self) {
        self.shared.lock().stopped = true;
        self.shared.wakeup.notify_one();
    }
}

enum Driven {
    /// The operation received its `complete` call.
    Completed,
    /// Teardown was observed; the caller owns the abort.
    Stopped,
}

enum Wake {
    Submitted,
    TimedOut(Duration),
    Ready(Readiness),
    Failed(Error),
}

async fn run<D: Driver>(mut driver: D, shared: Arc<Shared<D>>) {
    let mut socket = BoundSocket::closed();

    loop {
        let Some(mut operation) = next_operation(&shared).await else {
            break;
        };
        match drive(&shared, &mut driver, &mut socket, operation.as_mut()).await {
            Driven::Completed => {}
            Driven::Stopped => {
                // The current operation aborts first, pending ones after.
                operation.complete(Err(Error::Aborted));
                break;
            }
        }
    }

    let pending = {
        let mut queue = shared.lock();
        queue.stopped = true;
        mem::take(&mut queue.pending)
    };
    for mut operation in pending {
        operation.complete(Err(Error::Aborted));
    }

    // Finish the handle, strictly after every completion.
    drop(driver);
}

async fn next_operation<D: Driver>(shared: &Shared<D>) -> Option<BoxedOperation<D>> {
    loop {
        {
            let mut queue = shared.lock();
            if queue.stopped {
                return None;
            }
            if let Some(operation) = queue.pending.pop_front() {
                return Some(operation);
            }
        }
        shared.wakeup.notified().await;
    }
}

/// Drive one operation from `begin` to its `complete`, or until teardown.
async fn drive<D: Driver>(
    shared: &Shared<D>,
    driver: &mut D,
    socket: &mut BoundSocket,
    operation: &mut dyn Operation<D>,
) -> Driven {
    let begun = operation.begin(driver);
    let mut progress = match after_poll(begun, socket.rebind(driver.socket())) {
        Ok(Progress::Done) => {
            operation.complete(Ok(()));
            return Driven::Completed;
        }
        Ok(progress) => progress,
        Err(err) => {
            operation.complete(Err(err));
            return Driven::Completed;
        }
    };

    let limit = operation.timeout();
    let timer = time::sleep(limit.unwrap_or(Duration::ZERO));
    tokio::pin!(timer);

    loop {
        if !socket.is_open() {
            operation.complete(Err(no_socket(driver)));
            return Driven::Completed;
        }

        let want_read = matches!(progress, Progress::Read | Progress::ReadWrite);
        let want_write = matches!(progress, Progress::Write | Progress::ReadWrite);

        let wake = tokio::select! {
            biased;
            _ = shared.wakeup.notified() => Wake::Submitted,
            _ = timer.as_mut(), if limit.is_some() => Wake::TimedOut(limit.unwrap_or_default()),
            outcome = socket.readable(), if want_read => ready(outcome, Readiness::Readable),
            outcome = socket.writable(), if want_write => ready(outcome, Readiness::Writable),
        };

        let readiness = match wake {
            Wake::Submitted => {
                if shared.stopped() {
                    return Driven::Stopped;
                }
                continue;
            }
            Wake::TimedOut(limit) => {
                operation.complete(Err(Error::TimedOut(limit)));
                return Driven::Completed;
            }
            Wake::Failed(err) => {
                operation.complete(Err(err));
                return Driven::Completed;
            }
            Wake::Ready(readiness) => readiness,
        };

        let performed = operation.perform(driver, readiness);
        progress = match after_poll(performed, socket.rebind(driver.socket())) {
            Ok(Progress::Done) => {
                operation.complete(Ok(()));
                return Driven::Completed;
            }
            Ok(progress) => progress,
            Err(err) => {
                operation.complete(Err(err));
                return Driven::Completed;
            }
        };
    }
}

fn ready(outcome: std::io::Result<()>, readiness: Readiness) -> Wake {
    match outcome {
        Ok(()) => Wake::Ready(readiness),
        Err(err) => Wake::Failed(err.into()),
    }
}

/// Fold the outcome of a `begin`/`perform` round with the rebind that
/// follows it. The operation's own error wins; a rebind failure aborts an
/// otherwise healthy round.
fn after_poll(polled: Result<Progress>, rebound: Result<()>) -> Result<Progress> {
    let progress = polled?;
    rebound?;
    Ok(progress)
}

fn no_socket<D: Driver>(driver: &D) -> Error {
    let message = driver.error_message();
    if message.trim().is_empty() {
        Error::connection("driver connection has no socket")
    } else {
        Error::connection(message)
    }
}
