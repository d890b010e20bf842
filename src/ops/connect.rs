//! The connect operation.

use std::time::Duration;

use crate::connection::Connection;
use crate::driver::{ConnStatus, Driver, Polling};
use crate::error::{Error, Result};
use crate::operation::{Completion, CompletionSender, Operation, Progress, Readiness};

/// Observer invoked with the handle's status after each polling round.
type StatusObserver = Box<dyn FnMut(ConnStatus) + Send>;

/// The operation of connecting to a PostgreSQL database.
///
/// A `Connect` owns the started driver handle until it is attached to an
/// engine with [`into_connection`](Connect::into_connection), which hands
/// ownership over and enqueues the connect as the engine's first
/// operation.
pub struct Connect<D: Driver> {
    driver: Option<D>,
    timeout: Option<Duration>,
    status: ConnStatus,
    observer: Option<StatusObserver>,
    done: CompletionSender<()>,
}

impl<D: Driver> std::fmt::Debug for Connect<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connect").finish_non_exhaustive()
    }
}

impl<D: Driver> Connect<D> {
    /// Start a connection attempt from a conninfo string.
    ///
    /// `timeout` bounds the whole attempt; `None` lets it run arbitrarily
    /// long.
    pub fn new(conninfo: &str, timeout: Option<Duration>) -> Result<(Self, Completion<()>)> {
        Self::from_driver(D::start(conninfo)?, timeout)
    }

    /// Start a connection attempt from keyword/value pairs.
    pub fn with_params(
        params: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<(Self, Completion<()>)> {
        Self::from_driver(D::start_params(params)?, timeout)
    }

    /// Adopt a handle on which the driver's start routine has already been
    /// called.
    ///
    /// A handle that is already in the `Bad` state is rejected with a
    /// connection error and finished.
    pub fn from_driver(driver: D, timeout: Option<Duration>) -> Result<(Self, Completion<()>)> {
        let status = driver.status();
        if status == ConnStatus::Bad {
            return Err(Error::connection(driver.error_message()));
        }

        let (done, completion) = Completion::channel();
        Ok((
            Connect {
                driver: Some(driver),
                timeout,
                status,
                observer: None,
                done,
            },
            completion,
        ))
    }

    /// Register an observer for connection status changes.
    ///
    /// The observer runs after every non-terminal polling round, e.g. to
    /// follow TLS negotiation phases.
    pub fn on_status_change<F>(mut self, observer: F) -> Self
    where
        F: FnMut(ConnStatus) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Build a [`Connection`] around the started handle and enqueue this
    /// operation as its first entry.
    pub fn into_connection(mut self) -> Result<Connection<D>> {
        let driver = self.driver.take().ok_or_else(|| {
            Error::Logic("connect operation no longer owns a connection handle".into())
        })?;

        let connection = Connection::new(driver)?;
        connection.add(self);
        Ok(connection)
    }
}

impl<D: Driver> Operation<D> for Connect<D> {
    fn begin(&mut self, _driver: &mut D) -> Result<Progress> {
        // Before the first poll, behave as if the last poll asked to
        // write (the driver's convention for a freshly started attempt).
        Ok(Progress::Write)
    }

    fn perform(&mut self, driver: &mut D, _readiness: Readiness) -> Result<Progress> {
        let progress = match driver.connect_poll() {
            Polling::Writing => Progress::Write,
            Polling::Reading => Progress::Read,
            Polling::Ok => return Ok(Progress::Done),
            Polling::Failed => return Err(Error::connection(driver.error_message())),
        };

        self.status = driver.status();
        if let Some(observer) = &mut self.observer {
            observer(self.status);
        }

        Ok(progress)
    }

    fn complete(&mut self, outcome: Result<()>) {
        self.done.send(outcome);
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
