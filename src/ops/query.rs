//! The query operation.

use std::time::Duration;

use crate::driver::{ConnStatus, Driver, Flush};
use crate::error::{Error, Result};
use crate::handler::ResultHandler;
use crate::operation::{Completion, CompletionSender, Operation, Progress, Readiness};

/// The operation of executing a command on a connection.
///
/// Runs the driver's send / flush / consume / result protocol: the
/// command is dispatched in `begin`, outbound data is flushed until the
/// driver reports it fully sent, and results are then drained to the
/// handler until the driver signals the command is done. On success the
/// completion carries the handler back to the submitter, with whatever
/// it accumulated.
pub struct Query<H> {
    sql: String,
    handler: Option<H>,
    timeout: Option<Duration>,
    flushed: bool,
    done: CompletionSender<H>,
}

impl<H> Query<H> {
    /// Create a query operation for `sql` with the given result handler.
    pub fn new(
        sql: impl Into<String>,
        handler: H,
        timeout: Option<Duration>,
    ) -> (Self, Completion<H>) {
        let (done, completion) = Completion::channel();
        (
            Query {
                sql: sql.into(),
                handler: Some(handler),
                timeout,
                flushed: false,
                done,
            },
            completion,
        )
    }

    fn flush<D: Driver>(&mut self, driver: &mut D) -> Result<()> {
        match driver.flush() {
            Flush::Sent => {
                self.flushed = true;
                Ok(())
            }
            Flush::Pending => Ok(()),
            Flush::Failed => Err(Error::connection(driver.error_message())),
        }
    }

    /// Until the send queue is flushed the driver wants both directions;
    /// after that, results arrive on readability alone.
    fn wait_status(&self) -> Progress {
        if self.flushed {
            Progress::Read
        } else {
            Progress::ReadWrite
        }
    }
}

fn consume<D: Driver>(driver: &mut D) -> Result<()> {
    if !driver.consume_input() {
        return Err(Error::connection(driver.error_message()));
    }
    Ok(())
}

impl<D, H> Operation<D> for Query<H>
where
    D: Driver,
    H: ResultHandler<D::Result> + 'static,
{
    fn begin(&mut self, driver: &mut D) -> Result<Progress> {
        // A dead handle cannot accept commands; fail before handing the
        // driver anything to send.
        if driver.status() == ConnStatus::Bad {
            return Err(Error::connection(driver.error_message()));
        }

        if !driver.send_query(&self.sql) {
            return Err(Error::connection(driver.error_message()));
        }

        self.flush(driver)?;
        Ok(self.wait_status())
    }

    fn perform(&mut self, driver: &mut D, readiness: Readiness) -> Result<Progress> {
        if !self.flushed {
            // Readable input must be absorbed before flushing again, or
            // the flush can spin on a full kernel buffer.
            if readiness == Readiness::Readable {
                consume(driver)?;
            }
            self.flush(driver)?;
            return Ok(self.wait_status());
        }

        consume(driver)?;

        while !driver.is_busy() {
            let Some(result) = driver.result() else {
                return Ok(Progress::Done);
            };
            match self.handler.as_mut() {
                Some(handler) => handler.on_result(result)?,
                None => return Err(Error::Logic("query handler already taken".into())),
            }
        }

        Ok(Progress::Read)
    }

    fn complete(&mut self, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                if let Some(handler) = self.handler.take() {
                    self.done.send(Ok(handler));
                }
            }
            Err(err) => self.done.send(Err(err)),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
