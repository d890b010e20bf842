//! The reset operation.

use std::time::Duration;

use crate::driver::{Driver, Polling};
use crate::error::{Error, Result};
use crate::operation::{Completion, CompletionSender, Operation, Progress, Readiness};

/// The operation of resetting an established connection.
///
/// Re-runs the connection handshake on the engine's handle. The driver
/// usually replaces its socket in the process; the engine rebinds
/// accordingly.
pub struct Reset {
    timeout: Option<Duration>,
    done: CompletionSender<()>,
}

impl Reset {
    /// Create a reset operation. `timeout` bounds the whole attempt.
    pub fn new(timeout: Option<Duration>) -> (Self, Completion<()>) {
        let (done, completion) = Completion::channel();
        (Reset { timeout, done }, completion)
    }
}

impl<D: Driver> Operation<D> for Reset {
    fn begin(&mut self, driver: &mut D) -> Result<Progress> {
        if !driver.reset_start() {
            return Err(Error::connection(driver.error_message()));
        }

        // A freshly started reset polls exactly like a freshly started
        // connect: as if the last poll asked to write.
        Ok(Progress::Write)
    }

    fn perform(&mut self, driver: &mut D, _readiness: Readiness) -> Result<Progress> {
        match driver.reset_poll() {
            Polling::Writing => Ok(Progress::Write),
            Polling::Reading => Ok(Progress::Read),
            Polling::Ok => Ok(Progress::Done),
            Polling::Failed => Err(Error::connection(driver.error_message())),
        }
    }

    fn complete(&mut self, outcome: Result<()>) {
        self.done.send(outcome);
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
