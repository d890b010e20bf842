//! Typed result handlers for query operations.

use crate::driver::{DriverResult, ResultStatus};
use crate::error::{Error, Result};

/// Handler for the results a query produces.
///
/// Invoked once per result the server returns; a query that produces no
/// result never invokes it. The handler takes ownership of the result,
/// which is released when dropped, on every path.
///
/// The default implementation treats any result as a programming error:
/// a query whose handler does not expect results receiving one indicates
/// a flaw in application logic.
pub trait ResultHandler<R: DriverResult>: Send {
    /// Called for each result of the query.
    fn on_result(&mut self, result: R) -> Result<()> {
        drop(result);
        Err(Error::Logic(
            "received a result where none was expected".into(),
        ))
    }
}

/// A handler for queries that must not produce results.
#[derive(Debug, Default)]
pub struct NoResults;

impl<R: DriverResult> ResultHandler<R> for NoResults {}

/// A handler for commands that return no rows (`CREATE`, `INSERT`, ...).
///
/// Accepts exactly the `CommandOk` status; anything else is a result
/// error carrying the result's message.
#[derive(Debug, Default)]
pub struct CommandHandler;

impl CommandHandler {
    /// Create a new command handler.
    pub fn new() -> Self {
        Self
    }
}

impl<R: DriverResult> ResultHandler<R> for CommandHandler {
    fn on_result(&mut self, result: R) -> Result<()> {
        if result.status() != ResultStatus::CommandOk {
            return Err(Error::result(result.error_message()));
        }
        Ok(())
    }
}

/// Handler that collects all rows of a row-returning query.
///
/// Values are text-format cells; `None` is SQL NULL.
#[derive(Debug, Default)]
pub struct CollectHandler {
    rows: Vec<Vec<Option<String>>>,
}

impl CollectHandler {
    /// Create a new collect handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected rows.
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Take collected rows.
    pub fn into_rows(self) -> Vec<Vec<Option<String>>> {
        self.rows
    }

    /// Get the number of collected rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were collected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<R: DriverResult> ResultHandler<R> for CollectHandler {
    fn on_result(&mut self, result: R) -> Result<()> {
        if result.status() != ResultStatus::TuplesOk {
            return Err(Error::result(result.error_message()));
        }
        for row in 0..result.ntuples() {
            let mut values = Vec::with_capacity(result.nfields());
            for col in 0..result.nfields() {
                values.push(result.value(row, col));
            }
            self.rows.push(values);
        }
        Ok(())
    }
}

/// Handler that keeps only the first column of the first row.
#[derive(Debug, Default)]
pub struct FirstValueHandler {
    value: Option<String>,
}

impl FirstValueHandler {
    /// Create a new first value handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the first value if present.
    pub fn get(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Take the first value.
    pub fn into_value(self) -> Option<String> {
        self.value
    }
}

impl<R: DriverResult> ResultHandler<R> for FirstValueHandler {
    fn on_result(&mut self, result: R) -> Result<()> {
        if result.status() != ResultStatus::TuplesOk {
            return Err(Error::result(result.error_message()));
        }
        if self.value.is_none() && result.ntuples() > 0 && result.nfields() > 0 {
            self.value = result.value(0, 0);
        }
        Ok(())
    }
}
