//! An asynchronous operation engine for poll-based PostgreSQL drivers.
//!
//! # Features
//!
//! - **Driver-agnostic**: the client library is a trait mirroring the
//!   non-blocking libpq surface; the engine owns scheduling, not I/O
//! - **FIFO execution**: submitted operations run one at a time, in
//!   order, each completing exactly once
//! - **Readiness translation**: the driver's "needs read / needs write"
//!   polling protocol is mapped onto tokio readiness waits over a
//!   duplicated socket descriptor, rebinding when the driver swaps it
//! - **Timeouts and teardown**: per-operation deadlines, and abort of
//!   every in-flight and queued operation when the engine is dropped
//!
//! # Example
//!
//! ```ignore
//! use tokio_pq::ops::{Connect, Query};
//! use tokio_pq::{CollectHandler, CommandHandler};
//!
//! async fn example<D: tokio_pq::Driver>() -> tokio_pq::Result<()> {
//!     let (connect, connected) =
//!         Connect::<D>::new("host=localhost dbname=postgres", None)?;
//!     let connection = connect.into_connection()?;
//!     connected.await?;
//!
//!     let (create, created) =
//!         Query::new("CREATE TABLE t (n int)", CommandHandler::new(), None);
//!     connection.add(create);
//!     created.await?;
//!
//!     let (select, rows) = Query::new("SELECT n FROM t", CollectHandler::new(), None);
//!     connection.add(select);
//!     let rows = rows.await?;
//!     println!("{} rows", rows.len());
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod driver;
pub mod error;
pub mod handler;
pub mod operation;
pub mod ops;
mod socket;

pub use connection::Connection;
pub use driver::{ConnStatus, Driver, DriverResult, Flush, Polling, ResultStatus};
pub use error::{Error, Result};
pub use handler::{CollectHandler, CommandHandler, FirstValueHandler, NoResults, ResultHandler};
pub use operation::{Completion, Operation, Progress, Readiness};
pub use ops::{Connect, Query, Reset};
