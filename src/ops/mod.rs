//! Built-in operations: connect, reset, and query.

mod connect;
mod query;
mod reset;

pub use connect::Connect;
pub use query::Query;
pub use reset::Reset;
