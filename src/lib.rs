//! A PostgreSQL client facade over a pluggable libpq-style native driver.
//!
//! # Features
//!
//! - **Single-connection lifecycle**: lazy connect, explicit close, an
//!   observable `Unconnected -> Connecting -> Connected -> Closed` state
//!   machine
//! - **Non-blocking connect**: a poll loop over the driver's connect-poll
//!   primitive with bounded socket readiness waits (no busy spinning)
//! - **Sync and async queries**: parameterized dispatch with at most one
//!   in-flight async query per connection
//! - **Lazy typed rows**: on-demand materialization through a pluggable
//!   `DataTypeParser` and `RowFactory`
//! - **Lifecycle hooks**: ordered connect/close/query observers with
//!   opt-in query timing
//! - **Type name cache**: a file-backed oid -> name map with cross-process
//!   safe first population (exclusive flock + atomic rename)
//!
//! The wire protocol is not implemented here: a driver implements the
//! traits in [`native`] and the facade drives it.
//!
//! # Example
//!
//! ```no_run
//! use pglink::{Connection, Opts, Param};
//!
//! fn run(driver: Box<dyn pglink::native::NativeClient>) -> pglink::Result<()> {
//!     let opts = Opts::try_from("postgres://localhost/mydb")?;
//!     let mut conn = Connection::new(driver, opts);
//!
//!     let result = conn.query("SELECT $1::int AS num", vec![Param::from(1)])?;
//!     for row in result.rows() {
//!         let row = row?;
//!         println!("num = {}", row.get("num")?);
//!     }
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod native;
pub mod opts;
pub mod query;
pub mod result;
pub mod row;
pub mod type_names;
pub mod value;

pub use connection::{Connection, ConnectionState, LifecycleHook, QueryHook};
pub use error::{Error, Result};
pub use native::{ConnectFlags, ConnectionStatus, Oid, PollingStatus, TransactionStatus};
pub use opts::Opts;
pub use query::{Param, Query, QuerySource};
pub use result::{AsyncResult, AsyncRows, QueryResult, Rows};
pub use row::{BasicRowFactory, Row, RowFactory};
pub use type_names::{FileTypeNameCache, TypeNameCache, TypeNameMap, builtin_type_name};
pub use value::{DataTypeParser, TextDataTypeParser, Value};
