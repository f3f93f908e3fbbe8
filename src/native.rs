//! The native client boundary.
//!
//! The wire protocol is not implemented here. A libpq-style driver sits
//! behind these traits and exposes the handful of primitives the facade
//! needs: connect, status, non-blocking connect polling, a pollable socket,
//! synchronous and asynchronous query dispatch, result retrieval and
//! transaction status. Tests plug in a deterministic in-memory driver.

use std::os::fd::BorrowedFd;

/// PostgreSQL Object Identifier (OID)
pub type Oid = u32;

/// Flags passed to the native connect call, built from [`Opts`](crate::Opts).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectFlags {
    /// Force a fresh physical connection instead of reusing a pooled one.
    pub force_new: bool,
    /// Start the connection non-blocking; completion is driven by
    /// [`NativeConnection::connect_poll`].
    pub nonblocking: bool,
}

/// Status of a native connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handle is usable
    Ok,
    /// Handle is unusable and must be discarded
    Bad,
}

/// What a non-blocking connect needs next, as reported by the native poll
/// primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// Wait until the socket is readable, then poll again
    Reading,
    /// Wait until the socket is writable, then poll again
    Writing,
    /// The connection attempt failed
    Failed,
    /// The connection is established
    Ok,
}

/// Transaction status reported by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Not in a transaction block
    #[default]
    Idle,
    /// A command is currently executing
    Active,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block (commands rejected until rollback)
    InError,
    /// Status could not be determined (e.g. bad connection)
    Unknown,
}

impl TransactionStatus {
    /// Returns true unless the connection is known to be outside a
    /// transaction block.
    pub fn in_transaction(self) -> bool {
        !matches!(self, TransactionStatus::Idle | TransactionStatus::Unknown)
    }
}

/// Entry point of a native driver.
pub trait NativeClient {
    /// Open a connection. `config` is an opaque connection string passed
    /// through verbatim. Returns `None` on failure; consult
    /// [`last_error`](Self::last_error) for the reason.
    fn connect(&self, config: &str, flags: ConnectFlags) -> Option<Box<dyn NativeConnection>>;

    /// Last error reported by the driver outside any connection.
    fn last_error(&self) -> String;
}

/// One native connection handle.
pub trait NativeConnection {
    /// Current status of the handle.
    fn status(&self) -> ConnectionStatus;

    /// Advance a non-blocking connect one step.
    fn connect_poll(&mut self) -> PollingStatus;

    /// The underlying socket, for readiness waits during non-blocking
    /// connect. `None` if the driver cannot expose one.
    fn socket(&self) -> Option<BorrowedFd<'_>>;

    /// Execute a parameterized query synchronously. Parameters are
    /// text-format wire values, `None` meaning SQL NULL. Returns `None` on
    /// failure.
    fn exec_params(
        &mut self,
        sql: &str,
        params: &[Option<String>],
    ) -> Option<Box<dyn NativeResultSet>>;

    /// Dispatch a parameterized query without waiting for its result.
    /// Returns false if the query could not be sent.
    fn send_query_params(&mut self, sql: &str, params: &[Option<String>]) -> bool;

    /// Block until the result of a previously sent query is available.
    /// Returns `None` on failure or when no query is pending.
    fn get_result(&mut self) -> Option<Box<dyn NativeResultSet>>;

    /// Current transaction status.
    fn transaction_status(&self) -> TransactionStatus;

    /// Last error reported on this connection.
    fn last_error(&self) -> String;

    /// Release the handle. Called at most once.
    fn close(&mut self);
}

/// A completed query's result set, text format.
pub trait NativeResultSet {
    /// Number of rows.
    fn num_rows(&self) -> usize;

    /// Number of columns.
    fn num_fields(&self) -> usize;

    /// Column name.
    fn field_name(&self, col: usize) -> &str;

    /// Column type OID.
    fn field_type_oid(&self, col: usize) -> Oid;

    /// Raw text value at `(row, col)`. `None` is SQL NULL.
    fn value(&self, row: usize, col: usize) -> Option<&str>;
}
