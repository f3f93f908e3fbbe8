//! Connection lifecycle, query dispatch and hooks.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::debug;

use crate::error::{Error, Result};
use crate::native::{
    ConnectFlags, ConnectionStatus, NativeClient, NativeConnection, PollingStatus,
};
use crate::opts::Opts;
use crate::query::{Param, Query, QuerySource};
use crate::result::{AsyncResult, AsyncState, Materializer, QueryResult};
use crate::row::{BasicRowFactory, RowFactory};
use crate::type_names::{TypeNameCache, TypeNameMap};
use crate::value::{DataTypeParser, TextDataTypeParser};

/// Hook fired after a successful connect or on close.
pub type LifecycleHook = Rc<dyn Fn(&Connection) -> Result<()>>;

/// Hook fired around query dispatch. The duration is measured for
/// synchronous queries only; async dispatch passes `None`.
pub type QueryHook = Rc<dyn Fn(&Connection, &Query, Option<Duration>) -> Result<()>>;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection string configured yet
    Unconfigured,
    /// Configured, no connect attempted
    Unconnected,
    /// Non-blocking connect in progress, completed by the poll loop
    Connecting,
    /// Established
    Connected,
    /// Closed; terminal, a new instance is required to reconnect
    Closed,
}

/// One logical PostgreSQL connection over a native driver.
///
/// Not internally synchronized; all operations on one instance must be
/// serialized by the caller.
pub struct Connection {
    client: Box<dyn NativeClient>,
    opts: Opts,
    state: ConnectionState,
    native: Option<Box<dyn NativeConnection>>,
    row_factory: Rc<dyn RowFactory>,
    parser: Rc<dyn DataTypeParser>,
    type_names: Option<Rc<TypeNameMap>>,
    pending: Option<(Query, Rc<RefCell<AsyncState>>)>,
    connect_hooks: Vec<LifecycleHook>,
    close_hooks: Vec<LifecycleHook>,
    query_hooks: Vec<QueryHook>,
}

impl Connection {
    /// Create a connection over the given native driver. No connect is
    /// attempted until [`connect`](Self::connect) or the first query.
    pub fn new(client: Box<dyn NativeClient>, opts: Opts) -> Self {
        let state = if opts.config.is_empty() {
            ConnectionState::Unconfigured
        } else {
            ConnectionState::Unconnected
        };
        Self {
            client,
            opts,
            state,
            native: None,
            row_factory: Rc::new(BasicRowFactory),
            parser: Rc::new(TextDataTypeParser),
            type_names: None,
            pending: None,
            connect_hooks: Vec::new(),
            close_hooks: Vec::new(),
            query_hooks: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration this connection was created with.
    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// True once the connection is established and connect hooks have fired.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Replace the row factory used for subsequent results.
    pub fn set_row_factory(&mut self, row_factory: impl RowFactory + 'static) {
        self.row_factory = Rc::new(row_factory);
    }

    /// Replace the data type parser used for subsequent results.
    pub fn set_data_type_parser(&mut self, parser: impl DataTypeParser + 'static) {
        self.parser = Rc::new(parser);
    }

    /// Register a hook fired after every successful connect, in
    /// registration order.
    pub fn on_connect(&mut self, hook: impl Fn(&Connection) -> Result<()> + 'static) {
        self.connect_hooks.push(Rc::new(hook));
    }

    /// Register a hook fired once when the connection closes.
    pub fn on_close(&mut self, hook: impl Fn(&Connection) -> Result<()> + 'static) {
        self.close_hooks.push(Rc::new(hook));
    }

    /// Register a hook fired around query dispatch. Wall-clock timing is
    /// only measured when at least one query hook is registered.
    pub fn on_query(&mut self, hook: impl Fn(&Connection, &Query, Option<Duration>) -> Result<()> + 'static) {
        self.query_hooks.push(Rc::new(hook));
    }

    /// Open the native connection.
    ///
    /// In async mode this only starts the non-blocking connect; completion
    /// is driven by the poll loop on first use (or [`wait_connected`](Self::wait_connected)).
    pub fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => {
                return Err(Error::Connection("connection is closed".into()));
            }
            ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
            ConnectionState::Unconfigured | ConnectionState::Unconnected => {}
        }
        if self.opts.config.is_empty() {
            return Err(Error::Configuration(
                "no connection string was provided".into(),
            ));
        }

        let flags = ConnectFlags {
            force_new: self.opts.force_new,
            nonblocking: self.opts.connect_async,
        };
        let Some(native) = self.client.connect(&self.opts.config, flags) else {
            return Err(Error::Connection(format!(
                "connect failed: {}",
                self.client.last_error()
            )));
        };
        if native.status() == ConnectionStatus::Bad {
            return Err(Error::Connection(format!(
                "connect failed (bad connection): {}",
                native.last_error()
            )));
        }

        if self.opts.connect_async {
            if native.socket().is_none() {
                return Err(Error::Connection(
                    "native driver exposes no pollable socket".into(),
                ));
            }
            self.native = Some(native);
            self.state = ConnectionState::Connecting;
            debug!("non-blocking connect started");
        } else {
            self.native = Some(native);
            self.state = ConnectionState::Connected;
            debug!("connected");
            self.fire_connect()?;
        }
        Ok(())
    }

    /// Drive a pending non-blocking connect to completion, connecting
    /// lazily first if needed.
    pub fn wait_connected(&mut self) -> Result<()> {
        self.connected_native().map(|_| ())
    }

    /// Execute a parameterized query synchronously.
    pub fn query(
        &mut self,
        query: impl Into<QuerySource>,
        params: Vec<Param>,
    ) -> Result<QueryResult> {
        let query = query.into().normalize(params)?;

        // skip the timer syscalls entirely when nobody listens
        let started = (!self.query_hooks.is_empty()).then(Instant::now);

        let native = self.connected_native()?;
        let result = native.exec_params(query.sql(), &query.wire_params());
        let Some(native_result) = result else {
            let native_error = self.native_last_error();
            return Err(Error::QueryFailed {
                query,
                native: native_error,
            });
        };

        if let Some(started) = started {
            self.fire_query(&query, Some(started.elapsed()))?;
        }
        Ok(QueryResult::new(native_result, self.materializer()))
    }

    /// Execute a query and discard its result.
    pub fn execute(&mut self, query: impl Into<QuerySource>, params: Vec<Param>) -> Result<()> {
        self.query(query, params).map(|_| ())
    }

    /// Dispatch a query without waiting for its result.
    ///
    /// At most one async query may be outstanding; a second dispatch fails
    /// before anything reaches the native layer. The returned handle stays
    /// pending until [`wait_for_async_query`](Self::wait_for_async_query).
    pub fn async_query(
        &mut self,
        query: impl Into<QuerySource>,
        params: Vec<Param>,
    ) -> Result<AsyncResult> {
        if self.pending.is_some() {
            return Err(Error::AsyncQueryPending);
        }
        let query = query.into().normalize(params)?;

        let native = self.connected_native()?;
        if !native.send_query_params(query.sql(), &query.wire_params()) {
            let native_error = self.native_last_error();
            return Err(Error::AsyncQueryFailed {
                query,
                native: native_error,
            });
        }
        debug!(sql = query.sql(), "async query sent");

        self.fire_query(&query, None)?;

        let slot = Rc::new(RefCell::new(AsyncState::Pending));
        let result = AsyncResult::new(Rc::clone(&slot), self.materializer());
        self.pending = Some((query, slot));
        Ok(result)
    }

    /// Block until the outstanding async query's result is available and
    /// feed it into the handle returned by [`async_query`](Self::async_query).
    ///
    /// On failure the outstanding query is discarded; the error carries it.
    pub fn wait_for_async_query(&mut self) -> Result<()> {
        let Some((query, slot)) = self.pending.take() else {
            return Err(Error::NoAsyncQuery);
        };
        let native = self.connected_native()?;
        let Some(native_result) = native.get_result() else {
            let native_error = self.native_last_error();
            return Err(Error::AsyncQueryFailed {
                query,
                native: native_error,
            });
        };
        *slot.borrow_mut() = AsyncState::Finished(native_result);
        Ok(())
    }

    /// Open a transaction, or create a savepoint inside one.
    pub fn begin(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("SAVEPOINT {}", name),
            None => "START TRANSACTION".to_string(),
        };
        self.execute(sql, Vec::new())
    }

    /// Commit the transaction, or release a savepoint.
    pub fn commit(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("RELEASE SAVEPOINT {}", name),
            None => "COMMIT".to_string(),
        };
        self.execute(sql, Vec::new())
    }

    /// Roll back the transaction, or roll back to a savepoint.
    pub fn rollback(&mut self, savepoint: Option<&str>) -> Result<()> {
        let sql = match savepoint {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {}", name),
            None => "ROLLBACK".to_string(),
        };
        self.execute(sql, Vec::new())
    }

    /// Ask the native layer whether a transaction block is open.
    ///
    /// No local depth tracking exists; nesting correctness is the caller's
    /// responsibility.
    pub fn in_transaction(&mut self) -> Result<bool> {
        let native = self.connected_native()?;
        Ok(native.transaction_status().in_transaction())
    }

    /// Load the oid -> type name map used by subsequent results.
    pub fn load_type_names(&mut self, cache: &dyn TypeNameCache) -> Result<()> {
        let map = cache.load(self)?;
        self.type_names = Some(Rc::new(map));
        Ok(())
    }

    /// Release the native handle and fire close hooks. Idempotent; a
    /// closed connection cannot be reopened.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        if let Some(mut native) = self.native.take() {
            native.close();
        }
        self.pending = None;
        self.state = ConnectionState::Closed;
        debug!("closed");
        self.fire_close()
    }

    fn materializer(&self) -> Materializer {
        Materializer {
            row_factory: Rc::clone(&self.row_factory),
            parser: Rc::clone(&self.parser),
            type_names: self.type_names.clone(),
        }
    }

    fn native_last_error(&self) -> String {
        match &self.native {
            Some(native) => native.last_error(),
            None => self.client.last_error(),
        }
    }

    /// Lazy-connect and return the established native handle, driving the
    /// connect poll loop first when a non-blocking connect is in progress.
    fn connected_native(&mut self) -> Result<&mut dyn NativeConnection> {
        if self.state == ConnectionState::Closed {
            return Err(Error::Connection("connection is closed".into()));
        }
        if self.native.is_none() {
            self.connect()?;
        }
        if self.state == ConnectionState::Connecting {
            self.poll_connect()?;
        }
        match self.native.as_deref_mut() {
            Some(native) => Ok(native),
            None => Err(Error::Connection("connection is not established".into())),
        }
    }

    /// The non-blocking connect poll loop: ask the native layer what to
    /// wait on next, wait for socket readiness, repeat. Bounded by the
    /// configured wall-clock budget; on timeout the connection is left
    /// unusable.
    fn poll_connect(&mut self) -> Result<()> {
        let timeout = self.opts.connect_timeout;
        let started = Instant::now();
        loop {
            let native = self
                .native
                .as_deref_mut()
                .ok_or_else(|| Error::Connection("connection is not established".into()))?;
            match native.connect_poll() {
                PollingStatus::Reading => {
                    wait_ready(native, PollFlags::POLLIN, started, timeout)?;
                }
                PollingStatus::Writing => {
                    wait_ready(native, PollFlags::POLLOUT, started, timeout)?;
                }
                PollingStatus::Failed => {
                    return Err(Error::Connection(format!(
                        "async connect failed: {}",
                        native.last_error()
                    )));
                }
                PollingStatus::Ok => {
                    self.state = ConnectionState::Connected;
                    debug!(elapsed = ?started.elapsed(), "connected (non-blocking)");
                    self.fire_connect()?;
                    return Ok(());
                }
            }
            if started.elapsed() > timeout {
                return Err(Error::ConnectTimeout {
                    elapsed: started.elapsed(),
                    timeout,
                });
            }
        }
    }

    fn fire_connect(&self) -> Result<()> {
        for hook in &self.connect_hooks {
            hook(self)?;
        }
        Ok(())
    }

    fn fire_close(&self) -> Result<()> {
        for hook in &self.close_hooks {
            hook(self)?;
        }
        Ok(())
    }

    fn fire_query(&self, query: &Query, elapsed: Option<Duration>) -> Result<()> {
        for hook in &self.query_hooks {
            hook(self, query, elapsed)?;
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // hook failures have nowhere to propagate during drop
        let _ = self.close();
    }
}

/// Block until the native socket is ready for the given interest, in
/// short bounded slices so the overall connect budget stays enforceable.
/// Never spins: each slice is a real `poll(2)` sleep.
fn wait_ready(
    native: &mut dyn NativeConnection,
    flags: PollFlags,
    started: Instant,
    timeout: Duration,
) -> Result<()> {
    let Some(fd) = native.socket() else {
        return Err(Error::Connection(
            "native driver exposes no pollable socket".into(),
        ));
    };
    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(Error::ConnectTimeout {
                elapsed: started.elapsed(),
                timeout,
            });
        }
        let slice_ms = remaining.min(Duration::from_millis(100)).as_millis().max(1) as u8;
        let mut fds = [PollFd::new(fd, flags)];
        match poll(&mut fds, PollTimeout::from(slice_ms)) {
            Ok(0) => {} // not ready yet, re-check the clock
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => {}
            Err(e) => return Err(e.into()),
        }
    }
}
