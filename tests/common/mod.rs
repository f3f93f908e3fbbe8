//! Deterministic in-memory native driver for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

use pglink::native::{
    ConnectFlags, ConnectionStatus, NativeClient, NativeConnection, NativeResultSet, Oid,
    PollingStatus, TransactionStatus,
};

/// Canned result set, text format.
#[derive(Debug, Clone, Default)]
pub struct MockRows {
    pub cols: Vec<(String, Oid)>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MockRows {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One row, one int4 column.
    pub fn single_int(name: &str, value: i64) -> Self {
        Self {
            cols: vec![(name.to_string(), 23)],
            rows: vec![vec![Some(value.to_string())]],
        }
    }
}

impl NativeResultSet for MockRows {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn num_fields(&self) -> usize {
        self.cols.len()
    }

    fn field_name(&self, col: usize) -> &str {
        &self.cols[col].0
    }

    fn field_type_oid(&self, col: usize) -> Oid {
        self.cols[col].1
    }

    fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows[row][col].as_deref()
    }
}

/// Configurable driver; each connect clones the template into a fresh
/// connection sharing the SQL log.
pub struct MockDriver {
    /// Connect returns no handle at all.
    pub refuse_connect: bool,
    /// Connect returns a handle that reports Bad status.
    pub bad_status: bool,
    /// Script consumed by `connect_poll`; when exhausted the poll reports Ok.
    pub poll_script: Vec<PollingStatus>,
    /// `connect_poll` always reports Reading (socket stays silent).
    pub poll_stuck: bool,
    /// Exact SQL -> canned result. Unlisted SQL succeeds with no rows.
    pub fixtures: Vec<(String, MockRows)>,
    /// SQL that fails at the native layer.
    pub fail_sql: Vec<String>,
    /// `get_result` reports failure.
    pub fail_get_result: bool,
    /// Every SQL text that reached the native layer, across all connections.
    pub log: Arc<Mutex<Vec<String>>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            refuse_connect: false,
            bad_status: false,
            poll_script: Vec::new(),
            poll_stuck: false,
            fixtures: Vec::new(),
            fail_sql: Vec::new(),
            fail_get_result: false,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_fixture(mut self, sql: &str, rows: MockRows) -> Self {
        self.fixtures.push((sql.to_string(), rows));
        self
    }

    pub fn sql_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

impl NativeClient for MockDriver {
    fn connect(&self, _config: &str, _flags: ConnectFlags) -> Option<Box<dyn NativeConnection>> {
        if self.refuse_connect {
            return None;
        }
        let (local, peer) = UnixStream::pair().expect("socketpair");
        Some(Box::new(MockConn {
            bad: self.bad_status,
            poll_script: self.poll_script.iter().copied().collect(),
            poll_stuck: self.poll_stuck,
            fixtures: self.fixtures.clone(),
            fail_sql: self.fail_sql.clone(),
            fail_get_result: self.fail_get_result,
            log: Arc::clone(&self.log),
            local,
            _peer: peer,
            pending: None,
            tx: TransactionStatus::Idle,
            closed: false,
        }))
    }

    fn last_error(&self) -> String {
        "mock driver error".to_string()
    }
}

pub struct MockConn {
    bad: bool,
    poll_script: VecDeque<PollingStatus>,
    poll_stuck: bool,
    fixtures: Vec<(String, MockRows)>,
    fail_sql: Vec<String>,
    fail_get_result: bool,
    log: Arc<Mutex<Vec<String>>>,
    /// Exposed poll target; the silent peer keeps it unreadable.
    local: UnixStream,
    _peer: UnixStream,
    pending: Option<MockRows>,
    tx: TransactionStatus,
    closed: bool,
}

impl MockConn {
    fn lookup(&self, sql: &str) -> MockRows {
        self.fixtures
            .iter()
            .find(|(s, _)| s == sql)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_else(MockRows::empty)
    }

    fn track_transaction(&mut self, sql: &str) {
        if sql.starts_with("START TRANSACTION") || sql.starts_with("SAVEPOINT") {
            self.tx = TransactionStatus::InTransaction;
        } else if sql.starts_with("ROLLBACK TO SAVEPOINT") || sql.starts_with("RELEASE SAVEPOINT") {
            // still inside the outer transaction
        } else if sql.starts_with("COMMIT") || sql.starts_with("ROLLBACK") {
            self.tx = TransactionStatus::Idle;
        }
    }

    fn dispatch(&mut self, sql: &str) -> Option<MockRows> {
        self.log.lock().unwrap().push(sql.to_string());
        if self.fail_sql.iter().any(|s| s == sql) {
            return None;
        }
        self.track_transaction(sql);
        Some(self.lookup(sql))
    }
}

impl NativeConnection for MockConn {
    fn status(&self) -> ConnectionStatus {
        if self.bad {
            ConnectionStatus::Bad
        } else {
            ConnectionStatus::Ok
        }
    }

    fn connect_poll(&mut self) -> PollingStatus {
        if self.poll_stuck {
            return PollingStatus::Reading;
        }
        self.poll_script.pop_front().unwrap_or(PollingStatus::Ok)
    }

    fn socket(&self) -> Option<BorrowedFd<'_>> {
        Some(self.local.as_fd())
    }

    fn exec_params(
        &mut self,
        sql: &str,
        _params: &[Option<String>],
    ) -> Option<Box<dyn NativeResultSet>> {
        self.dispatch(sql)
            .map(|rows| Box::new(rows) as Box<dyn NativeResultSet>)
    }

    fn send_query_params(&mut self, sql: &str, _params: &[Option<String>]) -> bool {
        match self.dispatch(sql) {
            Some(rows) => {
                self.pending = Some(rows);
                true
            }
            None => false,
        }
    }

    fn get_result(&mut self) -> Option<Box<dyn NativeResultSet>> {
        if self.fail_get_result {
            return None;
        }
        self.pending
            .take()
            .map(|rows| Box::new(rows) as Box<dyn NativeResultSet>)
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.tx
    }

    fn last_error(&self) -> String {
        "mock native error".to_string()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
