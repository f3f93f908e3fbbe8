//! Lifecycle, sync query and hook behavior.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{MockDriver, MockRows};
use pglink::{Connection, ConnectionState, Error, Opts, Param, Query, Value};

fn mock_opts() -> Opts {
    Opts::new("postgres://mock/db")
}

#[test]
fn connect_fires_hooks_once() {
    let mut conn = Connection::new(Box::new(MockDriver::new()), mock_opts());
    let fired = Rc::new(Cell::new(0));
    let seen = Rc::clone(&fired);
    conn.on_connect(move |c| {
        assert!(c.is_connected());
        seen.set(seen.get() + 1);
        Ok(())
    });

    conn.connect().unwrap();
    assert!(conn.is_connected());
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.opts().config, "postgres://mock/db");
    assert_eq!(fired.get(), 1);

    // a second connect on an established connection is a no-op
    conn.connect().unwrap();
    assert_eq!(fired.get(), 1);
}

#[test]
fn empty_config_is_a_configuration_error() {
    let mut conn = Connection::new(Box::new(MockDriver::new()), Opts::default());
    assert_eq!(conn.state(), ConnectionState::Unconfigured);
    let err = conn.connect().unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn refused_connect_is_a_connection_error() {
    let mut driver = MockDriver::new();
    driver.refuse_connect = true;
    let mut conn = Connection::new(Box::new(driver), mock_opts());
    let err = conn.connect().unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[test]
fn bad_status_handle_is_a_connection_error() {
    let mut driver = MockDriver::new();
    driver.bad_status = true;
    let mut conn = Connection::new(Box::new(driver), mock_opts());
    let err = conn.connect().unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[test]
fn query_connects_lazily() {
    let driver = MockDriver::new().with_fixture("SELECT 1", MockRows::single_int("?column?", 1));
    let mut conn = Connection::new(Box::new(driver), mock_opts());
    assert!(!conn.is_connected());

    let result = conn.query("SELECT 1", vec![]).unwrap();
    assert!(conn.is_connected());
    assert_eq!(result.num_rows(), 1);
}

#[test]
fn select_one_yields_the_integer_one() {
    let driver = MockDriver::new().with_fixture("SELECT 1", MockRows::single_int("?column?", 1));
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    let result = conn.query("SELECT 1", vec![]).unwrap();
    let rows: Vec<_> = result.rows().collect::<pglink::Result<_>>().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("?column?").unwrap(), &Value::Int(1));
}

#[test]
fn rows_iteration_is_restartable() {
    let driver = MockDriver::new().with_fixture("SELECT 1", MockRows::single_int("n", 1));
    let mut conn = Connection::new(Box::new(driver), mock_opts());
    let result = conn.query("SELECT 1", vec![]).unwrap();

    assert_eq!(result.rows().count(), 1);
    assert_eq!(result.rows().count(), 1);
}

#[test]
fn materialized_values_match_the_parser_output() {
    let fixture = MockRows {
        cols: vec![
            ("flag".to_string(), 16),
            ("id".to_string(), 23),
            ("ratio".to_string(), 701),
            ("label".to_string(), 25),
            ("missing".to_string(), 25),
        ],
        rows: vec![vec![
            Some("t".to_string()),
            Some("42".to_string()),
            Some("1.5".to_string()),
            Some("hello".to_string()),
            None,
        ]],
    };
    let driver = MockDriver::new().with_fixture("SELECT mixed", fixture);
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    let result = conn.query("SELECT mixed", vec![]).unwrap();
    let row = result.first().unwrap().unwrap();
    assert_eq!(row.get("flag").unwrap(), &Value::Bool(true));
    assert_eq!(row.get("id").unwrap(), &Value::Int(42));
    assert_eq!(row.get("ratio").unwrap(), &Value::Float(1.5));
    assert_eq!(row.get("label").unwrap(), &Value::Text("hello".into()));
    assert!(row.get("missing").unwrap().is_null());
    assert!(matches!(
        row.get("nope").unwrap_err(),
        Error::NoSuchColumn(_)
    ));
}

#[test]
fn prebuilt_query_with_params_never_reaches_the_driver() {
    let driver = MockDriver::new();
    let log = driver.sql_log();
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    let prebuilt = Query::new("SELECT $1", vec![Param::Int(1)]);
    let err = conn.query(prebuilt, vec![Param::Int(2)]).unwrap_err();
    assert!(matches!(err, Error::CantPassParams));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn query_failure_carries_query_and_native_error() {
    let mut driver = MockDriver::new();
    driver.fail_sql.push("SELECT broken".to_string());
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    let err = conn.query("SELECT broken", vec![]).unwrap_err();
    assert_eq!(err.query().map(Query::sql), Some("SELECT broken"));
    match err {
        Error::QueryFailed { query, native } => {
            assert_eq!(query.sql(), "SELECT broken");
            assert_eq!(native, "mock native error");
        }
        other => panic!("expected QueryFailed, got {other:?}"),
    }
}

#[test]
fn results_are_debug_formattable() {
    let driver = MockDriver::new().with_fixture("SELECT 1", MockRows::single_int("n", 1));
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    let result = conn.query("SELECT 1", vec![]).unwrap();
    let repr = format!("{result:?}");
    assert!(repr.contains("QueryResult"));
    assert!(repr.contains("num_rows: 1"));
}

#[test]
fn query_hook_receives_query_and_timing() {
    let driver = MockDriver::new();
    let mut conn = Connection::new(Box::new(driver), mock_opts());
    let seen: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));
    let inner = Rc::clone(&seen);
    conn.on_query(move |_, query, elapsed| {
        assert_eq!(query.sql(), "SELECT 1");
        inner.set(Some(elapsed.is_some()));
        Ok(())
    });

    conn.query("SELECT 1", vec![]).unwrap();
    // sync dispatch is timed when a hook is registered
    assert_eq!(seen.get(), Some(true));
}

#[test]
fn failing_hook_aborts_remaining_hooks() {
    let mut conn = Connection::new(Box::new(MockDriver::new()), mock_opts());
    let later = Rc::new(Cell::new(0));
    conn.on_connect(|_| Err(Error::Connection("hook refused".into())));
    let inner = Rc::clone(&later);
    conn.on_connect(move |_| {
        inner.set(inner.get() + 1);
        Ok(())
    });

    let err = conn.connect().unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(later.get(), 0);
}

#[test]
fn transaction_scenario_leaves_idle_after_rollback() {
    let driver = MockDriver::new();
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    conn.begin(None).unwrap();
    assert!(conn.in_transaction().unwrap());
    conn.execute("UPDATE t SET x = 1", vec![]).unwrap();
    assert!(conn.in_transaction().unwrap());
    conn.rollback(None).unwrap();
    assert!(!conn.in_transaction().unwrap());
}

#[test]
fn savepoints_use_savepoint_sql() {
    let driver = MockDriver::new();
    let log = driver.sql_log();
    let mut conn = Connection::new(Box::new(driver), mock_opts());

    conn.begin(None).unwrap();
    conn.begin(Some("sp1")).unwrap();
    conn.rollback(Some("sp1")).unwrap();
    conn.commit(Some("sp1")).unwrap();
    conn.commit(None).unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        [
            "START TRANSACTION",
            "SAVEPOINT sp1",
            "ROLLBACK TO SAVEPOINT sp1",
            "RELEASE SAVEPOINT sp1",
            "COMMIT",
        ]
    );
}

#[test]
fn close_is_idempotent_and_fires_hooks_once() {
    let mut conn = Connection::new(Box::new(MockDriver::new()), mock_opts());
    let fired = Rc::new(Cell::new(0));
    let inner = Rc::clone(&fired);
    conn.on_close(move |_| {
        inner.set(inner.get() + 1);
        Ok(())
    });

    conn.connect().unwrap();
    conn.close().unwrap();
    conn.close().unwrap();
    assert_eq!(fired.get(), 1);
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn a_closed_connection_cannot_be_reused() {
    let mut conn = Connection::new(Box::new(MockDriver::new()), mock_opts());
    conn.connect().unwrap();
    conn.close().unwrap();

    assert!(matches!(conn.connect().unwrap_err(), Error::Connection(_)));
    assert!(matches!(
        conn.query("SELECT 1", vec![]).unwrap_err(),
        Error::Connection(_)
    ));
}
