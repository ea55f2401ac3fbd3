mod common;

use chrono::DateTime;
use common::{deadlock, ScriptedDriver};
use sqlx_resilient::{
    params, BindSource, DriverError, Error, ErrorKind, ExecutorConfig, Params, ResilientExecutor,
    RetryPolicy, ScalarValue,
};
use std::borrow::Cow;
use std::time::Duration;
use tokio::time::Instant;

fn executor(driver: ScriptedDriver) -> ResilientExecutor<ScriptedDriver> {
    ResilientExecutor::new(driver, ExecutorConfig::default())
}

fn classified(err: Error) -> sqlx_resilient::ClassifiedError {
    match err {
        Error::Classified(err) => err,
        other => panic!("expected a classified error, got {other:?}"),
    }
}

#[tokio::test]
async fn perform_converts_values_before_the_driver_sees_them() {
    let mut executor = executor(ScriptedDriver::new());
    let at = DateTime::parse_from_rfc3339("2024-06-30T23:30:00-02:00").unwrap();

    let outcome = executor
        .perform(
            "INSERT INTO events (at, active, note) VALUES (:at, :active, :note)",
            &params! { "at" => at, "active" => false, "note" => Option::<String>::None },
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows_affected, 1);
    let (sql, values) = &executor.driver().executed[0];
    assert_eq!(sql, "INSERT INTO events (at, active, note) VALUES (:at, :active, :note)");
    assert_eq!(values["at"], ScalarValue::Text("2024-07-01 01:30:00".to_string()));
    assert_eq!(values["active"], ScalarValue::Int(0));
    assert_eq!(values["note"], ScalarValue::Null);
}

#[tokio::test]
async fn timestamps_stay_local_when_normalization_is_off() {
    let config = ExecutorConfig::default().with_normalize_timestamps_to_utc(false);
    let mut executor = ResilientExecutor::new(ScriptedDriver::new(), config);
    let at = DateTime::parse_from_rfc3339("2024-06-30T23:30:00-02:00").unwrap();

    executor.perform("UPDATE t SET at = :at", &params! { "at" => at }).await.unwrap();

    let (_, values) = &executor.driver().executed[0];
    assert_eq!(values["at"], ScalarValue::Text("2024-06-30 23:30:00".to_string()));
}

#[tokio::test]
async fn failures_carry_statement_values_and_code() {
    let driver = ScriptedDriver::new().then_fail(
        DriverError::new("1366 (HY000): Incorrect string value: '\\xF0\\x9F\\x98\\x80' for column 'body' at row 1")
            .with_code("HY000"),
    );
    let mut executor = executor(driver);

    let err = executor
        .perform("INSERT INTO posts (body) VALUES (:body)", &params! { "body" => "\u{1F600}" })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Collation));
    let err = classified(err);
    assert_eq!(err.statement(), Some("INSERT INTO posts (body) VALUES (:body)"));
    assert_eq!(err.code(), Some("HY000"));
    assert_eq!(
        err.values().map(|values| values["body"].clone()),
        Some(ScalarValue::Text("\u{1F600}".to_string()))
    );
    assert!(err.driver_error().is_some());
}

#[tokio::test]
async fn other_failures_are_query_errors() {
    let driver = ScriptedDriver::new()
        .then_fail(DriverError::new("Lock wait timeout exceeded; try restarting transaction").with_code("HY000"));
    let mut executor = executor(driver);

    let err = executor.perform("DELETE FROM t", &Params::new()).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Query));
}

#[tokio::test(start_paused = true)]
async fn deadlocks_are_retried_until_success() {
    let driver = ScriptedDriver::new().then_fail(deadlock()).then_fail(deadlock()).then_succeed(4);
    let mut executor = executor(driver);
    let start = Instant::now();

    let outcome = executor
        .perform_with_retry_policy(
            "UPDATE stock SET n = n - 1 WHERE sku = :sku",
            &params! { "sku" => "A-1" },
            RetryPolicy::new(3, Duration::from_micros(250_000)),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rows_affected, 4);
    assert_eq!(executor.driver().execute_count(), 3);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(500), "{waited:?}");
    assert!(waited < Duration::from_millis(750), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_max_attempts() {
    let driver = ScriptedDriver::new()
        .then_fail(deadlock())
        .then_fail(deadlock())
        .then_fail(deadlock())
        .then_succeed(1);
    let mut executor = executor(driver);
    let start = Instant::now();

    let err = executor
        .perform_with_retry("UPDATE t SET a = :a", &params! { "a" => 1 })
        .await
        .unwrap_err();

    assert!(err.is_deadlock());
    assert_eq!(classified(err).statement(), Some("UPDATE t SET a = :a"));
    assert_eq!(executor.driver().execute_count(), 3);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(500), "{waited:?}");
    assert!(waited < Duration::from_millis(750), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn retry_settings_come_from_config() {
    let driver = (0..6).fold(ScriptedDriver::new(), |driver, _| driver.then_fail(deadlock()));
    let config = ExecutorConfig::default().with_deadlock_retry(5, 10_000);
    let mut executor = ResilientExecutor::new(driver, config);
    let start = Instant::now();

    let err = executor.perform_with_retry("UPDATE t SET a = 1", &Params::new()).await.unwrap_err();

    assert!(err.is_deadlock());
    assert_eq!(executor.driver().execute_count(), 5);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(40), "{waited:?}");
    assert!(waited < Duration::from_millis(50), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn non_deadlock_errors_are_not_retried() {
    let driver = ScriptedDriver::new()
        .then_fail(DriverError::new("1146 (42S02): Table 'shop.nope' doesn't exist"))
        .then_succeed(1);
    let mut executor = executor(driver);
    let start = Instant::now();

    let err = executor.perform_with_retry("SELECT * FROM nope", &Params::new()).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Query));
    assert_eq!(executor.driver().execute_count(), 1);
    assert!(start.elapsed() < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_still_runs_once() {
    let driver = ScriptedDriver::new().then_fail(deadlock()).then_succeed(1);
    let mut executor = executor(driver);

    let err = executor
        .perform_with_retry_policy("UPDATE t SET a = 1", &Params::new(), RetryPolicy::new(0, Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(err.is_deadlock());
    assert_eq!(executor.driver().execute_count(), 1);
}

#[tokio::test]
async fn last_executed_query_reflects_the_latest_statement() {
    let driver = ScriptedDriver::new().then_succeed(1).then_fail(deadlock());
    let mut executor = executor(driver);

    executor
        .perform("SELECT * FROM foo WHERE bar = :bar", &params! { "bar" => "qux" })
        .await
        .unwrap();
    assert_eq!(
        executor.last_executed_query().as_deref(),
        Some("SELECT * FROM foo WHERE bar = 'qux'")
    );

    let _ = executor
        .perform("DELETE FROM foo WHERE id IN (:ids)", &params! { "ids" => vec![3, 4] })
        .await;
    assert_eq!(
        executor.last_executed_query().as_deref(),
        Some("DELETE FROM foo WHERE id IN (3, 4)")
    );
}

struct InsertQuery {
    single: Params,
    bulk: Params,
}

impl BindSource for InsertQuery {
    fn statement(&self) -> Cow<'_, str> {
        Cow::Borrowed("INSERT INTO tags (id, label) VALUES (:id, :label)")
    }

    fn bind_values(&self) -> &Params {
        &self.single
    }

    fn bulk_bind_values(&self) -> Option<&Params> {
        Some(&self.bulk)
    }
}

#[tokio::test]
async fn query_builders_supply_single_and_bulk_values() {
    let mut executor = executor(ScriptedDriver::new());
    let query = InsertQuery {
        single: params! { "id" => 1, "label" => "draft" },
        bulk: params! { "label" => "final" },
    };

    executor.perform_query(&query).await.unwrap();

    let (sql, values) = &executor.driver().executed[0];
    assert_eq!(sql, "INSERT INTO tags (id, label) VALUES (:id, :label)");
    assert_eq!(values["id"], ScalarValue::Int(1));
    assert_eq!(values["label"], ScalarValue::Text("final".to_string()));
}

#[tokio::test]
async fn last_insert_id_comes_from_the_driver() {
    let mut driver = ScriptedDriver::new();
    driver.insert_id = Some("17".to_string());
    let mut executor = executor(driver);

    assert_eq!(executor.last_insert_id().unwrap(), 17);

    executor.driver_mut().insert_id = Some("0".to_string());
    assert!(matches!(executor.last_insert_id(), Err(Error::MissingInsertId)));
}
