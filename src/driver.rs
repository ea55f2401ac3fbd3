use crate::bind::ScalarParams;
use crate::error::DriverError;
use async_trait::async_trait;

/// What a successful statement reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    pub last_insert_id: Option<u64>,
}

/// The database primitives a [`ResilientExecutor`](crate::ResilientExecutor) is built on.
///
/// Implementations report failures verbatim as [`DriverError`]s; classification
/// happens in the executor. [`MySqlDriver`](crate::MySqlDriver) is the sqlx-backed
/// implementation, and tests can supply their own.
#[async_trait]
pub trait Driver: Send {
    /// Runs `sql` with named `values` (placeholders written as `:name`).
    async fn execute(&mut self, sql: &str, values: &ScalarParams) -> Result<ExecOutcome, DriverError>;

    /// Starts a native transaction.
    ///
    /// Must fail with a message containing "already an active transaction"
    /// when one is already open.
    async fn begin_transaction(&mut self) -> Result<bool, DriverError>;

    async fn commit(&mut self) -> Result<bool, DriverError>;

    async fn rollback(&mut self) -> Result<bool, DriverError>;

    /// The insert id generated by the last statement, as the driver reports it.
    fn last_insert_id(&self) -> Option<String>;
}
