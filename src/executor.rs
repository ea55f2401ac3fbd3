use crate::bind::{BindSource, BindValueConverter, Params, ScalarParams};
use crate::config::{ExecutorConfig, RetryPolicy};
use crate::driver::{Driver, ExecOutcome};
use crate::error::{ClassifiedError, Error, Result};
use crate::tracker::{CallSite, TransactionTracker};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::future::Future;
use std::pin::Pin;

lazy_static! {
    static ref NAMED_PLACEHOLDER: Regex = Regex::new(r":([A-Za-z0-9_]+)").unwrap();
    static ref INSERT_ID: Regex = Regex::new(r"^[1-9][0-9]*$").unwrap();
}

#[derive(Debug)]
struct LastStatement {
    statement: String,
    values: ScalarParams,
}

/// Executes statements through a [`Driver`], classifying failures and
/// retrying deadlocks on request.
///
/// One executor wraps one connection. Every operation takes `&mut self`, so
/// the transaction state and the last-statement record are never shared.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_resilient::{params, ErrorKind, ExecutorConfig, MySqlDriver, ResilientExecutor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExecutorConfig::default();
/// let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
/// let mut executor = ResilientExecutor::new(driver, config);
///
/// let result = executor
///     .perform_with_retry(
///         "UPDATE stock SET quantity = quantity - :n WHERE sku = :sku",
///         &params! { "n" => 1, "sku" => "A-100" },
///     )
///     .await;
///
/// if let Err(err) = result {
///     if err.kind() == Some(ErrorKind::Collation) {
///         eprintln!("bad input encoding: {}", executor.last_executed_query().unwrap_or_default());
///     }
///     return Err(err.into());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResilientExecutor<D> {
    driver: D,
    config: ExecutorConfig,
    converter: BindValueConverter,
    transactions: TransactionTracker,
    last_statement: Option<LastStatement>,
}

impl<D: Driver> ResilientExecutor<D> {
    pub fn new(driver: D, config: ExecutorConfig) -> Self {
        Self {
            converter: BindValueConverter::new(config.normalize_timestamps_to_utc),
            transactions: TransactionTracker::new(&config),
            driver,
            config,
            last_statement: None,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Direct driver access. Statements run this way bypass classification
    /// and transaction tracking.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_inner(self) -> D {
        self.driver
    }

    /// Runs a statement with named values.
    ///
    /// # Errors
    ///
    /// A classified error carrying `statement` and the converted values.
    pub async fn perform(&mut self, statement: &str, values: &Params) -> Result<ExecOutcome> {
        let values = self.converter.convert_all(values, None);
        self.perform_converted(statement, values).await
    }

    /// Runs a statement produced by a query builder, including its bulk values.
    pub async fn perform_query<Q>(&mut self, query: &Q) -> Result<ExecOutcome>
    where
        Q: BindSource + ?Sized,
    {
        let statement = query.statement();
        let values = self
            .converter
            .convert_all(query.bind_values(), query.bulk_bind_values());
        self.perform_converted(&statement, values).await
    }

    /// [`perform`](Self::perform), retrying deadlocks with the configured policy.
    pub async fn perform_with_retry(&mut self, statement: &str, values: &Params) -> Result<ExecOutcome> {
        let policy = self.config.retry_policy();
        self.perform_with_retry_policy(statement, values, policy).await
    }

    /// [`perform`](Self::perform), retrying deadlocks with `policy`.
    ///
    /// Runs the statement at most `policy.max_attempts` times, waiting
    /// `policy.delay` between attempts. Only deadlocks are retried; any other
    /// error, or the last deadlock, is returned as is.
    ///
    /// A deadlock rolls back the whole surrounding transaction on MySQL, so
    /// retrying a single statement is only meaningful outside one.
    pub async fn perform_with_retry_policy(
        &mut self,
        statement: &str,
        values: &Params,
        policy: RetryPolicy,
    ) -> Result<ExecOutcome> {
        let max_attempts = policy.max_attempts.max(1);
        let values = self.converter.convert_all(values, None);

        let mut attempt = 1;
        loop {
            match self.perform_converted(statement, values.clone()).await {
                Err(err) if err.is_deadlock() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay = ?policy.delay,
                        "deadlock detected, retrying statement"
                    );
                    tokio::time::sleep(policy.delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn perform_converted(&mut self, statement: &str, values: ScalarParams) -> Result<ExecOutcome> {
        tracing::debug!(statement, "performing statement");
        self.last_statement = Some(LastStatement {
            statement: statement.to_string(),
            values: values.clone(),
        });

        match self.driver.execute(statement, &values).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(ClassifiedError::classify(err)
                .with_statement(statement)
                .with_values(values)
                .into()),
        }
    }

    /// Starts a transaction, or a savepoint when nesting is emulated.
    ///
    /// The caller's location is remembered so a conflicting
    /// [`begin_transaction`](Self::begin_transaction) can report it.
    #[track_caller]
    pub fn begin_transaction(&mut self) -> impl Future<Output = Result<bool>> + '_ {
        let site = CallSite::capture();
        self.begin_at(site)
    }

    pub(crate) async fn begin_at(&mut self, site: CallSite) -> Result<bool> {
        self.transactions.begin(&mut self.driver, site).await
    }

    pub async fn commit(&mut self) -> Result<bool> {
        self.transactions.commit(&mut self.driver).await
    }

    pub async fn rollback(&mut self) -> Result<bool> {
        self.transactions.rollback(&mut self.driver).await
    }

    /// Number of open transaction levels; zero when none is open.
    pub fn transaction_depth(&self) -> u32 {
        self.transactions.depth()
    }

    pub fn transaction_started_at(&self) -> Option<&CallSite> {
        self.transactions.started_at()
    }

    /// The last performed statement with its values substituted.
    ///
    /// Values are inlined without driver escaping; use this for logs and
    /// debugging only.
    pub fn last_executed_query(&self) -> Option<String> {
        let last = self.last_statement.as_ref()?;
        let rendered = NAMED_PLACEHOLDER.replace_all(&last.statement, |caps: &Captures<'_>| {
            let name = &caps[1];
            last.values
                .get(name)
                .or_else(|| last.values.get(&format!(":{name}")))
                .map_or_else(|| caps[0].to_string(), |value| value.to_literal())
        });
        Some(rendered.into_owned())
    }

    /// The id generated by the last insert.
    ///
    /// # Errors
    ///
    /// [`Error::MissingInsertId`] when the driver reports none (or `0`),
    /// [`Error::InvalidInsertId`] when it is not a positive integer.
    pub fn last_insert_id(&self) -> Result<u64> {
        let raw = self
            .driver
            .last_insert_id()
            .filter(|id| !id.is_empty() && id != "0")
            .ok_or(Error::MissingInsertId)?;
        if !INSERT_ID.is_match(&raw) {
            return Err(Error::InvalidInsertId(raw));
        }
        raw.parse().map_err(|_| Error::InvalidInsertId(raw))
    }
}

/// Executes a function within a database transaction.
///
/// This function handles the transaction lifecycle:
/// - Begins a transaction (a savepoint if one is already open and nesting is emulated)
/// - Executes the provided function
/// - Commits on success
/// - Rolls back on error
///
/// A failing rollback is logged and the function's own error is returned.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_resilient::{params, with_transaction, ExecutorConfig, MySqlDriver, ResilientExecutor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExecutorConfig::default().with_emulate_nested_transactions(true);
/// let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
/// let mut executor = ResilientExecutor::new(driver, config);
///
/// with_transaction(&mut executor, |tx| {
///     Box::pin(async move {
///         tx.perform("INSERT INTO users (name) VALUES (:name)", &params! { "name" => "Alice" })
///             .await?;
///
///         // Runs inside SAVEPOINT T1; a failure only undoes the audit row.
///         let _ = with_transaction(tx, |nested| {
///             Box::pin(async move {
///                 nested
///                     .perform("INSERT INTO audit_log (action) VALUES (:action)", &params! { "action" => "created" })
///                     .await
///             })
///         })
///         .await;
///
///         Ok::<_, sqlx_resilient::Error>(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[track_caller]
pub fn with_transaction<'e, D, F, T>(
    executor: &'e mut ResilientExecutor<D>,
    f: F,
) -> impl Future<Output = Result<T>> + 'e
where
    D: Driver,
    F: for<'a> FnOnce(&'a mut ResilientExecutor<D>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>
        + 'e,
    T: Send + 'e,
{
    let site = CallSite::capture();
    async move {
        executor.begin_at(site).await?;

        match f(executor).await {
            Ok(result) => {
                executor.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = executor.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed transaction body failed");
                }
                Err(e)
            }
        }
    }
}
