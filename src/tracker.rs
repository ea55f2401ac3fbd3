//! Transaction depth tracking and start-site diagnostics.

use crate::bind::ScalarParams;
use crate::classify::classify_begin_failure;
use crate::config::ExecutorConfig;
use crate::driver::Driver;
use crate::error::{ClassifiedError, Error, ErrorKind, Result};
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Where a transaction was started.
///
/// The source location comes from `#[track_caller]`; the backtrace follows the
/// usual `RUST_BACKTRACE` rules and is empty unless enabled.
#[derive(Debug, Clone)]
pub struct CallSite {
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

impl CallSite {
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    pub fn line(&self) -> u32 {
        self.location.line()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl PartialEq for CallSite {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for CallSite {}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.location, f)
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Commit,
    Rollback,
}

/// Transaction state of one connection.
///
/// `depth` is zero exactly when no transaction is open. With nested
/// emulation enabled, every level above the first is a `SAVEPOINT T<n>`
/// inside the single native transaction.
#[derive(Debug)]
pub struct TransactionTracker {
    depth: u32,
    started_at: Option<CallSite>,
    emulate_nested: bool,
    warn_depth: u32,
    max_depth: u32,
}

impl TransactionTracker {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            depth: 0,
            started_at: None,
            emulate_nested: config.emulate_nested_transactions,
            warn_depth: config.transaction_warn_depth,
            max_depth: config.transaction_max_depth,
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// Where the open transaction was started, if one is open.
    pub fn started_at(&self) -> Option<&CallSite> {
        self.started_at.as_ref()
    }

    /// Starts a transaction, or a savepoint when nesting inside an open one.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::TransactionConflict`] when the driver already has a
    ///   transaction open; the error carries the site that opened it.
    /// - [`ErrorKind::Query`] when the nesting limit would be reached.
    /// - Any classified driver failure.
    pub async fn begin<D>(&mut self, driver: &mut D, site: CallSite) -> Result<bool>
    where
        D: Driver + ?Sized,
    {
        if self.emulate_nested && self.depth > 0 {
            return self.begin_savepoint(driver).await;
        }

        match driver.begin_transaction().await {
            Ok(started) => {
                tracing::debug!(site = %site, "transaction started");
                self.depth = 1;
                self.started_at = Some(site);
                Ok(started)
            }
            Err(err) => {
                let kind = classify_begin_failure(&err);
                let mut classified = ClassifiedError::from_driver(kind, err);
                if kind == ErrorKind::TransactionConflict {
                    classified = classified.with_previous_transaction(self.started_at.clone());
                }
                Err(classified.into())
            }
        }
    }

    /// Commits the innermost level.
    ///
    /// # Errors
    ///
    /// [`Error::NoActiveTransaction`] at depth zero, otherwise any classified
    /// driver failure.
    pub async fn commit<D>(&mut self, driver: &mut D) -> Result<bool>
    where
        D: Driver + ?Sized,
    {
        self.finish(driver, Outcome::Commit).await
    }

    /// Rolls back the innermost level.
    ///
    /// # Errors
    ///
    /// Same as [`commit`](Self::commit).
    pub async fn rollback<D>(&mut self, driver: &mut D) -> Result<bool>
    where
        D: Driver + ?Sized,
    {
        self.finish(driver, Outcome::Rollback).await
    }

    async fn begin_savepoint<D>(&mut self, driver: &mut D) -> Result<bool>
    where
        D: Driver + ?Sized,
    {
        let next = self.depth + 1;
        if next >= self.max_depth {
            return Err(ClassifiedError::new(
                ErrorKind::Query,
                format!("Reached max nested transaction depth ({next})"),
            )
            .into());
        }

        exec(driver, &format!("SAVEPOINT T{}", self.depth)).await?;
        self.depth = next;

        if next >= self.warn_depth {
            tracing::warn!(depth = next, "Nested transactions at depth {next}");
        }
        Ok(true)
    }

    async fn finish<D>(&mut self, driver: &mut D, outcome: Outcome) -> Result<bool>
    where
        D: Driver + ?Sized,
    {
        if self.depth == 0 {
            return Err(Error::NoActiveTransaction);
        }

        if self.emulate_nested && self.depth > 1 {
            // Depth moves first so a failed savepoint statement still unwinds one level.
            self.depth -= 1;
            let statement = match outcome {
                Outcome::Commit => format!("RELEASE SAVEPOINT T{}", self.depth),
                Outcome::Rollback => format!("ROLLBACK TO SAVEPOINT T{}", self.depth),
            };
            exec(driver, &statement).await?;
            return Ok(true);
        }

        self.started_at = None;
        self.depth = 0;
        tracing::debug!(?outcome, "transaction finished");
        let result = match outcome {
            Outcome::Commit => driver.commit().await,
            Outcome::Rollback => driver.rollback().await,
        };
        result.map_err(|err| ClassifiedError::classify(err).into())
    }
}

async fn exec<D>(driver: &mut D, statement: &str) -> Result<()>
where
    D: Driver + ?Sized,
{
    driver
        .execute(statement, &ScalarParams::new())
        .await
        .map(|_| ())
        .map_err(|err| ClassifiedError::classify(err).with_statement(statement).into())
}
