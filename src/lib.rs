//! # sqlx-resilient
//!
//! Deadlock-aware statement execution, classified errors and tracked transactions for SQLx on MySQL.
//!
//! ## Features
//!
//! - **Classified Errors**: Driver failures become [`ErrorKind::Deadlock`], [`ErrorKind::Collation`],
//!   [`ErrorKind::Query`] or [`ErrorKind::TransactionConflict`], so callers can branch on a kind
//!   instead of matching message text
//! - **Deadlock Retry**: [`ResilientExecutor::perform_with_retry`] re-runs a statement a bounded
//!   number of times when, and only when, it deadlocks
//! - **Tracked Transactions**: Transaction depth is always queryable, and starting a transaction
//!   while one is open reports where the open one was started
//! - **Nested Transactions**: Optional savepoint emulation (`SAVEPOINT T1`, `T2`, ...)
//! - **Named Placeholders**: Write `:name` in SQL; [`MySqlDriver`] binds them positionally without
//!   touching quoted text; [`to_positional`] converts a statement for other `?`-only APIs
//! - **Driver Seam**: Everything runs on the [`Driver`] trait; [`MySqlDriver`] is the SQLx
//!   implementation and tests can plug in their own
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sqlx = { version = "0.8", features = ["mysql", "runtime-tokio"] }
//! sqlx-resilient = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Retrying Deadlocks
//!
//! ```rust,no_run
//! use sqlx_resilient::{params, ExecutorConfig, MySqlDriver, ResilientExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExecutorConfig::default();
//! let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
//! let mut executor = ResilientExecutor::new(driver, config);
//!
//! // Up to 3 attempts, 250ms apart (the configured defaults)
//! executor
//!     .perform_with_retry(
//!         "UPDATE accounts SET balance = balance - :amount WHERE id = :id",
//!         &params! { "amount" => 100, "id" => 1 },
//!     )
//!     .await?;
//!
//! // Or with an explicit policy
//! executor
//!     .perform_with_retry_policy(
//!         "UPDATE accounts SET balance = balance + :amount WHERE id = :id",
//!         &params! { "amount" => 100, "id" => 2 },
//!         RetryPolicy::new(5, Duration::from_millis(50)),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Branching on Error Kinds
//!
//! ```rust,no_run
//! use sqlx_resilient::{params, ErrorKind, ExecutorConfig, MySqlDriver, ResilientExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = ExecutorConfig::default();
//! # let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
//! # let mut executor = ResilientExecutor::new(driver, config);
//! match executor
//!     .perform("INSERT INTO posts (body) VALUES (:body)", &params! { "body" => "hello" })
//!     .await
//! {
//!     Ok(outcome) => println!("inserted {} rows", outcome.rows_affected),
//!     Err(err) if err.kind() == Some(ErrorKind::Collation) => {
//!         eprintln!("column charset rejected the input: {err}");
//!     }
//!     Err(err) => return Err(err.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Transactions
//!
//! ```rust,no_run
//! use sqlx_resilient::{params, with_transaction, ExecutorConfig, MySqlDriver, ResilientExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = ExecutorConfig::default();
//! # let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
//! # let mut executor = ResilientExecutor::new(driver, config);
//! let user_id = with_transaction(&mut executor, |tx| {
//!     Box::pin(async move {
//!         tx.perform("INSERT INTO users (name) VALUES (:name)", &params! { "name" => "Bob" })
//!             .await?;
//!         let user_id = tx.last_insert_id()?;
//!         let user_key = i64::try_from(user_id)
//!             .map_err(|_| sqlx_resilient::Error::InvalidInsertId(user_id.to_string()))?;
//!
//!         tx.perform(
//!             "INSERT INTO profiles (user_id, bio) VALUES (:user_id, :bio)",
//!             &params! { "user_id" => user_key, "bio" => "Software Developer" },
//!         )
//!         .await?;
//!
//!         // Both statements commit together
//!         Ok::<_, sqlx_resilient::Error>(user_id)
//!     })
//! })
//! .await?;
//!
//! println!("Created user with ID: {}", user_id);
//! # Ok(())
//! # }
//! ```
//!
//! ### Manual Transaction Control
//!
//! ```rust,no_run
//! use sqlx_resilient::{params, ExecutorConfig, MySqlDriver, ResilientExecutor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = ExecutorConfig::default();
//! # let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
//! # let mut executor = ResilientExecutor::new(driver, config);
//! executor.begin_transaction().await?;
//! assert_eq!(executor.transaction_depth(), 1);
//!
//! executor
//!     .perform("INSERT INTO users (name) VALUES (:name)", &params! { "name" => "Eve" })
//!     .await?;
//!
//! executor.commit().await?;
//! assert_eq!(executor.transaction_depth(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ### Positional Parameters
//!
//! ```rust
//! use sqlx_resilient::to_positional;
//!
//! let rewritten = to_positional(
//!     "SELECT * FROM foo WHERE bar = :bar AND qux = :qux",
//!     [("qux", "fooqux"), ("bar", "quxbar")],
//! );
//! assert_eq!(rewritten.sql, "SELECT * FROM foo WHERE bar = ? AND qux = ?");
//! assert_eq!(rewritten.values, vec!["quxbar", "fooqux"]);
//! ```
//!
//! ## How It Works
//!
//! 1. **Conversion**: Bind values are normalized (timestamps to `YYYY-MM-DD HH:MM:SS`, UTC by
//!    default; booleans to `1`/`0`) before they reach the driver
//! 2. **Classification**: A failing statement's driver error is classified and returned with the
//!    statement, the values and the vendor code attached; the driver error stays available as
//!    the source
//! 3. **Retry**: Only [`ErrorKind::Deadlock`] is retried, with a fixed delay between attempts
//! 4. **Tracking**: [`TransactionTracker`] keeps the depth and the start site of the open
//!    transaction for the connection
//!
//! ## Limitations
//!
//! - Currently only supports MySQL through SQLx
//! - Each named placeholder must appear exactly once in a statement
//! - A deadlock rolls back the whole MySQL transaction, so statement retry is meant for
//!   statements outside explicit transactions
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod bind;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod mysql;
pub mod positional;
pub mod tracker;

#[cfg(feature = "anyhow")]
pub mod anyhow_compat;

pub use bind::{BindSource, BindValue, BindValueConverter, Params, ScalarParams, ScalarValue};
pub use classify::{classify, classify_begin_failure};
pub use config::{ExecutorConfig, RetryPolicy};
pub use driver::{Driver, ExecOutcome};
pub use error::{ClassifiedError, DriverError, Error, ErrorKind, Result};
pub use executor::{with_transaction, ResilientExecutor};
pub use mysql::MySqlDriver;
pub use positional::{to_positional, RewriteResult};
pub use tracker::{CallSite, TransactionTracker};

#[cfg(feature = "anyhow")]
pub use anyhow_compat::with_transaction_anyhow;

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::config::ExecutorConfig;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::executor::{with_transaction, ResilientExecutor};
    pub use crate::mysql::MySqlDriver;
    pub use crate::params;
}
