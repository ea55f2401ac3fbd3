use crate::driver::Driver;
use crate::executor::ResilientExecutor;
use crate::tracker::CallSite;
use std::future::Future;
use std::pin::Pin;

/// Executes a function within a database transaction, using anyhow::Error for error handling.
///
/// This is a convenience wrapper around [`with_transaction`](crate::with_transaction) that
/// accepts closures returning `anyhow::Result<T>` instead of `crate::Result<T>`. Errors
/// from beginning or committing the transaction keep their [`Error`](crate::Error) type
/// and can be recovered with `downcast_ref`.
///
/// # Examples
///
/// ```rust,no_run
/// use sqlx_resilient::{params, with_transaction_anyhow, ExecutorConfig, MySqlDriver, ResilientExecutor};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = ExecutorConfig::default();
/// let driver = MySqlDriver::connect("mysql://localhost/test", &config).await?;
/// let mut executor = ResilientExecutor::new(driver, config);
///
/// with_transaction_anyhow(&mut executor, |tx| {
///     Box::pin(async move {
///         tx.perform("INSERT INTO users (name) VALUES (:name)", &params! { "name" => "Alice" })
///             .await?;
///         anyhow::ensure!(tx.last_insert_id()? > 0, "no id generated");
///         Ok::<_, anyhow::Error>(())
///     })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
#[track_caller]
pub fn with_transaction_anyhow<'e, D, F, T>(
    executor: &'e mut ResilientExecutor<D>,
    f: F,
) -> impl Future<Output = anyhow::Result<T>> + 'e
where
    D: Driver,
    F: for<'a> FnOnce(
            &'a mut ResilientExecutor<D>,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>
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
