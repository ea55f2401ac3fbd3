use serde::Deserialize;
use std::time::Duration;

/// Settings for a [`ResilientExecutor`](crate::ResilientExecutor).
///
/// Built once at startup and handed to the executor; nothing here is global.
/// Deserializable with every field optional, so it can be embedded in an
/// application's own config file.
///
/// ```
/// use sqlx_resilient::ExecutorConfig;
///
/// let config = ExecutorConfig::default()
///     .with_emulate_nested_transactions(true)
///     .with_deadlock_retry(5, 100_000);
///
/// assert!(config.normalize_timestamps_to_utc);
/// assert_eq!(config.retry_policy().max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Convert timestamps to UTC before formatting them for the driver.
    pub normalize_timestamps_to_utc: bool,
    /// Use savepoints when a transaction is started inside an open one.
    pub emulate_nested_transactions: bool,
    /// Nesting depth at which a warning is logged.
    pub transaction_warn_depth: u32,
    /// Nesting depth that is refused.
    pub transaction_max_depth: u32,
    pub deadlock_retry_max_attempts: u32,
    pub deadlock_retry_delay_micros: u64,
    /// MySQL `sql_mode` flags set on new sessions.
    pub sql_modes: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            normalize_timestamps_to_utc: true,
            emulate_nested_transactions: false,
            transaction_warn_depth: 3,
            transaction_max_depth: 7,
            deadlock_retry_max_attempts: 3,
            deadlock_retry_delay_micros: 250_000,
            sql_modes: [
                "ERROR_FOR_DIVISION_BY_ZERO",
                "NO_ZERO_DATE",
                "NO_ZERO_IN_DATE",
                "STRICT_ALL_TABLES",
                "ONLY_FULL_GROUP_BY",
                "NO_ENGINE_SUBSTITUTION",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn with_normalize_timestamps_to_utc(mut self, enabled: bool) -> Self {
        self.normalize_timestamps_to_utc = enabled;
        self
    }

    #[must_use]
    pub fn with_emulate_nested_transactions(mut self, enabled: bool) -> Self {
        self.emulate_nested_transactions = enabled;
        self
    }

    #[must_use]
    pub fn with_transaction_depths(mut self, warn_depth: u32, max_depth: u32) -> Self {
        self.transaction_warn_depth = warn_depth;
        self.transaction_max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_deadlock_retry(mut self, max_attempts: u32, delay_micros: u64) -> Self {
        self.deadlock_retry_max_attempts = max_attempts;
        self.deadlock_retry_delay_micros = delay_micros;
        self
    }

    #[must_use]
    pub fn with_sql_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sql_modes = modes.into_iter().map(Into::into).collect();
        self
    }

    /// The retry policy used by
    /// [`perform_with_retry`](crate::ResilientExecutor::perform_with_retry).
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.deadlock_retry_max_attempts,
            delay: Duration::from_micros(self.deadlock_retry_delay_micros),
        }
    }

    /// Statement run on every new MySQL session.
    ///
    /// Returns `None` when there is nothing to set.
    pub fn session_init_sql(&self) -> Option<String> {
        let mut assignments = Vec::new();
        if !self.sql_modes.is_empty() {
            assignments.push(format!("sql_mode = '{}'", self.sql_modes.join(",")));
        }
        if self.normalize_timestamps_to_utc {
            assignments.push("time_zone = '+00:00'".to_string());
        }
        if assignments.is_empty() {
            None
        } else {
            Some(format!("SET {}", assignments.join(", ")))
        }
    }
}

/// How often and how far apart a deadlocked statement is re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ExecutorConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}
