//! sqlx-backed [`Driver`] for MySQL.

use crate::bind::{ScalarParams, ScalarValue};
use crate::config::ExecutorConfig;
use crate::driver::{Driver, ExecOutcome};
use crate::error::DriverError;
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlQueryResult};
use sqlx::query::Query;
use sqlx::{Connection, MySql, MySqlConnection};

/// A single MySQL connection exposed as a [`Driver`].
///
/// Transactions are started with plain `BEGIN`/`COMMIT`/`ROLLBACK` so their
/// state can be tracked here; starting a second one while one is open fails
/// with "There is already an active transaction".
pub struct MySqlDriver {
    conn: MySqlConnection,
    in_transaction: bool,
    last_insert_id: Option<u64>,
}

impl MySqlDriver {
    /// Connects and applies [`ExecutorConfig::session_init_sql`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or the session
    /// settings are rejected.
    pub async fn connect(url: &str, config: &ExecutorConfig) -> Result<Self, DriverError> {
        let conn = MySqlConnection::connect(url).await?;
        let mut driver = Self::from_connection(conn);
        if let Some(init) = config.session_init_sql() {
            tracing::debug!(statement = %init, "initializing session");
            sqlx::Executor::execute(&mut driver.conn, init.as_str()).await?;
        }
        Ok(driver)
    }

    /// Wraps an existing connection as is.
    pub fn from_connection(conn: MySqlConnection) -> Self {
        Self {
            conn,
            in_transaction: false,
            last_insert_id: None,
        }
    }

    /// Returns the underlying connection.
    pub fn into_inner(self) -> MySqlConnection {
        self.conn
    }

    async fn run_raw(&mut self, sql: &str) -> Result<MySqlQueryResult, DriverError> {
        Ok(sqlx::Executor::execute(&mut self.conn, sql).await?)
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn execute(&mut self, sql: &str, values: &ScalarParams) -> Result<ExecOutcome, DriverError> {
        let result = if values.is_empty() {
            self.run_raw(sql).await?
        } else {
            let (sql, values) = bind_named(sql, values);
            let query = values.into_iter().fold(sqlx::query(&sql), bind_scalar);
            query.execute(&mut self.conn).await?
        };

        let last_insert_id = Some(result.last_insert_id()).filter(|id| *id > 0);
        self.last_insert_id = last_insert_id;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id,
        })
    }

    async fn begin_transaction(&mut self) -> Result<bool, DriverError> {
        if self.in_transaction {
            return Err(DriverError::new("There is already an active transaction"));
        }
        self.run_raw("BEGIN").await?;
        self.in_transaction = true;
        Ok(true)
    }

    async fn commit(&mut self) -> Result<bool, DriverError> {
        if !self.in_transaction {
            return Err(DriverError::new("There is no active transaction"));
        }
        self.in_transaction = false;
        self.run_raw("COMMIT").await?;
        Ok(true)
    }

    async fn rollback(&mut self) -> Result<bool, DriverError> {
        if !self.in_transaction {
            return Err(DriverError::new("There is no active transaction"));
        }
        self.in_transaction = false;
        self.run_raw("ROLLBACK").await?;
        Ok(true)
    }

    fn last_insert_id(&self) -> Option<String> {
        self.last_insert_id.map(|id| id.to_string())
    }
}

fn bind_scalar<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: ScalarValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        ScalarValue::Null => query.bind(None::<String>),
        ScalarValue::Int(value) => query.bind(value),
        ScalarValue::Float(value) => query.bind(value),
        ScalarValue::Text(value) => query.bind(value),
        // Lists are flattened by `bind_named`; kept here so every value binds.
        ScalarValue::List(items) => items.into_iter().fold(query, bind_scalar),
    }
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    Quoted(u8),
    LineComment,
    BlockComment,
}

/// Turns `:name` placeholders into `?` and collects the values in order.
///
/// Quoted strings, quoted identifiers and comments are copied untouched, as is
/// any `?` already present. A list binds one `?` per element (nested lists
/// flattened); an empty one becomes `NULL`. A name with no value is left as
/// written.
fn bind_named(sql: &str, values: &ScalarParams) -> (String, Vec<ScalarValue>) {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut bound = Vec::with_capacity(values.len());
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' | b'"' | b'`' => state = State::Quoted(b),
                b'#' => state = State::LineComment,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = State::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    idx += 1;
                }
                b':' if idx == 0 || bytes[idx - 1] != b':' => {
                    let end = name_end(bytes, idx + 1);
                    if end > idx + 1 {
                        let name = &sql[idx + 1..end];
                        match lookup(values, name) {
                            Some(value) => {
                                out.push_str(&sql[copied..idx]);
                                push_placeholders(&mut out, &mut bound, value);
                                copied = end;
                            }
                            None => tracing::debug!(placeholder = name, "no value bound for placeholder"),
                        }
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::Quoted(quote) => {
                if b == b'\\' && quote != b'`' {
                    idx += 1;
                } else if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[copied..]);
    (out, bound)
}

fn name_end(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}

fn lookup<'v>(values: &'v ScalarParams, name: &str) -> Option<&'v ScalarValue> {
    values.get(name).or_else(|| values.get(&format!(":{name}")))
}

fn push_placeholders(out: &mut String, bound: &mut Vec<ScalarValue>, value: &ScalarValue) {
    let ScalarValue::List(items) = value else {
        out.push('?');
        bound.push(value.clone());
        return;
    };

    let mut elements = Vec::new();
    flatten(items, &mut elements);
    if elements.is_empty() {
        out.push_str("NULL");
    } else {
        out.push_str(&vec!["?"; elements.len()].join(", "));
        bound.extend(elements);
    }
}

fn flatten(items: &[ScalarValue], out: &mut Vec<ScalarValue>) {
    for item in items {
        match item {
            ScalarValue::List(nested) => flatten(nested, out),
            other => out.push(other.clone()),
        }
    }
}
