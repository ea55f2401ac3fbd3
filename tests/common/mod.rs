#![allow(dead_code)]

use async_trait::async_trait;
use sqlx_resilient::{Driver, DriverError, ExecOutcome, ScalarParams};
use std::collections::VecDeque;

pub const DEADLOCK: &str =
    "SQLSTATE[40001]: Serialization failure: 1213 Deadlock found when trying to get lock; try restarting transaction";

pub fn deadlock() -> DriverError {
    DriverError::new(DEADLOCK).with_code("40001")
}

/// In-memory driver that replays scripted `execute` results.
///
/// Unscripted calls succeed with one affected row. Native transactions behave
/// like a driver that refuses a second `BEGIN` while one is open.
#[derive(Default)]
pub struct ScriptedDriver {
    script: VecDeque<Result<ExecOutcome, DriverError>>,
    pub executed: Vec<(String, ScalarParams)>,
    pub events: Vec<String>,
    pub native_open: bool,
    pub insert_id: Option<String>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_fail(mut self, err: DriverError) -> Self {
        self.script.push_back(Err(err));
        self
    }

    pub fn then_succeed(mut self, rows_affected: u64) -> Self {
        self.script.push_back(Ok(ExecOutcome {
            rows_affected,
            last_insert_id: None,
        }));
        self
    }

    pub fn execute_count(&self) -> usize {
        self.executed.len()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn execute(&mut self, sql: &str, values: &ScalarParams) -> Result<ExecOutcome, DriverError> {
        self.executed.push((sql.to_string(), values.clone()));
        self.events.push(sql.to_string());
        self.script.pop_front().unwrap_or(Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id: None,
        }))
    }

    async fn begin_transaction(&mut self) -> Result<bool, DriverError> {
        if self.native_open {
            return Err(DriverError::new("There is already an active transaction"));
        }
        self.native_open = true;
        self.events.push("BEGIN".to_string());
        Ok(true)
    }

    async fn commit(&mut self) -> Result<bool, DriverError> {
        self.native_open = false;
        self.events.push("COMMIT".to_string());
        Ok(true)
    }

    async fn rollback(&mut self) -> Result<bool, DriverError> {
        self.native_open = false;
        self.events.push("ROLLBACK".to_string());
        Ok(true)
    }

    fn last_insert_id(&self) -> Option<String> {
        self.insert_id.clone()
    }
}
