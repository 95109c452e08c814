use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::models::{OutcomeCategory, RequestOutcome, TestRun};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS test_runs (
                id TEXT PRIMARY KEY,
                scenario TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                params_json TEXT,
                summary_json TEXT
            );

            CREATE TABLE IF NOT EXISTS request_outcomes (
                id TEXT PRIMARY KEY,
                test_run_id TEXT NOT NULL,
                scenario TEXT NOT NULL,
                operation TEXT NOT NULL,
                vu_index INTEGER NOT NULL,
                iteration INTEGER NOT NULL,
                resource_id INTEGER NOT NULL,
                identity_id INTEGER NOT NULL,
                http_status INTEGER NOT NULL,
                category TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                message TEXT,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (test_run_id) REFERENCES test_runs(id)
            );

            CREATE INDEX IF NOT EXISTS idx_request_outcomes_run ON request_outcomes(test_run_id);
            ",
        )?;
        Ok(())
    }

    // Test Runs
    pub fn save_test_run(&self, run: &TestRun) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO test_runs (id, scenario, status, started_at, completed_at, params_json, summary_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id,
                run.scenario,
                run.status,
                run.started_at,
                run.completed_at,
                run.params_json,
                run.summary_json,
            ],
        )?;
        Ok(())
    }

    pub fn get_test_runs(&self, scenario: Option<&str>) -> Result<Vec<TestRun>> {
        let conn = self.conn();
        let mut query = String::from(
            "SELECT id, scenario, status, started_at, completed_at, params_json, summary_json FROM test_runs",
        );
        if scenario.is_some() {
            query.push_str(" WHERE scenario = ?1");
        }
        query.push_str(" ORDER BY started_at DESC");

        let mut stmt = conn.prepare(&query)?;
        let runs = match scenario {
            Some(s) => stmt.query_map(params![s], Self::map_test_run)?.collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt.query_map([], Self::map_test_run)?.collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(runs)
    }

    pub fn get_test_run(&self, id: &str) -> Result<Option<TestRun>> {
        let conn = self.conn();
        let run = conn
            .query_row(
                "SELECT id, scenario, status, started_at, completed_at, params_json, summary_json FROM test_runs WHERE id = ?1",
                params![id],
                Self::map_test_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Returns false when no run had that id.
    pub fn delete_test_run(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM request_outcomes WHERE test_run_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM test_runs WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn map_test_run(row: &Row<'_>) -> rusqlite::Result<TestRun> {
        Ok(TestRun {
            id: row.get(0)?,
            scenario: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            params_json: row.get(5)?,
            summary_json: row.get(6)?,
        })
    }

    // Request Outcomes
    pub fn save_outcomes(&self, outcomes: &[RequestOutcome]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO request_outcomes (id, test_run_id, scenario, operation, vu_index, iteration, resource_id, identity_id, http_status, category, duration_ms, message, timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for o in outcomes {
                stmt.execute(params![
                    o.id,
                    o.run_id,
                    o.scenario,
                    o.operation,
                    o.vu_index as i64,
                    o.iteration as i64,
                    o.resource_id as i64,
                    o.identity_id as i64,
                    o.http_status,
                    o.category.as_str(),
                    o.duration_ms,
                    o.message,
                    o.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_outcomes(&self, test_run_id: &str) -> Result<Vec<RequestOutcome>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, test_run_id, scenario, operation, vu_index, iteration, resource_id, identity_id, http_status, category, duration_ms, message, timestamp FROM request_outcomes WHERE test_run_id = ?1 ORDER BY timestamp ASC, vu_index ASC",
        )?;
        let outcomes = stmt
            .query_map(params![test_run_id], |row| {
                let category: String = row.get(9)?;
                let category = OutcomeCategory::parse(&category).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        9,
                        rusqlite::types::Type::Text,
                        format!("unknown outcome category '{}'", category).into(),
                    )
                })?;
                Ok(RequestOutcome {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    scenario: row.get(2)?,
                    operation: row.get(3)?,
                    vu_index: row.get::<_, i64>(4)? as u64,
                    iteration: row.get::<_, i64>(5)? as u64,
                    resource_id: row.get::<_, i64>(6)? as u64,
                    identity_id: row.get::<_, i64>(7)? as u64,
                    http_status: row.get(8)?,
                    category,
                    duration_ms: row.get(10)?,
                    message: row.get(11)?,
                    timestamp: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(outcomes)
    }
}
