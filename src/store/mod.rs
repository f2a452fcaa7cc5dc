//! Persistent storage of test runs and their log entries.
//!
//! Runs live in `tester_test_id`, entries in `tester_log`. Both keys are
//! `AUTOINCREMENT` columns so an identifier is never handed out twice, even
//! after the results were removed. The connection sits behind a mutex, which
//! makes this store the single ordering authority for run and message ids.
pub mod run;

pub use run::{RunState, TestRun};

use crate::errors::TesterError;
use crate::executor::results::{LogEntry, NewEntry};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

/// Identifier of a test run.
pub type RunId = i64;

const RUN_TABLE: &str = "tester_test_id";
const LOG_TABLE: &str = "tester_log";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tester_test_id (
    test_id INTEGER PRIMARY KEY AUTOINCREMENT,
    last_prefix TEXT DEFAULT ''
);
CREATE TABLE IF NOT EXISTS tester_log (
    message_id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_id INTEGER NOT NULL DEFAULT 0,
    test_class TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    message_group TEXT NOT NULL DEFAULT '',
    exit_code INTEGER NOT NULL DEFAULT 0,
    process_output TEXT,
    process_error TEXT
);
CREATE INDEX IF NOT EXISTS reporter ON tester_log (test_class, message_id);
"#;

/// Run results storage backed by SQLite.
pub struct ResultsStore {
    conn: Mutex<Connection>,
}

impl ResultsStore {
    /// Open or create the results database at `path`. The schema is not
    /// touched; see [ResultsStore::build_testing_results_environment].
    pub fn open(path: &Path) -> Result<Self, TesterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TesterError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Ensure the schema exists. Existing results are removed first unless
    /// `keep_results` is set.
    pub fn build_testing_results_environment(
        &self,
        keep_results: bool,
    ) -> Result<(), TesterError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        if !keep_results {
            for table in &[LOG_TABLE, RUN_TABLE] {
                if table_exists(&tx, table)? {
                    tx.execute(&format!("DELETE FROM {}", table), [])?;
                    info!(table, "truncated results table");
                }
            }
        }
        tx.execute_batch(SCHEMA_SQL)?;
        tx.commit()?;
        Ok(())
    }

    /// Whether both results tables exist.
    pub fn validate_testing_results_environment(&self) -> Result<bool, TesterError> {
        let conn = self.conn.lock();
        Ok(table_exists(&conn, LOG_TABLE)? && table_exists(&conn, RUN_TABLE)?)
    }

    /// Allocate a fresh run identifier.
    pub fn create_new(&self) -> Result<RunId, TesterError> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO tester_test_id DEFAULT VALUES", [])?;
        let id = conn.last_insert_rowid();
        debug!(run = id, "allocated test run");
        Ok(id)
    }

    /// Whether the run exists.
    pub fn run_exists(&self, run: RunId) -> Result<bool, TesterError> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM tester_test_id WHERE test_id = ?1",
                params![run],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record the fixture prefix used by a run.
    pub fn set_database_prefix(&self, run: RunId, prefix: &str) -> Result<(), TesterError> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE tester_test_id SET last_prefix = ?1 WHERE test_id = ?2",
            params![prefix, run],
        )?;
        if affected == 0 {
            return Err(TesterError(format!(
                "Failed to set up database prefix: test run {} does not exist.",
                run
            )));
        }
        Ok(())
    }

    /// Append one entry to a run, returning its message id.
    pub fn insert_log_entry(&self, run: RunId, entry: &NewEntry) -> Result<i64, TesterError> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO tester_log (test_id, test_class, status, message_group, exit_code, process_output, process_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run,
                entry.test_class,
                entry.status.as_str(),
                entry.message_group,
                entry.exit_code,
                entry.process_output,
                entry.process_error,
            ],
        )?;
        if inserted != 1 {
            return Err(TesterError(format!(
                "Failed to log {} for test run {}.",
                entry.test_class, run
            )));
        }
        Ok(conn.last_insert_rowid())
    }

    /// All entries of a run, ordered by test class and then message id.
    pub fn get_log_entries_by_test_class(&self, run: RunId) -> Result<Vec<LogEntry>, TesterError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT message_id, test_id, test_class, status, message_group, exit_code, process_output, process_error
             FROM tester_log WHERE test_id = ?1
             ORDER BY test_class, message_id",
        )?;
        let rows = stmt.query_map(params![run], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row??);
        }
        Ok(entries)
    }

    /// Distinct classes that logged at least one entry in the run.
    pub fn logged_classes(&self, run: RunId) -> Result<Vec<String>, TesterError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT test_class FROM tester_log WHERE test_id = ?1 ORDER BY test_class",
        )?;
        let classes = stmt
            .query_map(params![run], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(classes)
    }

    /// Fixture prefix of the run and the class of its latest entry. `None`
    /// when the run does not exist or has not logged anything yet.
    pub fn get_current_test_run_state(&self, run: RunId) -> Result<Option<RunState>, TesterError> {
        let conn = self.conn.lock();
        let state = conn
            .query_row(
                "SELECT sttid.last_prefix, st.test_class
                 FROM (SELECT MAX(message_id) AS max_message_id FROM tester_log WHERE test_id = ?1) st_sub
                 JOIN tester_log st ON st.message_id = st_sub.max_message_id
                 JOIN tester_test_id sttid ON st.test_id = sttid.test_id",
                params![run],
                |row| {
                    Ok(RunState {
                        database_prefix: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        test_class: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Remove a run and all its entries. Returns the number of runs removed.
    pub fn remove_results(&self, run: RunId) -> Result<usize, TesterError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let entries = tx.execute("DELETE FROM tester_log WHERE test_id = ?1", params![run])?;
        let count = tx.execute("DELETE FROM tester_test_id WHERE test_id = ?1", params![run])?;
        tx.commit()?;
        debug!(run, entries, "removed test run results");
        Ok(count)
    }

    /// Remove every run and entry. Returns the number of runs removed.
    pub fn clean_up(&self) -> Result<usize, TesterError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tester_log", [])?;
        let count = tx.execute("DELETE FROM tester_test_id", [])?;
        tx.commit()?;
        info!(runs = count, "removed all test results");
        Ok(count)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, TesterError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn row_to_entry(row: &Row) -> rusqlite::Result<Result<LogEntry, TesterError>> {
    let status: String = row.get(3)?;
    let message_id = row.get(0)?;
    let test_id = row.get(1)?;
    let test_class = row.get(2)?;
    let message_group = row.get(4)?;
    let exit_code = row.get(5)?;
    let process_output: Option<String> = row.get(6)?;
    let process_error: Option<String> = row.get(7)?;
    Ok(status.parse().map(|status| LogEntry {
        message_id,
        test_id,
        test_class,
        status,
        message_group,
        exit_code,
        process_output: process_output.unwrap_or_default(),
        process_error: process_error.unwrap_or_default(),
    }))
}
