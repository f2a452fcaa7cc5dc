use super::{ResultsStore, RunId};
use crate::errors::TesterError;
use crate::executor::results::{LogEntry, NewEntry};
use std::sync::Arc;

/// Snapshot of a run's state as recorded in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Fixture prefix last used by the run.
    pub database_prefix: String,
    /// Test class of the run's latest entry.
    pub test_class: String,
}

/// Handle on a test run. It only carries the run id; every query goes to
/// the store, so handles are cheap to create and reattach.
#[derive(Clone)]
pub struct TestRun {
    store: Arc<ResultsStore>,
    id: RunId,
}

impl TestRun {
    /// Allocate a new run in `store`.
    pub fn create_new(store: Arc<ResultsStore>) -> Result<Self, TesterError> {
        let id = store.create_new()?;
        Ok(Self { store, id })
    }

    /// Reattach to an existing run.
    pub fn get(store: Arc<ResultsStore>, id: RunId) -> Result<Self, TesterError> {
        if !store.run_exists(id)? {
            return Err(TesterError(format!("Test run {} does not exist.", id)));
        }
        Ok(Self { store, id })
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn store(&self) -> &Arc<ResultsStore> {
        &self.store
    }

    pub fn set_database_prefix(&self, prefix: &str) -> Result<(), TesterError> {
        self.store.set_database_prefix(self.id, prefix)
    }

    /// Load the run's prefix and latest class. Returns `None` until the run
    /// has logged an entry.
    pub fn load_state(&self) -> Result<Option<RunState>, TesterError> {
        self.store.get_current_test_run_state(self.id)
    }

    pub fn insert_log_entry(&self, entry: &NewEntry) -> Result<i64, TesterError> {
        self.store.insert_log_entry(self.id, entry)
    }

    /// Entries ordered by test class and message id.
    pub fn log_entries_by_test_class(&self) -> Result<Vec<LogEntry>, TesterError> {
        self.store.get_log_entries_by_test_class(self.id)
    }

    pub fn logged_classes(&self) -> Result<Vec<String>, TesterError> {
        self.store.logged_classes(self.id)
    }

    /// Remove the run and its entries from storage.
    pub fn remove_results(self) -> Result<usize, TesterError> {
        self.store.remove_results(self.id)
    }
}
