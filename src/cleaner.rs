//! Removal of state left behind by crashed or aborted test runs.
use crate::errors::TesterError;
use crate::picker::toml::Config;
use crate::store::{ResultsStore, RunId};
use glob::MatchOptions;
use regex::Regex;
use rusqlite::Connection;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Which parts of the environment to clean.
#[derive(Debug, Clone, Copy)]
pub struct CleanFlags {
    pub database: bool,
    pub temp_directories: bool,
    pub results: bool,
    /// Restrict result removal to one run.
    pub run: Option<RunId>,
}

impl Default for CleanFlags {
    fn default() -> Self {
        Self {
            database: true,
            temp_directories: true,
            results: true,
            run: None,
        }
    }
}

/// Result of one cleanup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The step was disabled.
    Skipped,
    /// Number of entries removed.
    Removed(usize),
    /// The step could not run. Later steps still did.
    Failed(String),
}

impl Default for Step {
    fn default() -> Self {
        Step::Skipped
    }
}

impl From<Result<usize, TesterError>> for Step {
    fn from(res: Result<usize, TesterError>) -> Self {
        match res {
            Ok(count) => Step::Removed(count),
            Err(TesterError(msg)) => Step::Failed(msg),
        }
    }
}

/// What a cleanup removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub tables: Step,
    pub directories: Step,
    /// Removed runs. [Step::Skipped] means results were left in place.
    pub results: Step,
}

impl CleanupSummary {
    /// Whether any step failed.
    pub fn has_failures(&self) -> bool {
        [&self.tables, &self.directories, &self.results]
            .iter()
            .any(|step| matches!(step, Step::Failed(_)))
    }
}

pub struct Cleaner {
    fixture_db: PathBuf,
    temp_root: PathBuf,
    store: Arc<ResultsStore>,
}

impl Cleaner {
    pub fn new(conf: &Config, store: Arc<ResultsStore>) -> Self {
        Self {
            fixture_db: conf.resolve(&conf.environment.fixture_db),
            temp_root: conf.resolve(&conf.environment.temp_root),
            store,
        }
    }

    /// Drop fixture tables named `test` followed by digits. Other tables are
    /// never touched. A table that cannot be dropped is logged and skipped.
    pub fn clean_database(&self) -> Result<usize, TesterError> {
        if !self.fixture_db.exists() {
            debug!(path = %self.fixture_db.display(), "no fixture database");
            return Ok(0);
        }
        let conn = Connection::open(&self.fixture_db)?;
        let fixture = Regex::new(r"^test\d+")?;
        let tables = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'test%'",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };

        let mut count = 0;
        for table in tables.iter().filter(|name| fixture.is_match(name)) {
            let sql = format!("DROP TABLE \"{}\"", table.replace('"', "\"\""));
            match conn.execute(&sql, []) {
                Ok(_) => {
                    debug!(table = %table, "dropped leftover table");
                    count += 1;
                }
                Err(err) => warn!(table = %table, error = %err, "could not drop leftover table"),
            }
        }
        info!(count, "cleaned fixture database");
        Ok(count)
    }

    /// Remove every entry of the temporary root not starting with `.`,
    /// relaxing permissions first. An entry that cannot be removed is logged
    /// and skipped.
    pub fn clean_temporary_directories(&self) -> Result<usize, TesterError> {
        if !self.temp_root.is_dir() {
            return Ok(0);
        }
        let pattern = format!("{}/*", glob::Pattern::escape(&self.temp_root.to_string_lossy()));
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };

        let mut count = 0;
        for entry in glob::glob_with(&pattern, options)? {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(error = %err, "could not read temporary entry");
                    continue;
                }
            };
            if path
                .file_name()
                .map_or(true, |name| name.to_string_lossy().starts_with('.'))
            {
                continue;
            }
            relax_permissions(&path);
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => {
                    debug!(path = %path.display(), "removed temporary entry");
                    count += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not remove temporary entry")
                }
            }
        }
        info!(count, "cleaned temporary directories");
        Ok(count)
    }

    /// Remove the results of `run`, or of every run.
    pub fn clean_results(&self, run: Option<RunId>) -> Result<usize, TesterError> {
        match run {
            Some(run) => self.store.remove_results(run),
            None => self.store.clean_up(),
        }
    }

    /// Clean the parts of the environment selected by `flags`. A step that
    /// fails is logged and recorded; the remaining steps still run.
    pub fn clean_environment(&self, flags: CleanFlags) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        if flags.database {
            summary.tables = self.clean_database().into();
        }
        if flags.temp_directories {
            summary.directories = self.clean_temporary_directories().into();
        }
        if flags.results {
            summary.results = self.clean_results(flags.run).into();
        } else {
            warn!("clear results is disabled, the results table will not be cleared");
        }
        for (step, outcome) in &[
            ("database", &summary.tables),
            ("temporary directories", &summary.directories),
            ("results", &summary.results),
        ] {
            if let Step::Failed(msg) = outcome {
                warn!(step, error = %msg, "cleanup step failed");
            }
        }
        summary
    }
}

/// Best-effort `0700` on `path` and everything below it. Directories are
/// opened up before their children are listed.
#[cfg(unix)]
fn relax_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return,
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
    if !meta.is_dir() {
        return;
    }
    let pattern = format!("{}/*", glob::Pattern::escape(&path.to_string_lossy()));
    if let Ok(children) = glob::glob(&pattern) {
        for child in children.flatten() {
            relax_permissions(&child);
        }
    }
}

#[cfg(not(unix))]
fn relax_permissions(_path: &Path) {}
