//! The default picker for tester suites that reads the suite configuration
//! from a tester.toml file.
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::errors::{self, TesterError};

/// Name of the configuration file expected in the test directory.
pub const CONFIG_FILE: &str = "tester.toml";

/// Configuration for a single tester installation.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Version of the tester tool this configuration is compatible with.
    pub ver: String,
    /// How the external test tool is invoked.
    pub tool: ToolConfig,
    /// Where test classes are found.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Storage and process environment.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Directory containing the tester.toml. Every relative path in the
    /// configuration is resolved against it.
    #[serde(skip)]
    pub root: PathBuf,
}

/// Invocation of the external test tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Executable of the test tool.
    pub command: String,
    /// Optional timeout for one invocation, in seconds. Defaults to 60.
    pub timeout: Option<u64>,
    /// Arguments for "list tests" mode. `{output}` is replaced with the
    /// listing path.
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,
    /// Where the tool writes its listing.
    #[serde(default = "default_list_output")]
    pub list_output: PathBuf,
    /// Arguments for "run" mode. `{path}`, `{class}`, `{filter}` and `{log}`
    /// are replaced for each invocation.
    #[serde(default = "default_run_args")]
    pub run_args: Vec<String>,
    /// Arguments for "run" mode when one invocation covers several classes.
    #[serde(default = "default_filter_args")]
    pub filter_args: Vec<String>,
}

/// Which collaborator provides the authoritative identifier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// Ask the external tool to list its runnable tests.
    Tool,
    /// Trust the statically parsed class map.
    Static,
}

impl Default for ListingMode {
    fn default() -> Self {
        ListingMode::Tool
    }
}

/// Configuration of test discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub mode: ListingMode,
    /// Glob patterns of candidate test source files.
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,
    /// Suffix identifying a class that must be a test.
    #[serde(default = "default_test_suffix")]
    pub test_suffix: String,
    /// Glob patterns of fixture files allowed to lack a group.
    #[serde(default)]
    pub excluded: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: ListingMode::default(),
            paths: default_paths(),
            test_suffix: default_test_suffix(),
            excluded: Vec::new(),
        }
    }
}

/// Storage locations and the environment handed to test processes.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// SQLite file holding run results.
    #[serde(default = "default_results_db")]
    pub results_db: PathBuf,
    /// SQLite file holding fixture tables created by the tests.
    #[serde(default = "default_fixture_db")]
    pub fixture_db: PathBuf,
    /// Directory where tests leave temporary directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// Base URL of the site under test.
    pub base_url: Option<String>,
    /// Directory for auxiliary artifacts such as screenshots.
    pub output_dir: Option<PathBuf>,
    /// Keep existing results when the results storage is rebuilt.
    #[serde(default = "default_keep_results")]
    pub keep_results: bool,
    /// Number of test processes run in parallel.
    pub jobs: Option<usize>,
    /// Number of identifiers handed to one process.
    pub chunk_size: Option<usize>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            results_db: default_results_db(),
            fixture_db: default_fixture_db(),
            temp_root: default_temp_root(),
            base_url: None,
            output_dir: None,
            keep_results: default_keep_results(),
            jobs: None,
            chunk_size: None,
        }
    }
}

fn default_list_args() -> Vec<String> {
    vec!["--list-tests-xml".to_string(), "{output}".to_string()]
}

fn default_list_output() -> PathBuf {
    PathBuf::from("sites/tester/list-tests.xml")
}

fn default_run_args() -> Vec<String> {
    vec!["--log-junit".to_string(), "{log}".to_string(), "{path}".to_string()]
}

fn default_filter_args() -> Vec<String> {
    vec![
        "--log-junit".to_string(),
        "{log}".to_string(),
        "--filter".to_string(),
        "{filter}".to_string(),
    ]
}

fn default_paths() -> Vec<String> {
    vec!["**/tests/**/*Test.php".to_string()]
}

fn default_test_suffix() -> String {
    "Test".to_string()
}

fn default_results_db() -> PathBuf {
    PathBuf::from("sites/tester/results.sqlite")
}

fn default_fixture_db() -> PathBuf {
    PathBuf::from("sites/tester/fixtures.sqlite")
}

fn default_temp_root() -> PathBuf {
    PathBuf::from("sites/tester/tmp")
}

fn default_keep_results() -> bool {
    true
}

impl Config {
    /// Create a configuration by reading a `tester.toml` file.
    /// Ensures that the version number specified in the `tester.toml` matches
    /// the version of the installed `tester` binary.
    pub fn from_path(conf_dir: &Path) -> Result<Self, TesterError> {
        // Error if tester.toml doesn't exist.
        let conf_path = conf_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&conf_path).map_err(|_| {
            errors::TesterError(format!(
                "{} is missing. Tester expects a directory with a {} file.",
                conf_path.display(),
                CONFIG_FILE
            ))
        })?;

        let mut conf = Self::parse(&contents).map_err(|err| {
            errors::TesterError(format!(
                "Failed to parse {}: {}",
                conf_path.display(),
                err
            ))
        })?;
        conf.root = conf_dir.to_path_buf();
        Ok(conf)
    }

    /// Parse a configuration without a root directory.
    pub fn parse(contents: &str) -> Result<Self, TesterError> {
        let conf: Config = toml::from_str(contents)?;

        // Check if the current `tester` matches the version specified in
        // the configuration.
        if env!("CARGO_PKG_VERSION") != conf.ver {
            return Err(errors::TesterError(format!(
                "Tester version mismatch. Configuration requires: {}, tool version: {}.",
                conf.ver,
                env!("CARGO_PKG_VERSION")
            )));
        }
        if conf.tool.timeout == Some(0) {
            return Err(errors::TesterError(
                "tool.timeout must be at least 1 second.".to_string(),
            ));
        }
        Ok(conf)
    }

    /// Resolve a configured path against the root directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Timeout for one invocation of the test tool.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.tool.timeout.unwrap_or(60))
    }

    /// Size of the worker pool.
    pub fn jobs(&self) -> usize {
        self.environment.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Number of identifiers per external invocation.
    pub fn chunk_size(&self) -> usize {
        self.environment.chunk_size.unwrap_or(1).max(1)
    }

    /// Connection descriptor of the fixture database, as handed to tests.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://localhost/{}",
            self.resolve(&self.environment.fixture_db).display()
        )
    }

    /// Environment variables for every spawned test process.
    pub fn process_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("SIMPLETEST_DB".to_string(), self.database_url());
        if let Some(base_url) = &self.environment.base_url {
            env.insert("SIMPLETEST_BASE_URL".to_string(), base_url.clone());
            let output_dir = self
                .environment
                .output_dir
                .clone()
                .unwrap_or_else(|| self.environment.temp_root.clone());
            env.insert(
                "BROWSERTEST_OUTPUT_DIRECTORY".to_string(),
                self.resolve(&output_dir).display().to_string(),
            );
        }
        env
    }
}
