//! Tester discovers the test classes of a project, runs them through an
//! external test tool in parallel, and keeps their results per test run.
//!
//! Every execution of the test tool is an external process. Its exit code is
//! classified into a status (`0` passes, `1` fails, `2` errors, anything
//! else is fatal) and recorded, together with the captured output, in a
//! SQLite results store under the identifier of the run.
//!
//! ## Configuration
//! A tester installation is defined by a `tester.toml` file:
//! ```toml
//! ver = "0.1.0"
//!
//! [tool]
//! # Test tool. Paths are relative to the directory of tester.toml.
//! command = "vendor/bin/phpunit"
//! # (Optional) Timeout for one invocation in seconds. Defaults to 60.
//! timeout = 600
//! # (Optional) Arguments to list the runnable tests. {output} is the path
//! # the listing is written to.
//! list_args = ["--list-tests-xml", "{output}"]
//! # (Optional) Arguments to run one class. {path} is the file declaring
//! # the class, {class} its name and {log} a JUnit log path.
//! run_args = ["--log-junit", "{log}", "{path}"]
//! # (Optional) Arguments to run several classes with one invocation.
//! # {filter} is a regex matching exactly those classes.
//! filter_args = ["--log-junit", "{log}", "--filter", "{filter}"]
//!
//! [discovery]
//! # Source files that declare test classes.
//! paths = ["core/**/tests/**/*Test.php", "modules/**/tests/**/*Test.php"]
//! # Fixtures that look like tests but carry no @group.
//! excluded = ["core/tests/fixtures/**"]
//!
//! [environment]
//! base_url = "http://localhost"
//! jobs = 8
//! ```
//!
//! ## Discovery
//! The test tool lists the runnable classes; each listed class is then
//! parsed statically to recover its summary and its `@group` annotations.
//! A class without groups is treated as a base class or fixture and
//! skipped, unless its name ends with `Test`: such a class is reported as an
//! error rather than silently dropped from the suite. Discovery runs at most
//! once per [picker::Discoverer] until it is invalidated.
//!
//! ```text
//! $ tester list -g block
//! block
//!   Drupal\Tests\block\Functional\BlockUiTest - Tests block UI CRUD functionality.
//! ```
//!
//! ## Running tests
//! `tester run` executes the selected classes and prints each result as soon
//! as it is recorded:
//! ```text
//! $ tester run -g block -x 'Kernel'
//! Test run 12
//! ✓ Drupal\Tests\block\Functional\BlockUiTest pass
//! ✗ Drupal\Tests\block\Functional\BlockXssTest fatal (timed out after 600s)
//!   1 passing / 1 failing / 0 unknown
//! ```
//! The `--include` and `--exclude` regexes are matched against the strings
//! `<group>:<class>`. The exit status is the number of failing classes.
//!
//! Results stay in the store until they are removed: `tester results 12`
//! shows them again, `tester rerun 12 --failed` runs the failing classes as
//! a new run and `tester clean` removes leftover fixture tables, temporary
//! directories and stored results.
pub mod cleaner;
pub mod cli;
pub mod errors;
pub mod executor;
pub mod picker;
pub mod printer;
pub mod store;
