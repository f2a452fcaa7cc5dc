use crate::errors::TesterError;
use crate::executor::process::ProcessOutput;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Message group recorded for every entry produced by the process runner.
pub const MESSAGE_GROUP: &str = "TestRunner";

/// Canonical status of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pass,
    Fail,
    Error,
    Fatal,
    Warn,
    Debug,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::Error => "error",
            Status::Fatal => "fatal",
            Status::Warn => "warn",
            Status::Debug => "debug",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = TesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Status::Pass),
            "fail" => Ok(Status::Fail),
            "error" => Ok(Status::Error),
            "fatal" => Ok(Status::Fatal),
            "warn" => Ok(Status::Warn),
            "debug" => Ok(Status::Debug),
            _ => Err(TesterError(format!("Unknown result status: {}", s))),
        }
    }
}

/// Map an exit code of the test tool to a status. The mapping is fixed:
/// 0 passes, 1 fails, 2 errors and anything else is fatal.
pub fn classify(exit_code: i32) -> Status {
    match exit_code {
        0 => Status::Pass,
        1 => Status::Fail,
        2 => Status::Error,
        _ => Status::Fatal,
    }
}

/// A log entry that has not been written to storage yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub test_class: String,
    pub status: Status,
    pub message_group: String,
    pub exit_code: i32,
    pub process_output: String,
    pub process_error: String,
}

/// A log entry read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Store-wide ordering key.
    pub message_id: i64,
    /// Run that owns this entry.
    pub test_id: i64,
    pub test_class: String,
    pub status: Status,
    pub message_group: String,
    pub exit_code: i32,
    pub process_output: String,
    pub process_error: String,
}

/// Build the entry recording one execution of `test_class`.
pub fn build_entry(test_class: &str, output: &ProcessOutput) -> NewEntry {
    NewEntry {
        test_class: test_class.to_string(),
        status: classify(output.exit_code),
        message_group: MESSAGE_GROUP.to_string(),
        exit_code: output.exit_code,
        process_output: output.stdout.clone(),
        process_error: output.stderr.clone(),
    }
}

/// Overall result of a test class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failures,
    Errors,
    /// Exit code of the first fatal entry.
    Fatal(i32),
    /// Only informational entries were logged.
    Unknown,
}

impl Outcome {
    /// Whether this outcome should be reported as failing.
    pub fn is_failing(self) -> bool {
        !matches!(self, Outcome::Ok | Outcome::Unknown)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Ok => f.write_str("OK"),
            Outcome::Failures => f.write_str("Failures!"),
            Outcome::Errors => f.write_str("Errors!"),
            Outcome::Fatal(code) => {
                write!(f, "FATAL test process error (exit code: {})", code)
            }
            Outcome::Unknown => f.write_str("Unknown result status"),
        }
    }
}

/// Status counts of one test class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub fatal: usize,
    pub warn: usize,
    pub debug: usize,
    fatal_exit_code: Option<i32>,
}

impl Tally {
    fn record(&mut self, status: Status, exit_code: i32) {
        match status {
            Status::Pass => self.pass += 1,
            Status::Fail => self.fail += 1,
            Status::Error => self.error += 1,
            Status::Fatal => {
                self.fatal += 1;
                self.fatal_exit_code.get_or_insert(exit_code);
            }
            Status::Warn => self.warn += 1,
            Status::Debug => self.debug += 1,
        }
    }

    /// Overall result, with fatal taking priority over error, error over
    /// fail, and fail over pass.
    pub fn outcome(&self) -> Outcome {
        if self.fatal > 0 {
            Outcome::Fatal(self.fatal_exit_code.unwrap_or_default())
        } else if self.error > 0 {
            Outcome::Errors
        } else if self.fail > 0 {
            Outcome::Failures
        } else if self.pass > 0 {
            Outcome::Ok
        } else {
            Outcome::Unknown
        }
    }
}

/// Tally entries per test class, keyed in lexical class order.
pub fn summarize<'a, I>(entries: I) -> BTreeMap<String, Tally>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut summaries: BTreeMap<String, Tally> = BTreeMap::new();
    for entry in entries {
        summaries
            .entry(entry.test_class.clone())
            .or_default()
            .record(entry.status, entry.exit_code);
    }
    summaries
}

/// Highest exit status the process can report.
pub const MAX_EXIT_STATUS: i32 = 255;

/// Exit status for a summary: the number of failing classes, capped so
/// that it never wraps around to success.
pub fn exit_status(summary: &BTreeMap<String, Tally>) -> i32 {
    let failing = summary
        .values()
        .filter(|tally| tally.outcome().is_failing())
        .count();
    failing.min(MAX_EXIT_STATUS as usize) as i32
}

/// Generate colorized string to report the result of one test class.
pub fn report_str(class: &str, tally: &Tally) -> String {
    use colored::*;

    let outcome = tally.outcome();
    let counts = format!(
        " ({} passed, {} failed, {} errors, {} fatal)",
        tally.pass, tally.fail, tally.error, tally.fatal
    );
    let mut buf = String::new();
    match outcome {
        Outcome::Ok => {
            buf.push_str(&"✓ ".green().to_string());
            buf.push_str(&class.green().to_string());
        }
        Outcome::Unknown => {
            buf.push_str(&"? ".yellow().to_string());
            buf.push_str(&class.yellow().to_string());
        }
        Outcome::Failures | Outcome::Errors | Outcome::Fatal(_) => {
            buf.push_str(&"✗ ".red().to_string());
            buf.push_str(&class.red().to_string());
            buf.push_str(&format!(" {}", outcome).red().to_string());
        }
    }
    buf.push_str(&counts.dimmed().to_string());
    buf
}
