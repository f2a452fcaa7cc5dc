//! Human readable reports for the command line.
use crate::cleaner::{CleanupSummary, Step};
use crate::executor::{
    process::Termination,
    results::{self, LogEntry, Outcome, Status, Tally},
    Execution,
};
use crate::picker::{metadata::TestClassInfo, Discovery};
use colored::*;
use std::collections::BTreeMap;

/// Groups and their classes, optionally restricted to one group.
pub fn groups_str(discovery: &Discovery, only: Option<&str>) -> String {
    let mut buf = String::new();
    for (group, ids) in discovery.groups() {
        if only.map_or(false, |only| only != group) {
            continue;
        }
        buf.push_str(&group.bold().to_string());
        buf.push('\n');
        for id in ids {
            buf.push_str("  ");
            buf.push_str(id);
            if let Some(info) = discovery.info(id) {
                if !info.description.is_empty() {
                    buf.push_str(&format!(" - {}", info.description).dimmed().to_string());
                }
            }
            buf.push('\n');
        }
    }
    buf
}

pub fn info_str(info: &TestClassInfo) -> String {
    format!(
        "{}\n  {}\n  groups: {}\n  file: {}",
        info.name.bold(),
        info.description,
        info.groups.join(", "),
        info.filename.display()
    )
}

fn status_str(status: Status) -> ColoredString {
    match status {
        Status::Pass => "✓".green(),
        Status::Fail | Status::Error | Status::Fatal => "✗".red(),
        Status::Warn | Status::Debug => "?".yellow(),
    }
}

/// One line per class of an execution.
pub fn execution_str(execution: &Execution) -> String {
    let note = match &execution.output.termination {
        Termination::Exited(_) => String::new(),
        other => format!(" ({})", other),
    };
    execution
        .entries
        .iter()
        .map(|entry| {
            format!(
                "{} {} {}{}",
                status_str(entry.status),
                entry.test_class,
                entry.status.to_string().dimmed(),
                note.dimmed()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per class results followed by the totals line.
pub fn summary_str(summary: &BTreeMap<String, Tally>) -> String {
    let mut buf = String::new();
    let (mut passing, mut failing, mut unknown) = (0, 0, 0);
    for (class, tally) in summary {
        match tally.outcome() {
            Outcome::Ok => passing += 1,
            Outcome::Unknown => unknown += 1,
            _ => failing += 1,
        }
        buf.push_str(&results::report_str(class, tally));
        buf.push('\n');
    }
    buf.push_str(&format!(
        "  {} / {} / {}",
        format!("{} passing", passing).green(),
        format!("{} failing", failing).red(),
        format!("{} unknown", unknown).yellow()
    ));
    buf
}

/// Entries of a run grouped by class, with the output of non-passing ones.
pub fn entries_str(entries: &[LogEntry]) -> String {
    let mut buf = String::new();
    let mut current: Option<&str> = None;
    for entry in entries {
        if current != Some(entry.test_class.as_str()) {
            buf.push_str(&entry.test_class.bold().to_string());
            buf.push('\n');
            current = Some(&entry.test_class);
        }
        buf.push_str(&format!(
            "  {} #{} {} (exit code {})\n",
            status_str(entry.status),
            entry.message_id,
            entry.message_group,
            entry.exit_code
        ));
        if entry.status != Status::Pass {
            for stream in &[&entry.process_output, &entry.process_error] {
                for line in stream.lines() {
                    buf.push_str(&format!("    {}\n", line).dimmed().to_string());
                }
            }
        }
    }
    buf
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        one.to_string()
    } else {
        many.replace("@count", &count.to_string())
    }
}

fn step_str(step: &Step, one: &str, many: &str, none: &str, what: &str) -> Option<String> {
    match step {
        Step::Skipped => None,
        Step::Removed(0) => Some(none.to_string()),
        Step::Removed(count) => Some(plural(*count, one, many)),
        Step::Failed(msg) => Some(format!("Could not clean {}: {}", what, msg).red().to_string()),
    }
}

/// Messages describing a cleanup. Disabled steps are not mentioned, except
/// for results, which are reported as kept.
pub fn cleanup_str(summary: &CleanupSummary) -> String {
    let mut lines = Vec::new();
    lines.extend(step_str(
        &summary.tables,
        "Removed 1 leftover table.",
        "Removed @count leftover tables.",
        "No leftover tables to remove.",
        "leftover tables",
    ));
    lines.extend(step_str(
        &summary.directories,
        "Removed 1 temporary directory.",
        "Removed @count temporary directories.",
        "No temporary directories to remove.",
        "temporary directories",
    ));
    lines.push(match &summary.results {
        Step::Skipped => "Clear results is disabled and the test results table will not be cleared."
            .yellow()
            .to_string(),
        step => step_str(
            step,
            "Removed 1 test result.",
            "Removed @count test results.",
            "No test results to remove.",
            "test results",
        )
        .unwrap_or_default(),
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_messages_follow_counts() {
        colored::control::set_override(false);
        let text = cleanup_str(&CleanupSummary {
            tables: Step::Removed(1),
            directories: Step::Removed(0),
            results: Step::Removed(3),
        });
        assert_eq!(
            text,
            "Removed 1 leftover table.\nNo temporary directories to remove.\nRemoved 3 test results."
        );
        let kept = cleanup_str(&CleanupSummary::default());
        assert_eq!(
            kept,
            "Clear results is disabled and the test results table will not be cleared."
        );
        let broken = cleanup_str(&CleanupSummary {
            tables: Step::Failed("storage: file is not a database".to_string()),
            directories: Step::Skipped,
            results: Step::Removed(0),
        });
        assert_eq!(
            broken,
            "Could not clean leftover tables: storage: file is not a database\nNo test results to remove."
        );
    }
}
