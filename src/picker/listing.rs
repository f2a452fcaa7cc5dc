//! Asks the external test tool for its list of runnable test classes.
use crate::errors::TesterError;
use crate::executor::process::{Invocation, Termination};
use regex::Regex;
use std::{
    collections::HashMap,
    path::PathBuf,
    time::Duration,
};
use tracing::{debug, info};

/// Runs the test tool in "list tests" mode and parses the listing.
pub struct ListingInvoker {
    command: PathBuf,
    args: Vec<String>,
    output: PathBuf,
    work_dir: PathBuf,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl ListingInvoker {
    /// `args` may contain `{output}`, replaced with the listing path. When it
    /// doesn't, the listing is read from the tool's STDOUT.
    pub fn new(
        command: PathBuf,
        args: Vec<String>,
        output: PathBuf,
        work_dir: PathBuf,
        env: HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            command,
            args,
            output,
            work_dir,
            env,
            timeout,
        }
    }

    fn writes_file(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{output}"))
    }

    /// Invoke the tool and return the listed class identifiers in listing
    /// order.
    pub async fn list(&self) -> Result<Vec<String>, TesterError> {
        let output_path = self.output.display().to_string();
        if self.writes_file() {
            if let Some(parent) = self.output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            // A stale listing must not be mistaken for a fresh one.
            let _ = tokio::fs::remove_file(&self.output).await;
        }

        let out = Invocation::new(self.command.clone(), self.work_dir.clone())
            .args(self.args.iter().map(|arg| arg.replace("{output}", &output_path)))
            .env(self.env.clone())
            .timeout(self.timeout)
            .run()
            .await;
        match out.termination {
            Termination::Exited(0) => (),
            _ => {
                return Err(TesterError(format!(
                    "Error discovering tests ({}): {}",
                    out.termination,
                    out.stderr.trim()
                )))
            }
        }

        let contents = if self.writes_file() {
            tokio::fs::read_to_string(&self.output).await.map_err(|err| {
                TesterError(format!(
                    "Could not load the test listing {}: {}",
                    output_path, err
                ))
            })?
        } else {
            out.stdout
        };
        let classes = parse_listing(&contents)?;
        info!(classes = classes.len(), "test tool listed classes");
        Ok(classes)
    }
}

/// Decode the predefined XML entities and numeric character references.
fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(std::char::from_u32),
                _ if entity.starts_with('#') => {
                    entity[1..].parse().ok().and_then(std::char::from_u32)
                }
                _ => None,
            };
            ch.map(|ch| (ch, semi))
        });
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Extract the class identifiers of a `<tests>` listing. A listing without
/// the root element or without any class is an error: an empty suite would
/// be indistinguishable from broken discovery.
pub fn parse_listing(contents: &str) -> Result<Vec<String>, TesterError> {
    let root = Regex::new(r"<tests[\s>/]")?;
    if !root.is_match(contents) {
        return Err(TesterError(
            "Test listing is malformed: missing <tests> root element.".to_string(),
        ));
    }
    let class = Regex::new(r#"<testCaseClass\s+(?:[^>]*?\s)?name\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;
    let mut classes: Vec<String> = Vec::new();
    for caps in class.captures_iter(contents) {
        let raw = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let name = decode_entities(raw);
        if name.is_empty() {
            return Err(TesterError(
                "Test listing is malformed: testCaseClass without a name.".to_string(),
            ));
        }
        if !classes.contains(&name) {
            classes.push(name);
        }
    }
    if classes.is_empty() {
        return Err(TesterError(
            "Test listing contains no test classes.".to_string(),
        ));
    }
    debug!(classes = classes.len(), "parsed test listing");
    Ok(classes)
}
