//! Static parsing of test class declarations. Source files are read, never
//! executed.
use crate::errors::TesterError;
use regex::Regex;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Metadata of one test class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestClassInfo {
    /// Fully-qualified identifier.
    pub name: String,
    /// Summary of the class doc comment.
    pub description: String,
    /// Category labels in declaration order, without duplicates. The first
    /// one is the primary group.
    pub groups: Vec<String>,
    pub filename: PathBuf,
}

/// A class declaration found in a source file.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub doc: Option<String>,
    pub filename: PathBuf,
}

/// Parses namespaces, class declarations and their doc comments.
pub struct MetadataParser {
    namespace: Regex,
    class: Regex,
    group: Regex,
}

impl MetadataParser {
    pub fn new() -> Result<Self, TesterError> {
        Ok(Self {
            namespace: Regex::new(r"(?m)^\s*namespace\s+([A-Za-z0-9_\\]+)\s*;")?,
            class: Regex::new(
                r"(?ms)(?:/\*\*((?:[^*]|\*+[^*/])*)\*+/\s*)?(?:#\[[^\]]*\]\s*)*^[ \t]*(?:(?:abstract|final|readonly)\s+)*class\s+([A-Za-z_][A-Za-z0-9_]*)",
            )?,
            group: Regex::new(r"^@group\s+(\S+)")?,
        })
    }

    /// Every class declared in `source`.
    pub fn parse_source(&self, source: &str, filename: &Path) -> Vec<ClassDecl> {
        let namespace = self
            .namespace
            .captures(source)
            .map(|caps| caps[1].to_string());
        self.class
            .captures_iter(source)
            .map(|caps| {
                let short = &caps[2];
                let name = match &namespace {
                    Some(ns) => format!("{}\\{}", ns, short),
                    None => short.to_string(),
                };
                ClassDecl {
                    name,
                    doc: caps.get(1).map(|doc| doc.as_str().to_string()),
                    filename: filename.to_path_buf(),
                }
            })
            .collect()
    }

    /// Recover the test info of a declaration. `None` when the class has no
    /// `@group`, which marks abstract bases, traits and fixtures.
    pub fn test_info(&self, decl: &ClassDecl) -> Option<TestClassInfo> {
        let doc = decl.doc.as_ref()?;
        let lines: Vec<&str> = doc.lines().map(doc_line).collect();

        let mut groups: Vec<String> = Vec::new();
        for line in &lines {
            if let Some(caps) = self.group.captures(line) {
                let group = caps[1].to_string();
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }
        if groups.is_empty() {
            return None;
        }

        let description = lines
            .iter()
            .skip_while(|line| line.is_empty())
            .take_while(|line| !line.is_empty() && !line.starts_with('@'))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");

        Some(TestClassInfo {
            name: decl.name.clone(),
            description,
            groups,
            filename: decl.filename.clone(),
        })
    }
}

/// Strip the comment decoration of one doc comment line.
fn doc_line(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix('*').unwrap_or(line).trim()
}

/// Fully-qualified class name to declaration, built from every file
/// matching the glob `patterns` below `root`.
pub fn class_map(
    parser: &MetadataParser,
    root: &Path,
    patterns: &[String],
) -> Result<HashMap<String, ClassDecl>, TesterError> {
    let mut map = HashMap::new();
    let base = glob::Pattern::escape(&root.to_string_lossy());
    for pattern in patterns {
        let full = format!("{}/{}", base, pattern);
        for path in glob::glob(&full)? {
            let path = path?;
            if !path.is_file() {
                continue;
            }
            let source = fs::read_to_string(&path).map_err(|err| {
                TesterError(format!("{}: {}", path.display(), err))
            })?;
            for decl in parser.parse_source(&source, &path) {
                map.entry(decl.name.clone()).or_insert(decl);
            }
        }
    }
    debug!(classes = map.len(), "built class map");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_TEST: &str = r#"<?php

namespace Drupal\Tests\block\Functional;

use Drupal\Tests\BrowserTestBase;

/**
 * Tests block UI CRUD functionality.
 *
 * Longer explanation that is not part of the summary.
 *
 * @group block
 * @group legacy
 * @group block
 */
class BlockUiTest extends BrowserTestBase {

  /**
   * Not a class comment.
   */
  public function testX() {}

}
"#;

    const BASE_CLASS: &str = r#"<?php

namespace Drupal\Tests\block\Traits;

/**
 * Provides helpers for block tests.
 */
abstract class BlockTestBase {
}
"#;

    #[test]
    fn parses_summary_and_groups() {
        let parser = MetadataParser::new().unwrap();
        let decls = parser.parse_source(BLOCK_TEST, Path::new("core/BlockUiTest.php"));
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "Drupal\\Tests\\block\\Functional\\BlockUiTest");

        let info = parser.test_info(&decls[0]).unwrap();
        assert_eq!(info.description, "Tests block UI CRUD functionality.");
        assert_eq!(info.groups, vec!["block", "legacy"]);
        assert_eq!(info.filename, PathBuf::from("core/BlockUiTest.php"));
    }

    #[test]
    fn class_without_group_has_no_info() {
        let parser = MetadataParser::new().unwrap();
        let decls = parser.parse_source(BASE_CLASS, Path::new("BlockTestBase.php"));
        assert_eq!(decls[0].name, "Drupal\\Tests\\block\\Traits\\BlockTestBase");
        assert!(parser.test_info(&decls[0]).is_none());

        let bare = parser.parse_source("<?php\nclass Loose {}\n", Path::new("x.php"));
        assert_eq!(bare[0].name, "Loose");
        assert!(bare[0].doc.is_none());
        assert!(parser.test_info(&bare[0]).is_none());
    }

    #[test]
    fn docblock_closed_with_extra_stars() {
        let parser = MetadataParser::new().unwrap();
        let source = "<?php\n/** @file */\nnamespace Drupal\\Tests\\x;\n/**\n * Tests **bold** text.\n *\n * @group x\n **/\nclass StarTest {}\n";
        let decls = parser.parse_source(source, Path::new("StarTest.php"));
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "Drupal\\Tests\\x\\StarTest");
        let info = parser.test_info(&decls[0]).unwrap();
        assert_eq!(info.description, "Tests **bold** text.");
        assert_eq!(info.groups, vec!["x"]);
    }

    #[test]
    fn multi_line_summary_is_joined() {
        let parser = MetadataParser::new().unwrap();
        let source = "<?php\n/**\n * Tests the thing\n * across lines.\n * @group thing\n */\nfinal class ThingTest {}\n";
        let decls = parser.parse_source(source, Path::new("ThingTest.php"));
        let info = parser.test_info(&decls[0]).unwrap();
        assert_eq!(info.description, "Tests the thing across lines.");
        assert_eq!(info.groups, vec!["thing"]);
    }

    #[test]
    fn class_map_walks_globbed_files() {
        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("modules/block/tests/src");
        fs::create_dir_all(&tests).unwrap();
        fs::write(tests.join("BlockUiTest.php"), BLOCK_TEST).unwrap();
        fs::write(tests.join("BlockTestBase.php"), BASE_CLASS).unwrap();
        fs::write(tests.join("README.txt"), "class NotPhp {}").unwrap();

        let parser = MetadataParser::new().unwrap();
        let map = class_map(&parser, dir.path(), &["**/tests/**/*.php".to_string()]).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("Drupal\\Tests\\block\\Functional\\BlockUiTest"));
        assert!(map.contains_key("Drupal\\Tests\\block\\Traits\\BlockTestBase"));
    }
}
