//! A throwaway installation with a fake test tool.
//!
//! The tool copies `listing.xml` when asked to list tests. When asked to
//! run a class file `X.php`, it executes the shell snippet in `X.sh`.
#![allow(dead_code)]

use std::{fs, os::unix::fs::PermissionsExt, path::Path};

const TOOL: &str = r#"#!/bin/sh
if [ "$1" = "--list-tests-xml" ]; then
  cp listing.xml "$2"
  exit 0
fi
for last; do :; done
. "${last%.php}.sh"
"#;

/// A test class of the fixture: its name, group and shell behavior.
pub struct Class<'a> {
    pub name: &'a str,
    pub group: &'a str,
    pub script: &'a str,
}

/// `tool` is appended to the `[tool]` section, `extra` to the file.
pub fn installation(dir: &Path, classes: &[Class], tool: &str, extra: &str) {
    let src = dir.join("modules/fake/tests/src");
    fs::create_dir_all(&src).unwrap();
    let mut listing = String::from("<?xml version=\"1.0\"?>\n<tests>\n");
    for class in classes {
        fs::write(
            src.join(format!("{}.php", class.name)),
            format!(
                "<?php\n\nnamespace Drupal\\Tests\\fake;\n\n/**\n * Tests {}.\n *\n * @group {}\n */\nclass {} {{\n}}\n",
                class.name, class.group, class.name
            ),
        )
        .unwrap();
        fs::write(src.join(format!("{}.sh", class.name)), class.script).unwrap();
        listing.push_str(&format!(
            " <testCaseClass name=\"Drupal\\Tests\\fake\\{}\"/>\n",
            class.name
        ));
    }
    listing.push_str("</tests>\n");
    fs::write(dir.join("listing.xml"), listing).unwrap();

    let script = dir.join("tool.sh");
    fs::write(&script, TOOL).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(
        dir.join("tester.toml"),
        format!(
            "ver = \"{}\"\n[tool]\ncommand = \"./tool.sh\"\n{}\n[discovery]\npaths = [\"modules/**/*.php\"]\n{}",
            env!("CARGO_PKG_VERSION"),
            tool,
            extra
        ),
    )
    .unwrap();
}

pub fn fqcn(name: &str) -> String {
    format!("Drupal\\Tests\\fake\\{}", name)
}
