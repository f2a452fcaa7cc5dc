use super::test::Target;
use crate::errors::TesterError;
use crate::picker::{natural, Discovery};
use regex::Regex;
use std::collections::BTreeSet;

/// Selects the classes of a batch from a discovery.
///
/// With neither groups nor classes named, every discovered class is a
/// candidate. Filters are matched against the strings `<group>:<class>`, one
/// per group the class belongs to.
#[derive(Default)]
pub struct Selection<'a> {
    groups: Vec<String>,
    classes: Vec<String>,
    exclude: Option<&'a Regex>,
    include: Option<&'a Regex>,
}

impl<'a> Selection<'a> {
    /// Select every class of the named groups.
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    /// Select the named classes.
    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    /// Remove classes for which any `group:class` string matches the filter.
    pub fn with_exclude_filter(mut self, exclude: Option<&'a Regex>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Keep classes for which some `group:class` string matches the filter.
    pub fn with_include_filter(mut self, include: Option<&'a Regex>) -> Self {
        self.include = include;
        self
    }

    fn accepts(&self, keys: &[String]) -> bool {
        let excluded = self
            .exclude
            .map(|ex| keys.iter().any(|key| ex.is_match(key)))
            .unwrap_or(false);
        let included = self
            .include
            .map(|inc| keys.iter().any(|key| inc.is_match(key)))
            .unwrap_or(true);
        !excluded && included
    }

    /// Resolve the selection into targets, in natural class order. Naming
    /// an unknown group or class is an error.
    pub fn into_targets(self, discovery: &Discovery) -> Result<Vec<Target>, TesterError> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for group in &self.groups {
            let ids = discovery
                .group(group)
                .ok_or_else(|| TesterError(format!("Unknown test group {}.", group)))?;
            names.extend(ids.iter().map(String::as_str));
        }
        for class in &self.classes {
            if discovery.info(class).is_none() {
                return Err(TesterError(format!("Unknown test class {}.", class)));
            }
            names.insert(class.as_str());
        }
        if self.groups.is_empty() && self.classes.is_empty() {
            names.extend(
                discovery
                    .groups()
                    .iter()
                    .flat_map(|(_, ids)| ids.iter().map(String::as_str)),
            );
        }

        let mut targets: Vec<Target> = names
            .into_iter()
            .filter_map(|name| discovery.info(name))
            .filter(|info| {
                let keys: Vec<String> = info
                    .groups
                    .iter()
                    .map(|group| format!("{}:{}", group, info.name))
                    .collect();
                self.accepts(&keys)
            })
            .map(Target::from)
            .collect();
        targets.sort_by(|a, b| natural::compare(&a.class, &b.class));
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picker::metadata::TestClassInfo;
    use std::{collections::HashMap, path::PathBuf};

    fn discovery() -> Discovery {
        let infos: HashMap<String, TestClassInfo> = vec![
            ("NodeTest10", vec!["node"]),
            ("NodeTest2", vec!["node", "block"]),
            ("BlockTest", vec!["block"]),
            ("UserTest", vec!["user"]),
        ]
        .into_iter()
        .map(|(name, groups)| {
            (
                name.to_string(),
                TestClassInfo {
                    name: name.to_string(),
                    description: String::new(),
                    groups: groups.into_iter().map(String::from).collect(),
                    filename: PathBuf::from(format!("{}.php", name)),
                },
            )
        })
        .collect();
        Discovery::from_infos(infos)
    }

    fn classes(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.class.as_str()).collect()
    }

    #[test]
    fn everything_is_selected_by_default() {
        let targets = Selection::default().into_targets(&discovery()).unwrap();
        assert_eq!(
            classes(&targets),
            vec!["BlockTest", "NodeTest2", "NodeTest10", "UserTest"]
        );
        assert_eq!(targets[1].path, PathBuf::from("NodeTest2.php"));
    }

    #[test]
    fn groups_and_classes_are_combined() {
        let targets = Selection::default()
            .with_groups(vec!["block".to_string()])
            .with_classes(vec!["UserTest".to_string()])
            .into_targets(&discovery())
            .unwrap();
        assert_eq!(classes(&targets), vec!["BlockTest", "NodeTest2", "UserTest"]);
    }

    #[test]
    fn filters_match_group_and_class() {
        let include = Regex::new("^node:").unwrap();
        let exclude = Regex::new("block:").unwrap();
        let targets = Selection::default()
            .with_include_filter(Some(&include))
            .with_exclude_filter(Some(&exclude))
            .into_targets(&discovery())
            .unwrap();
        assert_eq!(classes(&targets), vec!["NodeTest10"]);

        let only_include = Selection::default()
            .with_include_filter(Some(&include))
            .into_targets(&discovery())
            .unwrap();
        assert_eq!(classes(&only_include), vec!["NodeTest2", "NodeTest10"]);
    }

    #[test]
    fn unknown_names_are_errors() {
        assert!(Selection::default()
            .with_groups(vec!["nope".to_string()])
            .into_targets(&discovery())
            .is_err());
        assert!(Selection::default()
            .with_classes(vec!["NopeTest".to_string()])
            .into_targets(&discovery())
            .is_err());
    }
}
