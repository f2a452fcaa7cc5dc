//! Test discovery: combines the statically parsed class map with the
//! identifiers listed by the test tool, and caches the result until it is
//! invalidated.
use super::{
    listing::ListingInvoker,
    metadata::{self, MetadataParser, TestClassInfo},
    natural,
    toml::{Config, DiscoveryConfig, ListingMode},
};
use crate::errors::{RichResult, TesterError};
use crate::executor::process::resolve_executable;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Result of one discovery cycle. Never mutated once built.
#[derive(Debug)]
pub struct Discovery {
    /// Groups and their identifiers, both in natural order.
    groups: Vec<(String, Vec<String>)>,
    infos: HashMap<String, TestClassInfo>,
}

impl Discovery {
    /// Group the infos, which are keyed by identifier.
    pub fn from_infos(infos: HashMap<String, TestClassInfo>) -> Self {
        let mut by_group: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for info in infos.values() {
            for group in &info.groups {
                by_group
                    .entry(group.as_str())
                    .or_default()
                    .push(info.name.clone());
            }
        }
        let mut groups: Vec<(String, Vec<String>)> = by_group
            .into_iter()
            .map(|(group, mut ids)| {
                ids.sort_by(|a, b| natural::compare(a, b));
                (group.to_string(), ids)
            })
            .collect();
        groups.sort_by(|(a, _), (b, _)| natural::compare(a, b));
        Self { groups, infos }
    }

    /// Every group with its identifiers.
    pub fn groups(&self) -> &[(String, Vec<String>)] {
        &self.groups
    }

    /// Identifiers of one group.
    pub fn group(&self, name: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(group, _)| group == name)
            .map(|(_, ids)| ids.as_slice())
    }

    pub fn info(&self, id: &str) -> Option<&TestClassInfo> {
        self.infos.get(id)
    }

    /// All infos in natural identifier order.
    pub fn infos(&self) -> Vec<&TestClassInfo> {
        let mut infos: Vec<&TestClassInfo> = self.infos.values().collect();
        infos.sort_by(|a, b| natural::compare(&a.name, &b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Where the authoritative identifier list comes from.
enum Source {
    Tool(ListingInvoker),
    Static,
}

/// Discovers test classes and owns the discovery cache.
pub struct Discoverer {
    root: PathBuf,
    config: DiscoveryConfig,
    parser: Arc<MetadataParser>,
    source: Source,
    excluded: Vec<glob::Pattern>,
    cache: Mutex<Option<Arc<Discovery>>>,
    listing_runs: AtomicUsize,
}

impl Discoverer {
    /// Build a discoverer for the suite described by `conf`. In tool mode the
    /// test tool must be executable.
    pub fn new(conf: &Config) -> Result<Self, TesterError> {
        let source = match conf.discovery.mode {
            ListingMode::Tool => {
                let command = resolve_executable(&conf.tool.command, &conf.root)?;
                Source::Tool(ListingInvoker::new(
                    command,
                    conf.tool.list_args.clone(),
                    conf.resolve(&conf.tool.list_output),
                    conf.root.clone(),
                    conf.process_env(),
                    conf.timeout(),
                ))
            }
            ListingMode::Static => Source::Static,
        };
        let excluded = conf
            .discovery
            .excluded
            .iter()
            .map(|pattern| glob::Pattern::new(pattern.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            root: conf.root.clone(),
            config: conf.discovery.clone(),
            parser: Arc::new(MetadataParser::new()?),
            source,
            excluded,
            cache: Mutex::new(None),
            listing_runs: AtomicUsize::new(0),
        })
    }

    /// The cached discovery, computed on first use. Concurrent callers on a
    /// cold cache wait for a single computation and share its result.
    pub async fn discover(&self) -> Result<Arc<Discovery>, TesterError> {
        let mut cache = self.cache.lock().await;
        if let Some(discovery) = cache.as_ref() {
            return Ok(Arc::clone(discovery));
        }
        let discovery = Arc::new(self.populate().await?);
        *cache = Some(Arc::clone(&discovery));
        Ok(discovery)
    }

    /// Infos of every discovered class, or of the class `id`.
    pub async fn class_info(
        &self,
        id: Option<&str>,
    ) -> Result<Vec<TestClassInfo>, TesterError> {
        let discovery = self.discover().await?;
        match id {
            None => Ok(discovery.infos().into_iter().cloned().collect()),
            Some(id) => discovery
                .info(id)
                .cloned()
                .map(|info| vec![info])
                .ok_or_else(|| TesterError(format!("Unknown test class {}.", id))),
        }
    }

    /// Drop the cached discovery. The next call to [Discoverer::discover]
    /// lists the tests again.
    pub async fn invalidate(&self) {
        *self.cache.lock().await = None;
        debug!("discovery cache invalidated");
    }

    /// Number of discovery cycles that ran the listing step.
    pub fn listing_runs(&self) -> usize {
        self.listing_runs.load(Ordering::SeqCst)
    }

    /// Whether `id` names a class that must carry test metadata.
    fn looks_like_test(&self, id: &str, filename: Option<&Path>) -> bool {
        let short = id.rsplit('\\').next().unwrap_or(id);
        if !short.ends_with(&self.config.test_suffix) {
            return false;
        }
        match filename {
            Some(file) => {
                let relative = file.strip_prefix(&self.root).unwrap_or(file);
                !self.excluded.iter().any(|pat| pat.matches_path(relative))
            }
            None => true,
        }
    }

    async fn populate(&self) -> Result<Discovery, TesterError> {
        self.listing_runs.fetch_add(1, Ordering::SeqCst);
        let parser = Arc::clone(&self.parser);
        let (root, paths) = (self.root.clone(), self.config.paths.clone());
        let classes = tokio::task::spawn_blocking(move || {
            metadata::class_map(&parser, &root, &paths)
        })
        .await
        .map_err(TesterError::from)
        .collapse()?;
        let identifiers = match &self.source {
            Source::Tool(invoker) => invoker.list().await?,
            Source::Static => classes.keys().cloned().collect(),
        };

        let mut infos = HashMap::with_capacity(identifiers.len());
        for id in identifiers {
            let decl = match classes.get(&id) {
                Some(decl) => decl,
                None if self.looks_like_test(&id, None) => {
                    return Err(TesterError(format!(
                        "Test class {} is listed but no source file declares it.",
                        id
                    )))
                }
                None => {
                    debug!(class = %id, "skipping listed class without source");
                    continue;
                }
            };
            match self.parser.test_info(decl) {
                Some(info) => {
                    infos.insert(id, info);
                }
                None if self.looks_like_test(&id, Some(&decl.filename)) => {
                    return Err(TesterError(format!(
                        "Missing @group annotation in {} ({}).",
                        id,
                        decl.filename.display()
                    )))
                }
                None => debug!(class = %id, "skipping class without group"),
            }
        }

        let discovery = Discovery::from_infos(infos);
        info!(
            classes = discovery.len(),
            groups = discovery.groups().len(),
            "discovered tests"
        );
        Ok(discovery)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};

    fn php_class(namespace: &str, name: &str, doc: &str) -> String {
        format!(
            "<?php\n\nnamespace {};\n\n/**\n{}\n */\nclass {} {{\n}}\n",
            namespace, doc, name
        )
    }

    /// A suite with three grouped tests, one abstract base, and a tool that
    /// lists them after a short delay.
    fn fixture(extra_config: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("modules/node/tests/src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("Node10Test.php"),
            php_class("Drupal\\Tests\\node", "Node10Test", " * Node ten.\n * @group node"),
        )
        .unwrap();
        fs::write(
            src.join("Node2Test.php"),
            php_class(
                "Drupal\\Tests\\node",
                "Node2Test",
                " * Node two.\n * @group node\n * @group Block",
            ),
        )
        .unwrap();
        fs::write(
            src.join("BlockTest.php"),
            php_class("Drupal\\Tests\\block", "BlockTest", " * Block.\n * @group Block"),
        )
        .unwrap();
        fs::write(
            src.join("NodeTestBase.php"),
            php_class("Drupal\\Tests\\node", "NodeTestBase", " * Base class."),
        )
        .unwrap();
        fs::write(
            dir.path().join("listing.xml"),
            r#"<tests>
 <testCaseClass name="Drupal\Tests\node\Node10Test"/>
 <testCaseClass name="Drupal\Tests\node\Node2Test"/>
 <testCaseClass name="Drupal\Tests\block\BlockTest"/>
 <testCaseClass name="Drupal\Tests\node\NodeTestBase"/>
</tests>
"#,
        )
        .unwrap();
        let tool = dir.path().join("tool.sh");
        fs::write(&tool, "#!/bin/sh\nsleep 0.2\ncp listing.xml \"$2\"\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            dir.path().join("tester.toml"),
            format!(
                "ver = \"{}\"\n[tool]\ncommand = \"./tool.sh\"\n[discovery]\npaths = [\"modules/**/*.php\"]\n{}",
                env!("CARGO_PKG_VERSION"),
                extra_config
            ),
        )
        .unwrap();
        dir
    }

    fn discoverer(dir: &Path) -> Discoverer {
        Discoverer::new(&Config::from_path(dir).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn groups_are_sorted_naturally() {
        let dir = fixture("");
        let discovery = discoverer(dir.path()).discover().await.unwrap();
        let groups: Vec<&str> = discovery.groups().iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(groups, vec!["Block", "node"]);
        assert_eq!(
            discovery.group("node").unwrap(),
            &[
                "Drupal\\Tests\\node\\Node2Test".to_string(),
                "Drupal\\Tests\\node\\Node10Test".to_string(),
            ]
        );
        assert_eq!(discovery.group("Block").unwrap().len(), 2);
        assert_eq!(discovery.len(), 3);
        assert!(discovery.info("Drupal\\Tests\\node\\NodeTestBase").is_none());
    }

    #[tokio::test]
    async fn concurrent_cold_calls_list_once() {
        let dir = fixture("");
        let discoverer = discoverer(dir.path());
        let (first, second) = tokio::join!(discoverer.discover(), discoverer.discover());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(discoverer.listing_runs(), 1);

        discoverer.discover().await.unwrap();
        assert_eq!(discoverer.listing_runs(), 1);

        discoverer.invalidate().await;
        let third = discoverer.discover().await.unwrap();
        assert_eq!(discoverer.listing_runs(), 2);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.groups(), third.groups());
    }

    #[tokio::test]
    async fn class_info_returns_one_or_all() {
        let dir = fixture("");
        let discoverer = discoverer(dir.path());
        let all = discoverer.class_info(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "Drupal\\Tests\\block\\BlockTest");

        let one = discoverer
            .class_info(Some("Drupal\\Tests\\node\\Node2Test"))
            .await
            .unwrap();
        assert_eq!(one[0].description, "Node two.");
        assert_eq!(one[0].groups, vec!["node", "Block"]);
        assert!(discoverer.class_info(Some("Nope")).await.is_err());
    }

    #[tokio::test]
    async fn ungrouped_test_class_fails_discovery() {
        let dir = fixture("");
        fs::write(
            dir.path().join("modules/node/tests/src/Node10Test.php"),
            php_class("Drupal\\Tests\\node", "Node10Test", " * Lost its group."),
        )
        .unwrap();
        let err = discoverer(dir.path()).discover().await.unwrap_err();
        assert!(err.0.contains("Missing @group annotation"));
        assert!(err.0.contains("Node10Test"));
    }

    #[tokio::test]
    async fn excluded_fixture_may_lack_group() {
        let dir = fixture("excluded = [\"modules/node/tests/src/Node10Test.php\"]\n");
        fs::write(
            dir.path().join("modules/node/tests/src/Node10Test.php"),
            php_class("Drupal\\Tests\\node", "Node10Test", " * Fixture."),
        )
        .unwrap();
        let discovery = discoverer(dir.path()).discover().await.unwrap();
        assert_eq!(discovery.len(), 2);
    }

    #[tokio::test]
    async fn listed_test_without_source_fails_discovery() {
        let dir = fixture("");
        let listing = dir.path().join("listing.xml");
        let contents = fs::read_to_string(&listing).unwrap().replace(
            "</tests>",
            " <testCaseClass name=\"Drupal\\Tests\\node\\Helper\"/>\n</tests>",
        );
        fs::write(&listing, &contents).unwrap();
        assert_eq!(discoverer(dir.path()).discover().await.unwrap().len(), 3);

        fs::write(
            &listing,
            contents.replace(
                "</tests>",
                " <testCaseClass name=\"Drupal\\Tests\\node\\GhostTest\"/>\n</tests>",
            ),
        )
        .unwrap();
        let err = discoverer(dir.path()).discover().await.unwrap_err();
        assert!(err.0.contains("GhostTest is listed but no source file declares it"));
    }

    #[tokio::test]
    async fn static_mode_skips_the_tool() {
        let dir = fixture("mode = \"static\"\n");
        fs::remove_file(dir.path().join("tool.sh")).unwrap();
        let discoverer = discoverer(dir.path());
        let discovery = discoverer.discover().await.unwrap();
        assert_eq!(discovery.len(), 3);
        assert_eq!(discoverer.listing_runs(), 1);
    }

    #[test]
    fn missing_tool_is_a_launch_error() {
        let dir = fixture("");
        fs::remove_file(dir.path().join("tool.sh")).unwrap();
        let conf = Config::from_path(dir.path()).unwrap();
        assert!(Discoverer::new(&conf).is_err());
    }
}
