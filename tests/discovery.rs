#![cfg(unix)]
mod common;

use common::{fqcn, installation, Class};
use std::sync::Arc;
use tester::picker::{toml::Config, Discoverer};

fn classes() -> Vec<Class<'static>> {
    vec![
        Class { name: "Views10Test", group: "views", script: "exit 0" },
        Class { name: "Views9Test", group: "views", script: "exit 0" },
        Class { name: "UserTest", group: "User", script: "exit 0" },
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cold_cache_is_populated_once_across_tasks() {
    let dir = tempfile::tempdir().unwrap();
    installation(dir.path(), &classes(), "", "");
    let discoverer = Arc::new(Discoverer::new(&Config::from_path(dir.path()).unwrap()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let discoverer = Arc::clone(&discoverer);
            tokio::spawn(async move { discoverer.discover().await.unwrap() })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(discoverer.listing_runs(), 1);
    assert!(results.iter().all(|found| Arc::ptr_eq(found, &results[0])));

    let groups: Vec<&str> = results[0].groups().iter().map(|(g, _)| g.as_str()).collect();
    assert_eq!(groups, vec!["User", "views"]);
    assert_eq!(
        results[0].group("views").unwrap(),
        &[fqcn("Views9Test"), fqcn("Views10Test")]
    );
}

#[tokio::test]
async fn broken_listing_is_an_error_not_an_empty_suite() {
    let dir = tempfile::tempdir().unwrap();
    installation(dir.path(), &classes(), "", "");
    std::fs::write(dir.path().join("listing.xml"), "PHP Fatal error: out of memory\n").unwrap();
    let discoverer = Discoverer::new(&Config::from_path(dir.path()).unwrap()).unwrap();
    assert!(discoverer.discover().await.is_err());

    // A failed discovery is not cached.
    installation(dir.path(), &classes(), "", "");
    assert_eq!(discoverer.discover().await.unwrap().len(), 3);
    assert_eq!(discoverer.listing_runs(), 2);
}
