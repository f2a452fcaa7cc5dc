use tester::{
    executor::results::{summarize, Outcome, Status, MESSAGE_GROUP, NewEntry},
    store::{ResultsStore, TestRun},
};
use std::sync::Arc;

fn entry(class: &str, status: Status) -> NewEntry {
    NewEntry {
        test_class: class.to_string(),
        status,
        message_group: MESSAGE_GROUP.to_string(),
        exit_code: match status {
            Status::Pass => 0,
            _ => 1,
        },
        process_output: String::new(),
        process_error: String::new(),
    }
}

#[test]
fn stored_run_summarizes_per_class() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ResultsStore::open(&dir.path().join("results.sqlite")).unwrap());
    store.build_testing_results_environment(false).unwrap();
    assert!(store.validate_testing_results_environment().unwrap());

    let run = TestRun::create_new(Arc::clone(&store)).unwrap();
    for status in &[Status::Pass, Status::Pass, Status::Fail] {
        run.insert_log_entry(&entry("Foo", *status)).unwrap();
    }
    for status in &[Status::Pass, Status::Pass] {
        run.insert_log_entry(&entry("Bar", *status)).unwrap();
    }

    let entries = run.log_entries_by_test_class().unwrap();
    let classes: Vec<&str> = entries.iter().map(|e| e.test_class.as_str()).collect();
    assert_eq!(classes, vec!["Bar", "Bar", "Foo", "Foo", "Foo"]);

    let summary = summarize(&entries);
    let foo = &summary["Foo"];
    assert_eq!((foo.pass, foo.fail, foo.error, foo.fatal), (2, 1, 0, 0));
    assert_eq!(foo.outcome().to_string(), "Failures!");
    let bar = &summary["Bar"];
    assert_eq!((bar.pass, bar.fail), (2, 0));
    assert_eq!(bar.outcome(), Outcome::Ok);
    assert_eq!(bar.outcome().to_string(), "OK");
}

#[test]
fn results_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.sqlite");
    let id = {
        let store = Arc::new(ResultsStore::open(&path).unwrap());
        store.build_testing_results_environment(false).unwrap();
        let run = TestRun::create_new(Arc::clone(&store)).unwrap();
        run.set_database_prefix("test12345678").unwrap();
        run.insert_log_entry(&entry("Foo", Status::Fail)).unwrap();
        run.id()
    };

    let store = Arc::new(ResultsStore::open(&path).unwrap());
    store.build_testing_results_environment(true).unwrap();
    let run = TestRun::get(Arc::clone(&store), id).unwrap();
    let state = run.load_state().unwrap().unwrap();
    assert_eq!(state.database_prefix, "test12345678");
    assert_eq!(state.test_class, "Foo");
    assert!(TestRun::create_new(Arc::clone(&store)).unwrap().id() > id);

    store.build_testing_results_environment(false).unwrap();
    assert!(TestRun::get(Arc::clone(&store), id).is_err());
    assert!(store.set_database_prefix(id, "test1").is_err());
}
