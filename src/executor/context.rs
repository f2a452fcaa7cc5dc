use super::{
    process::resolve_executable,
    results::{self, Status, Tally},
    test::{Execution, Target, Test},
};
use crate::errors::{RichResult, TesterError};
use crate::picker::{toml::Config, Discovery};
use crate::store::{ResultsStore, RunId, TestRun};
use futures::{stream, StreamExt};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, info};

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Created,
    Running,
    Completed,
}

/// Progress of a batch, published while it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub state: BatchState,
    /// Classes in the batch.
    pub total: usize,
    /// Classes with a recorded result.
    pub done: usize,
    /// Classes recorded with a failing status.
    pub failing: usize,
}

/// Drives batches of test classes through the test tool and into the
/// results store.
pub struct Orchestrator {
    store: Arc<ResultsStore>,
    command: String,
    root: PathBuf,
    run_args: Vec<String>,
    filter_args: Vec<String>,
    temp_root: PathBuf,
    env: HashMap<String, String>,
    timeout: Duration,
    jobs: usize,
    chunk_size: usize,
}

impl Orchestrator {
    pub fn new(conf: &Config, store: Arc<ResultsStore>) -> Self {
        Self {
            store,
            command: conf.tool.command.clone(),
            root: conf.root.clone(),
            run_args: conf.tool.run_args.clone(),
            filter_args: conf.tool.filter_args.clone(),
            temp_root: conf.resolve(&conf.environment.temp_root),
            env: conf.process_env(),
            timeout: conf.timeout(),
            jobs: conf.jobs(),
            chunk_size: conf.chunk_size(),
        }
    }

    /// Override the number of test processes run in parallel.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Start a new run over `targets`. A missing test tool aborts before
    /// the run is allocated.
    pub fn start(&self, targets: Vec<Target>) -> Result<Batch, TesterError> {
        let command = resolve_executable(&self.command, &self.root)?;
        let run = TestRun::create_new(Arc::clone(&self.store))?;
        info!(run = run.id(), classes = targets.len(), "starting test run");
        self.batch(command, run, targets)
    }

    /// Continue the run `id`, executing only the targets it has not logged
    /// yet.
    pub fn resume(&self, id: RunId, targets: Vec<Target>) -> Result<Batch, TesterError> {
        let command = resolve_executable(&self.command, &self.root)?;
        let run = TestRun::get(Arc::clone(&self.store), id)?;
        let logged: HashSet<String> = run.logged_classes()?.into_iter().collect();
        let pending: Vec<Target> = targets
            .into_iter()
            .filter(|target| !logged.contains(&target.class))
            .collect();
        info!(run = id, pending = pending.len(), "resuming test run");
        self.batch(command, run, pending)
    }

    /// Start a new run over the classes of the run `id`, or only over its
    /// failing classes.
    pub fn rerun(
        &self,
        id: RunId,
        only_failed: bool,
        discovery: &Discovery,
    ) -> Result<Batch, TesterError> {
        let previous = TestRun::get(Arc::clone(&self.store), id)?;
        let summary = results::summarize(&previous.log_entries_by_test_class()?);
        let targets = summary
            .iter()
            .filter(|(_, tally)| !only_failed || tally.outcome().is_failing())
            .map(|(class, _)| {
                discovery.info(class).map(Target::from).ok_or_else(|| {
                    TesterError(format!(
                        "Test class {} of run {} is no longer discovered.",
                        class, id
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.start(targets)
    }

    fn batch(
        &self,
        command: PathBuf,
        run: TestRun,
        targets: Vec<Target>,
    ) -> Result<Batch, TesterError> {
        std::fs::create_dir_all(&self.temp_root)?;
        let total = targets.len();
        let tests = targets
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(idx, chunk)| Test {
                targets: chunk.to_vec(),
                command: command.clone(),
                run_args: self.run_args.clone(),
                filter_args: self.filter_args.clone(),
                work_dir: self.root.clone(),
                env: self.env.clone(),
                log: self
                    .temp_root
                    .join(format!("junit-{}-{}.xml", run.id(), idx)),
                timeout: self.timeout,
            })
            .collect();
        let (progress, _) = watch::channel(Progress {
            state: BatchState::Created,
            total,
            done: 0,
            failing: 0,
        });
        Ok(Batch {
            run,
            tests,
            jobs: self.jobs,
            progress,
        })
    }
}

/// A run with the tests it still has to execute.
pub struct Batch {
    run: TestRun,
    tests: Vec<Test>,
    jobs: usize,
    progress: watch::Sender<Progress>,
}

impl Batch {
    pub fn id(&self) -> RunId {
        self.run.id()
    }

    pub fn run(&self) -> &TestRun {
        &self.run
    }

    /// Observe the progress of this batch.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Execute the tests and stream their executions in completion order.
    /// Each execution is logged to the run before it is yielded. A failing
    /// test never stops the batch; only storage errors are returned.
    pub fn execute(self) -> impl stream::Stream<Item = Result<Execution, TesterError>> {
        let Batch {
            run,
            tests,
            jobs,
            progress,
        } = self;
        progress.send_modify(|p| {
            p.state = if tests.is_empty() {
                BatchState::Completed
            } else {
                BatchState::Running
            }
        });

        let writer = run.clone();
        stream::iter(tests.into_iter().map(|test| test.execute()))
            .buffer_unordered(jobs)
            .then(move |execution| {
                let run = writer.clone();
                let entries = execution.entries.clone();
                async move {
                    // SQLite writes block, keep them off the executor threads.
                    let stored = tokio::task::spawn_blocking(move || {
                        entries
                            .iter()
                            .try_for_each(|entry| run.insert_log_entry(entry).map(|_| ()))
                    })
                    .await
                    .map_err(TesterError::from)
                    .collapse();
                    (execution, stored)
                }
            })
            .map(move |(execution, stored)| {
                let failing = execution
                    .entries
                    .iter()
                    .filter(|entry| entry.status != Status::Pass)
                    .count();
                progress.send_modify(|p| {
                    p.done += execution.targets.len();
                    p.failing += failing;
                    if p.done >= p.total {
                        p.state = BatchState::Completed;
                    }
                });
                debug!(
                    run = run.id(),
                    classes = execution.targets.len(),
                    exit_code = execution.output.exit_code,
                    "recorded execution"
                );
                stored.map(|_| execution)
            })
    }

    /// Execute every test and summarize the run.
    pub async fn finish(self) -> Result<BTreeMap<String, Tally>, TesterError> {
        let run = self.run.clone();
        let executions = self.execute();
        futures::pin_mut!(executions);
        while let Some(execution) = executions.next().await {
            execution?;
        }
        Ok(results::summarize(&run.log_entries_by_test_class()?))
    }
}
