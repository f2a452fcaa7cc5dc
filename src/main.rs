use tester::{
    cleaner::{CleanFlags, Cleaner},
    cli::{Command, Opts},
    errors::TesterError,
    executor::{Batch, Orchestrator, Selection},
    picker::{toml::Config, Discoverer},
    printer,
    store::{ResultsStore, TestRun},
};

use futures::{
    io::{AllowStdIo, AsyncWriteExt},
    StreamExt,
};
use regex::Regex;
use std::sync::Arc;
use structopt::StructOpt;
use tokio::runtime;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Open the results storage, creating its tables on first use.
fn open_store(conf: &Config) -> Result<Arc<ResultsStore>, TesterError> {
    let store = ResultsStore::open(&conf.resolve(&conf.environment.results_db))?;
    if !store.validate_testing_results_environment()? {
        store.build_testing_results_environment(true)?;
    }
    Ok(Arc::new(store))
}

fn compile(regex: &Option<String>, flag: &str) -> Result<Option<Regex>, TesterError> {
    regex
        .as_ref()
        .map(|reg| {
            Regex::new(reg)
                .map_err(|err| TesterError(format!("Invalid {} regex: {}", flag, err)))
        })
        .transpose()
}

/// Stream the results of a batch as they arrive, then print the summary.
/// Returns the exit status for the failing classes.
async fn report(batch: Batch) -> Result<i32, TesterError> {
    let run = batch.run().clone();
    let stdout_buf = std::io::BufWriter::new(std::io::stdout());
    let mut handle = AllowStdIo::new(stdout_buf);

    handle
        .write_all(format!("Test run {}\n", run.id()).as_bytes())
        .await?;
    let executions = batch.execute();
    futures::pin_mut!(executions);
    while let Some(execution) = executions.next().await {
        let buf = printer::execution_str(&execution?) + "\n";
        handle.write_all(buf.as_bytes()).await?;
        handle.flush().await?;
    }

    let summary = tester::executor::results::summarize(&run.log_entries_by_test_class()?);
    let buf = printer::summary_str(&summary) + "\n";
    handle.write_all(buf.as_bytes()).await?;
    handle.flush().await?;
    Ok(tester::executor::results::exit_status(&summary))
}

async fn dispatch(conf: Config, cmd: Command) -> Result<i32, TesterError> {
    match cmd {
        Command::List { group } => {
            let discovery = Discoverer::new(&conf)?.discover().await?;
            if let Some(group) = &group {
                if discovery.group(group).is_none() {
                    return Err(TesterError(format!("Unknown test group {}.", group)));
                }
            }
            print!("{}", printer::groups_str(&discovery, group.as_deref()));
            Ok(0)
        }
        Command::Info { class } => {
            let infos = Discoverer::new(&conf)?.class_info(Some(&class)).await?;
            for info in infos {
                println!("{}", printer::info_str(&info));
            }
            Ok(0)
        }
        Command::Run {
            classes,
            groups,
            include_filter,
            exclude_filter,
            jobs,
            resume,
        } => {
            let include = compile(&include_filter, "--include")?;
            let exclude = compile(&exclude_filter, "--exclude")?;
            let discovery = Discoverer::new(&conf)?.discover().await?;
            let targets = Selection::default()
                .with_groups(groups)
                .with_classes(classes)
                .with_include_filter(include.as_ref())
                .with_exclude_filter(exclude.as_ref())
                .into_targets(&discovery)?;

            let mut orchestrator = Orchestrator::new(&conf, open_store(&conf)?);
            if let Some(jobs) = jobs {
                orchestrator = orchestrator.with_jobs(jobs);
            }
            let batch = match resume {
                Some(run) => orchestrator.resume(run, targets)?,
                None => orchestrator.start(targets)?,
            };
            report(batch).await
        }
        Command::Results { run } => {
            let run = TestRun::get(open_store(&conf)?, run)?;
            let entries = run.log_entries_by_test_class()?;
            print!("{}", printer::entries_str(&entries));
            let summary = tester::executor::results::summarize(&entries);
            println!("{}", printer::summary_str(&summary));
            Ok(0)
        }
        Command::Rerun { run, failed } => {
            let discovery = Discoverer::new(&conf)?.discover().await?;
            let orchestrator = Orchestrator::new(&conf, open_store(&conf)?);
            report(orchestrator.rerun(run, failed, &discovery)?).await
        }
        Command::Clean {
            no_database,
            no_temp,
            no_results,
            run,
        } => {
            let cleaner = Cleaner::new(&conf, open_store(&conf)?);
            let summary = cleaner.clean_environment(CleanFlags {
                database: !no_database,
                temp_directories: !no_temp,
                results: !no_results,
                run,
            });
            println!("{}", printer::cleanup_str(&summary));
            Ok(if summary.has_failures() { 1 } else { 0 })
        }
        Command::Setup { keep_results } => {
            let store = ResultsStore::open(&conf.resolve(&conf.environment.results_db))?;
            store.build_testing_results_environment(
                keep_results || conf.environment.keep_results,
            )?;
            println!("Results storage is ready.");
            Ok(0)
        }
    }
}

fn run() -> Result<i32, TesterError> {
    let opts = Opts::from_args();
    init_logging(opts.verbose);
    let conf = Config::from_path(&opts.dir)?;

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get())
        .build()?;

    runtime.block_on(dispatch(conf, opts.cmd))
}

fn main() {
    std::process::exit(match run() {
        Err(TesterError(msg)) => {
            println!("error: {}", msg);
            1
        }
        Ok(failed_tests) => failed_tests,
    })
}
