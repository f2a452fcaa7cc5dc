use crate::store::RunId;
use std::path::PathBuf;
use structopt::StructOpt;

/// Options for the CLI.
#[derive(StructOpt, Debug)]
#[structopt(name = "tester", about = "Discover, run and track test classes.")]
pub struct Opts {
    /// Directory containing the tester.toml.
    #[structopt(
        name = "TEST_DIR",
        short = "d",
        long = "dir",
        default_value = ".",
        parse(from_os_str)
    )]
    pub dir: PathBuf,

    /// Log debugging information to STDERR.
    #[structopt(short, long)]
    pub verbose: bool,

    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// List test groups and their classes.
    List {
        /// Only list this group.
        #[structopt(short, long)]
        group: Option<String>,
    },

    /// Show the metadata of a test class.
    Info {
        #[structopt(name = "CLASS")]
        class: String,
    },

    /// Run test classes and record their results.
    Run {
        /// Classes to run. Runs everything when neither classes nor groups
        /// are given.
        #[structopt(name = "CLASSES")]
        classes: Vec<String>,

        /// Run every class of a group.
        #[structopt(short, long = "group")]
        groups: Vec<String>,

        /// Include classes matching the regex. Matched against
        /// `<group>:<class>`.
        #[structopt(short = "i", long = "include")]
        include_filter: Option<String>,

        /// Exclude classes matching the regex. Matched against
        /// `<group>:<class>`.
        #[structopt(short = "x", long = "exclude")]
        exclude_filter: Option<String>,

        /// Number of test processes run in parallel.
        #[structopt(short, long)]
        jobs: Option<usize>,

        /// Continue an earlier run, skipping classes it already logged.
        #[structopt(long)]
        resume: Option<RunId>,
    },

    /// Show the stored results of a run.
    Results {
        #[structopt(name = "RUN")]
        run: RunId,
    },

    /// Run the classes of an earlier run again, as a new run.
    Rerun {
        #[structopt(name = "RUN")]
        run: RunId,

        /// Only run classes that did not pass.
        #[structopt(long)]
        failed: bool,
    },

    /// Remove leftover fixture tables, temporary directories and results.
    Clean {
        /// Keep the fixture database.
        #[structopt(long)]
        no_database: bool,

        /// Keep temporary directories.
        #[structopt(long)]
        no_temp: bool,

        /// Keep stored results.
        #[structopt(long)]
        no_results: bool,

        /// Only remove the results of this run.
        #[structopt(long)]
        run: Option<RunId>,
    },

    /// Create the results storage.
    Setup {
        /// Keep results already stored.
        #[structopt(long)]
        keep_results: bool,
    },
}
