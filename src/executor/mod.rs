//! An executor is responsible for running the selected test classes through
//! the test tool and recording their results.

pub mod process;
pub mod results;
pub mod suite;
mod context;

pub use context::{Batch, BatchState, Orchestrator, Progress};
pub use suite::Selection;
pub use test::{Execution, Target, Test};
