//! Pickers turn a tester.toml configuration into the set of runnable test
//! classes.
pub mod discovery;
pub mod listing;
pub mod metadata;
pub mod natural;
pub mod toml;

pub use discovery::{Discoverer, Discovery};
