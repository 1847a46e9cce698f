// src/resolver/mod.rs

//! Dependency consistency checks
//!
//! The flow for one invocation:
//! 1. [`arch::resolve_target_arch`] picks the architecture under test
//! 2. [`Pool::build`] aggregates repositories and packages under test
//! 3. [`arch::filter_compatible`] drops repository packages for other arches
//! 4. [`engine::run`] produces a categorized [`Report`]

pub mod arch;
pub mod engine;
pub mod pool;
pub mod problem;

pub use engine::CheckKind;
pub use pool::{Origin, Pool, PoolEntry};
pub use problem::{
    Category, Problem, Report, EXIT_OK, EXIT_PROBLEMS, EXIT_REPOCLOSURE_PROBLEMS,
    EXIT_SETUP_ERROR,
};
