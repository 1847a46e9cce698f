// src/lib.rs

//! deplint: dependency consistency checks for RPM packages
//!
//! Validates that a set of candidate packages, together with one or more
//! rpm-md repositories, form a consistent installation universe before the
//! candidates are published.
//!
//! # Architecture
//!
//! - Metadata cache: checksum-addressed, TTL-evicted store for repository documents
//! - Repository loader: repomd.xml, primary and filelists into package records
//! - Pool: repository packages plus packages under test, with shadowing
//! - Engine: unresolved requirements, file conflicts, upgrade regressions

mod error;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
