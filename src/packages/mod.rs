// src/packages/mod.rs

//! Package data model and package file readers
//!
//! `PackageRecord` is the format-neutral view used by the resolver.
//! Package files on disk are read through the `PackageFormat` trait.

pub mod record;
pub mod rpm;
pub mod traits;

pub use record::{Dependency, PackageFile, PackageRecord};
pub use traits::PackageFormat;
