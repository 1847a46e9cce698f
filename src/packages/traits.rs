// src/packages/traits.rs

//! Common traits for package format readers

use crate::error::Result;
use crate::packages::record::PackageRecord;

/// Common interface for package file readers
pub trait PackageFormat {
    /// Parse a package file from the given path
    fn parse(path: &str) -> Result<Self>
    where
        Self: Sized;

    /// Parse a package from an in-memory buffer
    fn parse_bytes(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;

    /// Get the package name
    fn name(&self) -> &str;

    /// Get the package architecture (e.g., "x86_64", "noarch")
    fn architecture(&self) -> &str;

    /// Convert this package into the record used by the dependency checks
    fn to_record(&self) -> PackageRecord;
}
