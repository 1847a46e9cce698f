// src/packages/record.rs

//! In-memory package records shared by repositories and packages under test

use crate::version::{RpmVersion, VersionConstraint};
use std::fmt;

/// A capability relation: provides, requires, obsoletes or conflicts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Capability name (package name, soname, virtual feature or file path)
    pub name: String,

    /// Optional version range
    pub constraint: Option<VersionConstraint>,
}

impl Dependency {
    /// Create an unversioned relation
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    /// Create a versioned relation
    pub fn versioned(name: impl Into<String>, constraint: VersionConstraint) -> Self {
        Self {
            name: name.into(),
            constraint: Some(constraint),
        }
    }

    /// Requirements on `rpmlib(...)` are satisfied by rpm itself
    pub fn is_rpmlib(&self) -> bool {
        self.name.starts_with("rpmlib(")
    }

    /// File requirements are absolute paths
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Check whether this provide satisfies `requirement`
    ///
    /// Names must be equal. An unversioned side matches anything.
    pub fn satisfies(&self, requirement: &Dependency) -> bool {
        if self.name != requirement.name {
            return false;
        }
        match (&self.constraint, &requirement.constraint) {
            (Some(provided), Some(required)) => provided.overlaps(required),
            _ => true,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{} {}", self.name, constraint),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A file installed by a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub path: String,

    /// Content fingerprint (hex digest), if known
    pub digest: Option<String>,
}

impl PackageFile {
    pub fn new(path: impl Into<String>, digest: Option<String>) -> Self {
        Self {
            path: path.into(),
            digest,
        }
    }
}

/// A single package as seen by the dependency checks
///
/// Identity is (name, epoch, version, release, arch). Records are built
/// once from repository metadata or a package file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub evr: RpmVersion,
    pub arch: String,
    pub provides: Vec<Dependency>,
    pub requires: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub files: Vec<PackageFile>,

    /// Location of the package file relative to its repository base URL
    pub location: Option<String>,
}

impl PackageRecord {
    /// Create a record with no relations or files
    pub fn new(name: impl Into<String>, evr: RpmVersion, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            evr,
            arch: arch.into(),
            provides: Vec::new(),
            requires: Vec::new(),
            obsoletes: Vec::new(),
            conflicts: Vec::new(),
            files: Vec::new(),
            location: None,
        }
    }

    /// `name-[epoch:]version-release.arch`
    pub fn nevra(&self) -> String {
        self.to_string()
    }

    pub fn is_noarch(&self) -> bool {
        self.arch == "noarch"
    }

    /// Check whether any of this package's provides satisfies `requirement`
    ///
    /// The package's own name at its exact EVR is always provided.
    pub fn provides_capability(&self, requirement: &Dependency) -> bool {
        self.self_provide().satisfies(requirement)
            || self.provides.iter().any(|p| p.satisfies(requirement))
    }

    /// Check whether `relation` (an obsoletes or conflicts entry) names
    /// this exact package
    pub fn matched_by(&self, relation: &Dependency) -> bool {
        if relation.name != self.name {
            return false;
        }
        relation
            .constraint
            .as_ref()
            .is_none_or(|c| c.satisfied_by(&self.evr))
    }

    /// Check whether this package declares a conflict with `other`
    pub fn conflicts_with(&self, other: &PackageRecord) -> bool {
        self.conflicts
            .iter()
            .any(|c| other.matched_by(c) || other.provides_capability(c))
    }

    /// Digest of an installed path, if the package installs it
    pub fn file(&self, path: &str) -> Option<&PackageFile> {
        self.files.iter().find(|f| f.path == path)
    }

    fn self_provide(&self) -> Dependency {
        Dependency::versioned(
            self.name.clone(),
            VersionConstraint::exact(self.evr.clone()),
        )
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}
