// src/resolver/pool.rs

//! The package universe: repository packages plus packages under test
//!
//! A repository package is shadowed when a package under test has the same
//! name and arch, or obsoletes it. Shadowed packages take no part in
//! resolution; they are kept only so upgrade regressions can be detected.

use crate::packages::{Dependency, PackageRecord};
use crate::repository::Repository;
use std::collections::HashMap;
use std::fmt;

/// Where a package in the pool came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin<'a> {
    Repo(&'a str),
    UnderTest,
}

impl fmt::Display for Origin<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Repo(name) => write!(f, "repo:{}", name),
            Origin::UnderTest => write!(f, "under-test"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolEntry<'a> {
    pub origin: Origin<'a>,
    pub package: &'a PackageRecord,
    pub shadowed: bool,
}

impl PoolEntry<'_> {
    pub fn is_under_test(&self) -> bool {
        self.origin == Origin::UnderTest
    }
}

/// Read-only indexes over borrowed package records
pub struct Pool<'a> {
    entries: Vec<PoolEntry<'a>>,

    /// Capability name -> active entries providing something by that name
    capabilities: HashMap<&'a str, Vec<usize>>,

    /// Installed path -> active entries installing it
    files: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Pool<'a> {
    /// Aggregate repositories (in order) and then the packages under test
    pub fn build(repos: &'a [Repository], under_test: &'a [PackageRecord]) -> Self {
        let mut entries = Vec::new();

        for repo in repos {
            for package in &repo.packages {
                let shadowed = under_test.iter().any(|t| shadows(t, package));
                entries.push(PoolEntry {
                    origin: Origin::Repo(&repo.name),
                    package,
                    shadowed,
                });
            }
        }

        for package in under_test {
            entries.push(PoolEntry {
                origin: Origin::UnderTest,
                package,
                shadowed: false,
            });
        }

        Self::from_entries(entries)
    }

    /// Index a list of entries, keeping their order
    pub fn from_entries(entries: Vec<PoolEntry<'a>>) -> Self {
        let mut capabilities: HashMap<&'a str, Vec<usize>> = HashMap::new();
        let mut files: HashMap<&'a str, Vec<usize>> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            if entry.shadowed {
                continue;
            }
            let pkg = entry.package;

            let mut names: Vec<&'a str> = Vec::with_capacity(pkg.provides.len() + 1);
            names.push(pkg.name.as_str());
            for provide in &pkg.provides {
                if !names.contains(&provide.name.as_str()) {
                    names.push(provide.name.as_str());
                }
            }
            for name in names {
                capabilities.entry(name).or_default().push(idx);
            }

            for file in &pkg.files {
                files.entry(file.path.as_str()).or_default().push(idx);
            }
        }

        Self {
            entries,
            capabilities,
            files,
        }
    }

    pub fn entries(&self) -> &[PoolEntry<'a>] {
        &self.entries
    }

    /// Entries taking part in resolution, in enumeration order
    pub fn active(&self) -> impl Iterator<Item = &PoolEntry<'a>> + '_ {
        self.entries.iter().filter(|e| !e.shadowed)
    }

    /// Every package with its origin, shadowed ones included
    pub fn all_packages(&self) -> impl Iterator<Item = (Origin<'a>, &'a PackageRecord)> + '_ {
        self.entries.iter().map(|e| (e.origin, e.package))
    }

    pub fn under_test(&self) -> impl Iterator<Item = &'a PackageRecord> + '_ {
        self.entries
            .iter()
            .filter(|e| e.is_under_test())
            .map(|e| e.package)
    }

    /// Active packages satisfying `requirement`, in enumeration order
    ///
    /// Absolute paths are also satisfied by packages installing that file.
    pub fn providers_of(&self, requirement: &Dependency) -> Vec<&'a PackageRecord> {
        let mut found: Vec<usize> = self
            .capabilities
            .get(requirement.name.as_str())
            .into_iter()
            .flatten()
            .copied()
            .filter(|&idx| self.entries[idx].package.provides_capability(requirement))
            .collect();

        if requirement.is_file() {
            if let Some(installers) = self.files.get(requirement.name.as_str()) {
                found.extend(installers);
                found.sort_unstable();
                found.dedup();
            }
        }

        found.into_iter().map(|idx| self.entries[idx].package).collect()
    }

    /// Active entries installing `path`
    pub fn installers_of(&self, path: &str) -> impl Iterator<Item = &PoolEntry<'a>> + '_ {
        self.files
            .get(path)
            .into_iter()
            .flatten()
            .map(|&idx| &self.entries[idx])
    }

    /// Newest repository package with the same name and arch as `pkg` that
    /// is strictly newer than it
    ///
    /// Shadowed packages are considered; they are exactly what a package
    /// under test would replace.
    pub fn find_same_name_arch_in_repos(
        &self,
        pkg: &PackageRecord,
    ) -> Option<(&'a str, &'a PackageRecord)> {
        let mut newest: Option<(&'a str, &'a PackageRecord)> = None;

        for entry in &self.entries {
            let Origin::Repo(repo) = entry.origin else {
                continue;
            };
            let candidate = entry.package;
            if candidate.name != pkg.name
                || candidate.arch != pkg.arch
                || candidate.evr <= pkg.evr
            {
                continue;
            }
            if newest.is_none_or(|(_, best)| candidate.evr > best.evr) {
                newest = Some((repo, candidate));
            }
        }

        newest
    }
}

/// Whether package under test `tested` shadows repository package `repo_pkg`
pub(crate) fn shadows(tested: &PackageRecord, repo_pkg: &PackageRecord) -> bool {
    (tested.name == repo_pkg.name && tested.arch == repo_pkg.arch)
        || tested.obsoletes.iter().any(|o| repo_pkg.matched_by(o))
}
