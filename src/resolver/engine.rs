// src/resolver/engine.rs

//! Consistency checks over an arch-filtered pool
//!
//! Every check is a pure function of the pool. Problems within a section
//! follow the pool's enumeration order.

use super::pool::{Pool, PoolEntry};
use super::problem::{Problem, Report, EXIT_OK, EXIT_PROBLEMS, EXIT_REPOCLOSURE_PROBLEMS};
use crate::packages::{Dependency, PackageRecord};
use std::collections::BTreeSet;
use tracing::debug;

/// Which check to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Everything: dependency set, repos, file conflicts, upgrades
    Full,
    /// Only requirements of the packages under test
    Sat,
    /// Only requirements of repository packages
    Repoclosure,
    Conflicts,
    Upgrade,
}

impl CheckKind {
    /// Whether repository packages need real file digests for this check
    pub fn needs_file_digests(self) -> bool {
        matches!(self, CheckKind::Full | CheckKind::Conflicts)
    }

    pub fn exit_code(self, report: &Report) -> u8 {
        if report.is_empty() {
            EXIT_OK
        } else if self == CheckKind::Repoclosure {
            EXIT_REPOCLOSURE_PROBLEMS
        } else {
            EXIT_PROBLEMS
        }
    }
}

/// Run the selected check
pub fn run(kind: CheckKind, pool: &Pool<'_>) -> Report {
    match kind {
        CheckKind::Full => check(pool),
        CheckKind::Sat => check_sat(pool),
        CheckKind::Repoclosure => check_repoclosure(pool),
        CheckKind::Conflicts => check_conflicts(pool),
        CheckKind::Upgrade => check_upgrade(pool),
    }
}

pub fn check(pool: &Pool<'_>) -> Report {
    let (dependency_set, repos) = unresolved_requirements(pool);
    Report {
        dependency_set,
        repos,
        file_conflicts: file_conflicts(pool),
        upgrades: upgrade_regressions(pool),
    }
}

pub fn check_sat(pool: &Pool<'_>) -> Report {
    let (dependency_set, _) = unresolved_requirements(pool);
    Report {
        dependency_set,
        ..Default::default()
    }
}

/// Only breakage of packages already published in the repositories
pub fn check_repoclosure(pool: &Pool<'_>) -> Report {
    let (_, repos) = unresolved_requirements(pool);
    Report {
        repos,
        ..Default::default()
    }
}

pub fn check_conflicts(pool: &Pool<'_>) -> Report {
    Report {
        file_conflicts: file_conflicts(pool),
        ..Default::default()
    }
}

pub fn check_upgrade(pool: &Pool<'_>) -> Report {
    Report {
        upgrades: upgrade_regressions(pool),
        ..Default::default()
    }
}

/// Providers of every requirement of each package under test
///
/// Returns packages in input order, each with its providers' NEVRAs sorted
/// and deduplicated. A package never counts as its own dependency.
pub fn list_deps<'a>(pool: &Pool<'a>) -> Vec<(&'a PackageRecord, Vec<String>)> {
    pool.under_test()
        .map(|pkg| {
            let deps: BTreeSet<String> = pkg
                .requires
                .iter()
                .filter(|req| !req.is_rpmlib())
                .flat_map(|req| pool.providers_of(req))
                .filter(|provider| !std::ptr::eq(*provider, pkg))
                .map(|provider| provider.nevra())
                .collect();
            (pkg, deps.into_iter().collect())
        })
        .collect()
}

/// Unresolved requirements split by requirer origin
fn unresolved_requirements(pool: &Pool<'_>) -> (Vec<Problem>, Vec<Problem>) {
    let mut under_test = Vec::new();
    let mut repos = Vec::new();

    for entry in pool.active() {
        let mut seen: Vec<&Dependency> = Vec::new();
        for req in &entry.package.requires {
            if req.is_rpmlib() || seen.contains(&req) {
                continue;
            }
            seen.push(req);
            if !pool.providers_of(req).is_empty() {
                continue;
            }

            debug!("{} ({}) has unresolved requirement {}", entry.package, entry.origin, req);
            let problem = Problem::UnresolvedRequirement {
                requirer: entry.package.nevra(),
                missing: req.clone(),
            };
            if entry.is_under_test() {
                under_test.push(problem);
            } else {
                repos.push(problem);
            }
        }
    }

    (under_test, repos)
}

/// Undeclared file conflicts involving at least one package under test
///
/// When both packages are under test the one with the lexically smaller
/// NEVRA is the subject and the pair is reported once per path.
fn file_conflicts(pool: &Pool<'_>) -> Vec<Problem> {
    let mut problems = Vec::new();

    for (idx, subject) in pool.entries().iter().enumerate() {
        if !subject.is_under_test() {
            continue;
        }
        let subject_nevra = subject.package.nevra();

        for file in &subject.package.files {
            for other in pool.installers_of(&file.path) {
                if std::ptr::eq(other.package, subject.package) {
                    continue;
                }
                if other.is_under_test() && !subject_first(&subject_nevra, idx, other, pool) {
                    continue;
                }

                let other_digest = other.package.file(&file.path).map(|f| &f.digest);
                if other_digest == Some(&file.digest) {
                    continue;
                }
                if subject.package.conflicts_with(other.package)
                    || other.package.conflicts_with(subject.package)
                {
                    continue;
                }

                problems.push(Problem::FileConflict {
                    subject: subject_nevra.clone(),
                    path: file.path.clone(),
                    other: other.package.nevra(),
                });
            }
        }
    }

    problems
}

/// Tie-break between two packages under test
fn subject_first(
    subject_nevra: &str,
    subject_idx: usize,
    other: &PoolEntry<'_>,
    pool: &Pool<'_>,
) -> bool {
    let other_nevra = other.package.nevra();
    match subject_nevra.cmp(other_nevra.as_str()) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => {
            let other_idx = pool
                .entries()
                .iter()
                .position(|e| std::ptr::eq(e.package, other.package))
                .unwrap_or(usize::MAX);
            subject_idx < other_idx
        }
    }
}

fn upgrade_regressions(pool: &Pool<'_>) -> Vec<Problem> {
    pool.under_test()
        .filter_map(|pkg| {
            pool.find_same_name_arch_in_repos(pkg)
                .map(|(repo, existing)| Problem::UpgradeRegression {
                    under_test: pkg.nevra(),
                    existing: existing.nevra(),
                    repo: repo.to_string(),
                })
        })
        .collect()
}
