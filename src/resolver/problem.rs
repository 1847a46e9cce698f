// src/resolver/problem.rs

//! Dependency problems and the categorized report

use crate::packages::Dependency;
use std::fmt;

/// No problems found
pub const EXIT_OK: u8 = 0;

/// check-repoclosure found breakage in existing repository packages
pub const EXIT_REPOCLOSURE_PROBLEMS: u8 = 1;

/// Setup or usage error
pub const EXIT_SETUP_ERROR: u8 = 2;

/// A check found one or more problems
pub const EXIT_PROBLEMS: u8 = 3;

/// A single finding of the consistency checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    UnresolvedRequirement {
        requirer: String,
        missing: Dependency,
    },
    FileConflict {
        subject: String,
        path: String,
        other: String,
    },
    UpgradeRegression {
        under_test: String,
        existing: String,
        repo: String,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::UnresolvedRequirement { requirer, missing } => {
                write!(f, "nothing provides {} needed by {}", missing, requirer)
            }
            Problem::FileConflict {
                subject,
                path,
                other,
            } => write!(
                f,
                "{} provides {} which is also provided by {}",
                subject, path, other
            ),
            Problem::UpgradeRegression {
                under_test,
                existing,
                repo,
            } => write!(
                f,
                "{} would be upgraded by {} from repo {}",
                under_test, existing, repo
            ),
        }
    }
}

/// Report sections, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    DependencySet,
    Repos,
    FileConflicts,
    Upgrades,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::DependencySet,
        Category::Repos,
        Category::FileConflicts,
        Category::Upgrades,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Category::DependencySet => "Problems with dependency set:",
            Category::Repos => "Dependency problems with repos:",
            Category::FileConflicts => "Undeclared file conflicts:",
            Category::Upgrades => "Upgrade problems:",
        }
    }
}

/// Categorized problems produced by one check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub dependency_set: Vec<Problem>,
    pub repos: Vec<Problem>,
    pub file_conflicts: Vec<Problem>,
    pub upgrades: Vec<Problem>,
}

impl Report {
    pub fn section(&self, category: Category) -> &[Problem] {
        match category {
            Category::DependencySet => &self.dependency_set,
            Category::Repos => &self.repos,
            Category::FileConflicts => &self.file_conflicts,
            Category::Upgrades => &self.upgrades,
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.section(*c).is_empty())
    }

    /// Render non-empty sections, each line newline-terminated
    pub fn render(&self) -> String {
        let mut out = String::new();
        for category in Category::ALL {
            let problems = self.section(category);
            if problems.is_empty() {
                continue;
            }
            out.push_str(category.header());
            out.push('\n');
            for problem in problems {
                out.push_str(&problem.to_string());
                out.push('\n');
            }
        }
        out
    }
}
