// src/version.rs

//! RPM version handling
//!
//! Provides `rpmvercmp`-style comparison for `epoch:version-release`
//! strings and the range matching used to decide whether a provide
//! satisfies a requirement.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed RPM version with epoch, version, and release components
#[derive(Debug, Clone)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    pub fn new(epoch: u64, version: impl Into<String>, release: Option<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }

    /// Parse an RPM version string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1:2.3.4-5.el8" → epoch=1, version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        // The release never contains a dash, the version might
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two versions, ignoring the release when either side lacks one
    ///
    /// This is the comparison rpm uses when matching dependency ranges:
    /// a requirement on `foo >= 1.0` must accept `foo-1.0-3`.
    pub fn compare_for_match(&self, other: &RpmVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                _ => Ordering::Equal,
            })
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
    }
}

// Equality follows the rpm ordering, so `1.0` and `1.00` are the same version
impl PartialEq for RpmVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RpmVersion {}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Segment-wise version string comparison with rpm semantics
///
/// Strings are split into maximal runs of digits or letters; anything else
/// is a separator. Numeric runs compare numerically and beat alphabetic
/// runs. `~` sorts before anything, including the end of the string, and
/// `^` sorts after the end of the string but before any other segment.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let is_sep = |c: u8| !c.is_ascii_alphanumeric() && c != b'~' && c != b'^';

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        while let Some(&c) = one.first() {
            if !is_sep(c) {
                break;
            }
            one = &one[1..];
        }
        while let Some(&c) = two.first() {
            if !is_sep(c) {
                break;
            }
            two = &two[1..];
        }

        // Tilde: pre-release marker
        if one.first() == Some(&b'~') || two.first() == Some(&b'~') {
            if one.first() != Some(&b'~') {
                return Ordering::Greater;
            }
            if two.first() != Some(&b'~') {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        // Caret: post-release marker
        if one.first() == Some(&b'^') || two.first() == Some(&b'^') {
            if one.is_empty() {
                return Ordering::Less;
            }
            if two.is_empty() {
                return Ordering::Greater;
            }
            if one[0] != b'^' {
                return Ordering::Greater;
            }
            if two[0] != b'^' {
                return Ordering::Less;
            }
            one = &one[1..];
            two = &two[1..];
            continue;
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let segment_len = |s: &[u8]| {
            s.iter()
                .take_while(|c| {
                    if numeric {
                        c.is_ascii_digit()
                    } else {
                        c.is_ascii_alphabetic()
                    }
                })
                .count()
        };
        let len_one = segment_len(one);
        let len_two = segment_len(two);

        // Segments of different kinds: numeric is newer
        if len_two == 0 {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let seg_one = &one[..len_one];
        let seg_two = &two[..len_two];

        let ord = if numeric {
            let trim = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
            let seg_one = &seg_one[trim(seg_one)..];
            let seg_two = &seg_two[trim(seg_two)..];
            seg_one
                .len()
                .cmp(&seg_two.len())
                .then_with(|| seg_one.cmp(seg_two))
        } else {
            seg_one.cmp(seg_two)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        one = &one[len_one..];
        two = &two[len_two..];
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, _) => Ordering::Greater,
    }
}

/// Comparison operator of a versioned relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Comparison {
    /// Map the `flags` attribute used in repository metadata
    pub fn from_flags(flags: &str) -> Option<Self> {
        match flags {
            "EQ" => Some(Comparison::Equal),
            "LT" => Some(Comparison::Less),
            "GT" => Some(Comparison::Greater),
            "LE" => Some(Comparison::LessOrEqual),
            "GE" => Some(Comparison::GreaterOrEqual),
            _ => None,
        }
    }

    fn has_less(self) -> bool {
        matches!(self, Comparison::Less | Comparison::LessOrEqual)
    }

    fn has_greater(self) -> bool {
        matches!(self, Comparison::Greater | Comparison::GreaterOrEqual)
    }

    fn has_equal(self) -> bool {
        matches!(
            self,
            Comparison::Equal | Comparison::LessOrEqual | Comparison::GreaterOrEqual
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Less => "<",
            Comparison::Greater => ">",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterOrEqual => ">=",
        }
    }
}

/// A version range such as `>= 1.2-3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub op: Comparison,
    pub version: RpmVersion,
}

impl VersionConstraint {
    pub fn new(op: Comparison, version: RpmVersion) -> Self {
        Self { op, version }
    }

    /// Exact constraint on a package's own EVR
    pub fn exact(version: RpmVersion) -> Self {
        Self::new(Comparison::Equal, version)
    }

    /// Check whether this range overlaps another
    ///
    /// Follows rpm's range comparison: the ranges overlap if some version
    /// could satisfy both operators.
    pub fn overlaps(&self, other: &VersionConstraint) -> bool {
        match self.version.compare_for_match(&other.version) {
            Ordering::Less => self.op.has_greater() || other.op.has_less(),
            Ordering::Greater => self.op.has_less() || other.op.has_greater(),
            Ordering::Equal => {
                (self.op.has_equal() && other.op.has_equal())
                    || (self.op.has_less() && other.op.has_less())
                    || (self.op.has_greater() && other.op.has_greater())
            }
        }
    }

    /// Check if a concrete version satisfies this constraint
    pub fn satisfied_by(&self, version: &RpmVersion) -> bool {
        VersionConstraint::exact(version.clone()).overlaps(self)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}
