// src/resolver/arch.rs

//! Target architecture selection and compatibility filtering

use super::pool::{Origin, Pool};
use crate::error::{Error, Result};
use crate::packages::PackageRecord;
use std::collections::BTreeSet;
use tracing::debug;

/// The architecture-independent arch value
pub const NOARCH: &str = "noarch";

const X86_32: &[&str] = &["athlon", "i686", "i586", "i486", "i386"];

/// Architectures each target can run, besides itself and noarch
const COMPATIBLE: &[(&str, &[&str])] = &[
    ("x86_64", X86_32),
    ("amd64", X86_32),
    ("ia32e", X86_32),
    ("athlon", &["i686", "i586", "i486", "i386"]),
    ("i686", &["i586", "i486", "i386"]),
    ("i586", &["i486", "i386"]),
    ("i486", &["i386"]),
    ("ppc64", &["ppc"]),
    ("s390x", &["s390"]),
    ("armv7hl", &["armv6hl"]),
    ("armv7l", &["armv6l", "armv5tel"]),
    ("armv6l", &["armv5tel"]),
];

/// Check whether packages built for `arch` can be installed on `target`
pub fn is_compatible(target: &str, arch: &str) -> bool {
    if arch == target || arch == NOARCH {
        return true;
    }
    COMPATIBLE
        .iter()
        .find(|(t, _)| *t == target)
        .is_some_and(|(_, accepted)| accepted.contains(&arch))
}

/// Pick the architecture to test against
///
/// An explicit arch always wins. Otherwise the non-noarch arches of the
/// packages under test must all be accepted by one of them.
pub fn resolve_target_arch(explicit: Option<&str>, under_test: &[PackageRecord]) -> Result<String> {
    if let Some(arch) = explicit {
        debug!("Using explicit target arch {}", arch);
        return Ok(arch.to_string());
    }

    let arches: BTreeSet<&str> = under_test
        .iter()
        .filter(|pkg| !pkg.is_noarch())
        .map(|pkg| pkg.arch.as_str())
        .collect();

    if arches.is_empty() {
        return Err(Error::ArchitectureError(
            "Cannot determine test arch from noarch packages, pass --arch option explicitly"
                .to_string(),
        ));
    }

    let target = arches
        .iter()
        .find(|candidate| arches.iter().all(|arch| is_compatible(candidate, arch)));

    match target {
        Some(target) => {
            debug!("Guessed target arch {} from packages under test", target);
            Ok(target.to_string())
        }
        None => Err(Error::ArchitectureError(format!(
            "Testing multiple incompatible package architectures is not currently supported: {}",
            arches.into_iter().collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Drop repository packages that cannot be installed on `target`
///
/// Packages under test are always kept.
pub fn filter_compatible<'a>(pool: &Pool<'a>, target: &str) -> Pool<'a> {
    let kept: Vec<_> = pool
        .entries()
        .iter()
        .filter(|entry| {
            entry.origin == Origin::UnderTest || is_compatible(target, &entry.package.arch)
        })
        .cloned()
        .collect();

    debug!(
        "Kept {} of {} packages compatible with {}",
        kept.len(),
        pool.entries().len(),
        target
    );
    Pool::from_entries(kept)
}
