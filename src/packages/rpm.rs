// src/packages/rpm.rs

//! RPM package file reader

use crate::error::{Error, Result};
use crate::packages::record::{Dependency, PackageFile, PackageRecord};
use crate::packages::traits::PackageFormat;
use crate::version::{Comparison, RpmVersion, VersionConstraint};
use rpm::Package;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use tracing::debug;

/// File type bits of an RPM file mode
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// RPM package representation
pub struct RpmPackage {
    name: String,
    evr: RpmVersion,
    architecture: String,
    provides: Vec<Dependency>,
    requires: Vec<Dependency>,
    obsoletes: Vec<Dependency>,
    conflicts: Vec<Dependency>,
    files: Vec<PackageFile>,
}

impl RpmPackage {
    fn from_reader<R: BufRead>(reader: &mut R, source: &str) -> Result<Self> {
        let pkg = Package::parse(reader)
            .map_err(|e| Error::InitError(format!("Failed to parse RPM {}: {}", source, e)))?;

        let name = pkg
            .metadata
            .get_name()
            .map_err(|e| Error::InitError(format!("Failed to get package name: {}", e)))?
            .to_string();

        let version = pkg
            .metadata
            .get_version()
            .map_err(|e| Error::InitError(format!("Failed to get package version: {}", e)))?
            .to_string();

        let release = pkg
            .metadata
            .get_release()
            .map_err(|e| Error::InitError(format!("Failed to get package release: {}", e)))?
            .to_string();

        // Packages without an epoch tag have epoch 0
        let epoch = pkg.metadata.get_epoch().map(u64::from).unwrap_or(0);

        // Source packages have no arch tag
        let architecture = pkg
            .metadata
            .get_arch()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "src".to_string());

        let provides = convert_dependencies(pkg.metadata.get_provides());
        let requires = convert_dependencies(pkg.metadata.get_requires());
        let obsoletes = convert_dependencies(pkg.metadata.get_obsoletes());
        let conflicts = convert_dependencies(pkg.metadata.get_conflicts());
        let files = Self::extract_files(&pkg);

        debug!(
            "Parsed RPM: {}-{}-{}.{} ({} files, {} requires)",
            name,
            version,
            release,
            architecture,
            files.len(),
            requires.len()
        );

        Ok(Self {
            name,
            evr: RpmVersion::new(epoch, version, Some(release)),
            architecture,
            provides,
            requires,
            obsoletes,
            conflicts,
            files,
        })
    }

    /// Extract installed files with their content digests
    ///
    /// Directories and ghost files are skipped: they never conflict.
    fn extract_files(pkg: &Package) -> Vec<PackageFile> {
        let mut files = Vec::new();

        if let Ok(file_entries) = pkg.metadata.get_file_entries() {
            for entry in file_entries {
                let mode = u32::from(entry.mode.raw_mode());
                if mode & S_IFMT == S_IFDIR || entry.flags.contains(rpm::FileFlags::GHOST) {
                    continue;
                }

                // FileDigest can be formatted as hex string
                let digest = entry.digest.as_ref().map(|d| format!("{}", d));

                files.push(PackageFile {
                    path: entry.path.to_string_lossy().to_string(),
                    digest,
                });
            }
        }

        files
    }

    pub fn files(&self) -> &[PackageFile] {
        &self.files
    }
}

/// Convert rpm header dependencies, skipping rpmlib() internals
fn convert_dependencies(
    deps: std::result::Result<Vec<rpm::Dependency>, rpm::Error>,
) -> Vec<Dependency> {
    let Ok(deps) = deps else {
        return Vec::new();
    };

    deps.into_iter()
        .filter(|dep| !dep.name.starts_with("rpmlib("))
        .map(|dep| {
            let constraint = flags_to_comparison(dep.flags)
                .filter(|_| !dep.version.is_empty())
                .and_then(|op| {
                    RpmVersion::parse(&dep.version)
                        .ok()
                        .map(|version| VersionConstraint::new(op, version))
                });
            Dependency {
                name: dep.name,
                constraint,
            }
        })
        .collect()
}

/// Convert RPM DependencyFlags to a comparison operator
fn flags_to_comparison(flags: rpm::DependencyFlags) -> Option<Comparison> {
    use rpm::DependencyFlags;

    let less = flags.contains(DependencyFlags::LESS);
    let greater = flags.contains(DependencyFlags::GREATER);
    let equal = flags.contains(DependencyFlags::EQUAL);

    match (less, greater, equal) {
        (true, false, true) => Some(Comparison::LessOrEqual),
        (false, true, true) => Some(Comparison::GreaterOrEqual),
        (true, false, false) => Some(Comparison::Less),
        (false, true, false) => Some(Comparison::Greater),
        (false, false, true) => Some(Comparison::Equal),
        // No comparison flags (ANY)
        _ => None,
    }
}

impl PackageFormat for RpmPackage {
    fn parse(path: &str) -> Result<Self> {
        debug!("Parsing RPM package: {}", path);

        let file = File::open(path)
            .map_err(|e| Error::InitError(format!("Failed to open RPM file {}: {}", path, e)))?;

        let mut buf_reader = BufReader::new(file);
        Self::from_reader(&mut buf_reader, path)
    }

    fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(&mut Cursor::new(bytes), "<memory>")
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn architecture(&self) -> &str {
        &self.architecture
    }

    fn to_record(&self) -> PackageRecord {
        let mut record = PackageRecord::new(
            self.name.clone(),
            self.evr.clone(),
            self.architecture.clone(),
        );
        record.provides = self.provides.clone();
        record.requires = self.requires.clone();
        record.obsoletes = self.obsoletes.clone();
        record.conflicts = self.conflicts.clone();
        record.files = self.files.clone();
        record
    }
}
