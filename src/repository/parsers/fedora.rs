// src/repository/parsers/fedora.rs

//! Fedora/RPM repository metadata parser
//!
//! Parses repomd.xml, primary.xml and filelists.xml. Primary and filelists
//! describe the same packages and are joined on package identity
//! (name, epoch, version, release, arch).

use super::{ChecksumType, MetadataDocument};
use crate::error::{Error, Result};
use crate::packages::{Dependency, PackageFile, PackageRecord};
use crate::version::{Comparison, RpmVersion, VersionConstraint};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Package identity used to join primary and filelists entries:
/// name, epoch, version, release, arch as written in the metadata
type PackageKey = (String, u64, String, Option<String>, String);

fn identity(name: &str, evr: &RpmVersion, arch: &str) -> PackageKey {
    (
        name.to_string(),
        evr.epoch,
        evr.version.clone(),
        evr.release.clone(),
        arch.to_string(),
    )
}

/// Read an attribute value by name
fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

/// Read `epoch`/`ver`/`rel` attributes of a `<version>` element
fn version_attributes(e: &BytesStart) -> Result<Option<RpmVersion>> {
    let Some(ver) = attribute(e, b"ver") else {
        return Ok(None);
    };
    let epoch = match attribute(e, b"epoch") {
        Some(epoch) if !epoch.is_empty() => epoch
            .parse::<u64>()
            .map_err(|err| Error::ParseError(format!("Invalid epoch '{}': {}", epoch, err)))?,
        _ => 0,
    };
    let release = attribute(e, b"rel").filter(|rel| !rel.is_empty());
    Ok(Some(RpmVersion::new(epoch, ver, release)))
}

/// Parse repomd.xml into its metadata document entries
pub fn parse_repomd(xml_content: &str) -> Result<Vec<MetadataDocument>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut documents = Vec::new();

    let mut current: Option<DocumentBuilder> = None;
    let mut in_checksum = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"data" => {
                    current = Some(DocumentBuilder {
                        kind: attribute(&e, b"type"),
                        ..Default::default()
                    });
                }
                b"checksum" => {
                    if let Some(ref mut doc) = current {
                        doc.checksum_type = attribute(&e, b"type");
                        in_checksum = true;
                    }
                }
                b"location" => {
                    if let Some(ref mut doc) = current {
                        doc.location = attribute(&e, b"href");
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"location" => {
                if let Some(ref mut doc) = current {
                    doc.location = attribute(&e, b"href");
                }
            }
            Ok(Event::Text(e)) if in_checksum => {
                if let Some(ref mut doc) = current {
                    doc.checksum = Some(e.unescape().unwrap_or_default().trim().to_string());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"checksum" => in_checksum = false,
                b"data" => {
                    if let Some(builder) = current.take() {
                        documents.push(builder.build()?);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse repomd.xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if documents.is_empty() {
        return Err(Error::ParseError(
            "repomd.xml does not list any metadata".to_string(),
        ));
    }

    debug!("repomd.xml lists {} metadata documents", documents.len());
    Ok(documents)
}

#[derive(Default)]
struct DocumentBuilder {
    kind: Option<String>,
    checksum_type: Option<String>,
    checksum: Option<String>,
    location: Option<String>,
}

impl DocumentBuilder {
    fn build(self) -> Result<MetadataDocument> {
        let kind = self
            .kind
            .ok_or_else(|| Error::ParseError("repomd.xml <data> without type".to_string()))?;
        let checksum = self.checksum.filter(|c| !c.is_empty()).ok_or_else(|| {
            Error::ParseError(format!("repomd.xml entry '{}' has no checksum", kind))
        })?;
        if !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::ParseError(format!(
                "repomd.xml entry '{}' has a non-hex checksum '{}'",
                kind, checksum
            )));
        }
        let location = self.location.ok_or_else(|| {
            Error::ParseError(format!("repomd.xml entry '{}' has no location", kind))
        })?;
        let checksum_type = ChecksumType::parse(self.checksum_type.as_deref().unwrap_or("sha256"));

        Ok(MetadataDocument {
            kind,
            checksum_type,
            checksum,
            location,
        })
    }
}

/// Relation list currently being read inside `<format>`
#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Provides,
    Requires,
    Obsoletes,
    Conflicts,
    /// Weak dependencies and anything else we do not check
    Ignored,
}

impl Section {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"provides" => Some(Section::Provides),
            b"requires" => Some(Section::Requires),
            b"obsoletes" => Some(Section::Obsoletes),
            b"conflicts" => Some(Section::Conflicts),
            b"recommends" | b"suggests" | b"supplements" | b"enhances" => Some(Section::Ignored),
            _ => None,
        }
    }
}

/// Parse primary.xml and extract package records (without file lists)
pub fn parse_primary_xml(xml_content: &str) -> Result<Vec<PackageRecord>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    // Current package being built
    let mut current_package: Option<PackageBuilder> = None;
    let mut current_tag: Vec<u8> = Vec::new();
    let mut in_format = false;
    let mut section: Option<Section> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"package" => current_package = Some(PackageBuilder::default()),
                    b"format" => in_format = true,
                    _ if in_format => {
                        if let Some(s) = Section::from_tag(&tag) {
                            section = Some(s);
                        } else if tag.as_slice() == b"entry" {
                            if let (Some(pkg), Some(s)) = (current_package.as_mut(), section) {
                                pkg.add_entry(s, &e)?;
                            }
                        }
                    }
                    _ => {
                        if let Some(ref mut pkg) = current_package {
                            pkg.read_element(&tag, &e)?;
                        }
                    }
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                if let Some(ref mut pkg) = current_package {
                    if in_format {
                        if tag.as_slice() == b"entry" {
                            if let Some(s) = section {
                                pkg.add_entry(s, &e)?;
                            }
                        }
                    } else {
                        pkg.read_element(&tag, &e)?;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut pkg) = current_package {
                    if !in_format {
                        let text = e.unescape().unwrap_or_default().to_string();
                        match current_tag.as_slice() {
                            b"name" => pkg.name = Some(text),
                            b"arch" => pkg.arch = Some(text),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"package" => {
                        if let Some(builder) = current_package.take() {
                            packages.push(builder.build()?);
                        }
                    }
                    b"format" => {
                        in_format = false;
                        section = None;
                    }
                    _ if Section::from_tag(&tag).is_some() => section = None,
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse primary.xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} packages from primary.xml", packages.len());
    Ok(packages)
}

/// Builder for constructing a PackageRecord from primary.xml
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    arch: Option<String>,
    evr: Option<RpmVersion>,
    location: Option<String>,
    provides: Vec<Dependency>,
    requires: Vec<Dependency>,
    obsoletes: Vec<Dependency>,
    conflicts: Vec<Dependency>,
}

impl PackageBuilder {
    /// Handle package-level elements carrying attributes
    fn read_element(&mut self, tag: &[u8], e: &BytesStart) -> Result<()> {
        match tag {
            b"version" => self.evr = version_attributes(e)?,
            b"location" => self.location = attribute(e, b"href"),
            _ => {}
        }
        Ok(())
    }

    fn add_entry(&mut self, section: Section, e: &BytesStart) -> Result<()> {
        let Some(name) = attribute(e, b"name") else {
            return Ok(());
        };

        let constraint = match attribute(e, b"flags").as_deref().and_then(Comparison::from_flags)
        {
            Some(op) => version_attributes(e)?.map(|v| VersionConstraint::new(op, v)),
            None => None,
        };
        let dep = Dependency { name, constraint };

        match section {
            Section::Provides => self.provides.push(dep),
            Section::Requires => {
                if !dep.is_rpmlib() {
                    self.requires.push(dep);
                }
            }
            Section::Obsoletes => self.obsoletes.push(dep),
            Section::Conflicts => self.conflicts.push(dep),
            Section::Ignored => {}
        }
        Ok(())
    }

    fn build(self) -> Result<PackageRecord> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let evr = self
            .evr
            .ok_or_else(|| Error::ParseError(format!("Missing version for package {}", name)))?;
        let arch = self
            .arch
            .ok_or_else(|| Error::ParseError(format!("Missing arch for package {}", name)))?;

        let mut record = PackageRecord::new(name, evr, arch);
        record.provides = self.provides;
        record.requires = self.requires;
        record.obsoletes = self.obsoletes;
        record.conflicts = self.conflicts;
        record.location = self.location;
        Ok(record)
    }
}

/// File list of one package in filelists.xml
#[derive(Debug)]
pub struct FileList {
    pub name: String,
    pub evr: RpmVersion,
    pub arch: String,
    pub files: Vec<PackageFile>,
}

/// Name, arch, version and files of the `<package>` being read
type PartialFileList = (Option<String>, Option<String>, Option<RpmVersion>, Vec<PackageFile>);

/// Parse filelists.xml
///
/// Directory and ghost entries are dropped. Filelists carry no content
/// digests, so every file's digest is unknown.
pub fn parse_filelists_xml(xml_content: &str) -> Result<Vec<FileList>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut lists = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<PartialFileList> = None;
    let mut in_file = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"package" => {
                    current = Some((
                        attribute(&e, b"name"),
                        attribute(&e, b"arch"),
                        None,
                        Vec::new(),
                    ));
                }
                b"version" => {
                    if let Some(ref mut pkg) = current {
                        pkg.2 = version_attributes(&e)?;
                    }
                }
                b"file" => {
                    // Only regular files can conflict
                    in_file = matches!(attribute(&e, b"type").as_deref(), None | Some("file"));
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"version" => {
                if let Some(ref mut pkg) = current {
                    pkg.2 = version_attributes(&e)?;
                }
            }
            Ok(Event::Text(e)) if in_file => {
                if let Some(ref mut pkg) = current {
                    let path = e.unescape().unwrap_or_default().to_string();
                    pkg.3.push(PackageFile::new(path, None));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"file" => in_file = false,
                b"package" => {
                    if let Some((name, arch, evr, files)) = current.take() {
                        match (name, arch, evr) {
                            (Some(name), Some(arch), Some(evr)) => lists.push(FileList {
                                name,
                                evr,
                                arch,
                                files,
                            }),
                            _ => {
                                return Err(Error::ParseError(
                                    "filelists.xml package without name, arch or version"
                                        .to_string(),
                                ))
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse filelists.xml at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed file lists for {} packages", lists.len());
    Ok(lists)
}

/// Attach filelists entries to the primary records with the same identity
pub fn join_file_lists(packages: &mut [PackageRecord], file_lists: Vec<FileList>) {
    let mut by_identity: HashMap<PackageKey, Vec<PackageFile>> = file_lists
        .into_iter()
        .map(|list| (identity(&list.name, &list.evr, &list.arch), list.files))
        .collect();

    for pkg in packages.iter_mut() {
        let key = identity(&pkg.name, &pkg.evr, &pkg.arch);
        match by_identity.remove(&key) {
            Some(files) => pkg.files = files,
            None => warn!("No file list for {}", pkg),
        }
    }
}
