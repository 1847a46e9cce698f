// src/repository/parsers/mod.rs

//! Repository metadata parsers
//!
//! This module provides parsers for rpm-md repository metadata:
//! - repomd.xml: the index of metadata documents
//! - primary.xml: packages with their relations
//! - filelists.xml: installed file paths per package
//!
//! Documents are decompressed and checksum-verified here before parsing.

pub mod fedora;

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io::Read;
use tracing::debug;

/// Metadata kinds the loader needs from every repository
pub const PRIMARY: &str = "primary";
pub const FILELISTS: &str = "filelists";

/// One `<data>` entry of repomd.xml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDocument {
    /// Document kind, e.g. "primary"
    pub kind: String,

    /// Checksum algorithm type
    pub checksum_type: ChecksumType,

    /// Hex digest of the (compressed) document
    pub checksum: String,

    /// Location relative to the repository base URL
    pub location: String,
}

/// Checksum algorithm type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumType {
    Sha224,
    Sha256,
    Sha384,
    Sha512,

    /// Algorithms we accept but cannot verify (sha1, md5)
    Other(String),
}

impl ChecksumType {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "sha224" => ChecksumType::Sha224,
            "sha256" => ChecksumType::Sha256,
            "sha384" => ChecksumType::Sha384,
            "sha512" => ChecksumType::Sha512,
            other => ChecksumType::Other(other.to_string()),
        }
    }
}

/// Verify downloaded bytes against the checksum declared in repomd.xml
pub fn verify_checksum(doc: &MetadataDocument, bytes: &[u8]) -> Result<()> {
    let actual = match &doc.checksum_type {
        ChecksumType::Sha224 => format!("{:x}", Sha224::digest(bytes)),
        ChecksumType::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        ChecksumType::Sha384 => format!("{:x}", Sha384::digest(bytes)),
        ChecksumType::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        ChecksumType::Other(name) => {
            debug!(
                "Skipping verification of {} ({} checksums are not supported)",
                doc.location, name
            );
            return Ok(());
        }
    };

    if !actual.eq_ignore_ascii_case(&doc.checksum) {
        return Err(Error::ChecksumMismatch {
            expected: doc.checksum.clone(),
            actual,
        });
    }

    debug!("Checksum verified for {}", doc.location);
    Ok(())
}

/// Decompress a metadata document, detecting the format from its location
pub fn decompress(location: &str, bytes: &[u8]) -> Result<String> {
    let mut decompressed = String::new();

    if location.ends_with(".gz") {
        debug!("Decompressing gzip-compressed {}", location);
        GzDecoder::new(bytes)
            .read_to_string(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
    } else if location.ends_with(".zst") {
        debug!("Decompressing zstd-compressed {}", location);
        let raw = zstd::decode_all(bytes)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        decompressed = String::from_utf8(raw)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e)))?;
    } else if location.ends_with(".xz") {
        debug!("Decompressing xz-compressed {}", location);
        xz2::read::XzDecoder::new(bytes)
            .read_to_string(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
    } else {
        decompressed = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e)))?;
    }

    debug!("Decompressed {}: {} bytes", location, decompressed.len());
    Ok(decompressed)
}
