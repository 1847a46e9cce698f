// src/repository/mod.rs

//! Repository loading and package downloading
//!
//! This module provides functionality for:
//! - Fetching documents over HTTP(S), `file://` URLs or plain paths
//! - Loading rpm-md repository metadata through the metadata cache
//! - Downloading repository packages whose file digests are needed

pub mod cache;
pub mod parsers;

use crate::error::{Error, Result};
use crate::packages::rpm::RpmPackage;
use crate::packages::{PackageFormat, PackageRecord};
use crate::resolver::pool::shadows;
use cache::{CacheKey, MetadataCache};
use parsers::{fedora, MetadataDocument, FILELISTS, PRIMARY};
use rayon::prelude::*;
use reqwest::blocking::Client;
use std::collections::HashSet;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Location of the repository index relative to the base URL
const REPOMD_LOCATION: &str = "repodata/repomd.xml";

/// Source of raw bytes for a URL
pub trait Fetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP client wrapper with retry support
///
/// `file://` URLs and plain paths are read from the local filesystem.
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let bytes = response.bytes().map_err(|e| {
                        Error::DownloadError(format!("Failed to read body of {}: {}", url, e))
                    })?;

                    debug!("Fetched {} bytes from {}", bytes.len(), url);
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for RepositoryClient {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url);
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        fs::read(path).map_err(|e| Error::DownloadError(format!("Failed to read {}: {}", url, e)))
    }
}

/// Join a repository-relative location onto a base URL
pub fn join_url(base: &str, location: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        location.trim_start_matches('/')
    )
}

/// A `NAME,URL` repository argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub name: String,
    pub base_url: String,
}

impl FromStr for RepoSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(',') {
            Some((name, url)) if !name.is_empty() && !url.is_empty() => Ok(Self {
                name: name.to_string(),
                base_url: url.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "Repository must be given as NAME,URL, got '{}'",
                s
            ))),
        }
    }
}

/// A loaded repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub base_url: String,
    pub packages: Vec<PackageRecord>,
}

/// Loads repositories through the metadata cache
pub struct RepositoryLoader<'a> {
    client: &'a dyn Fetcher,
    cache: &'a MetadataCache,
}

impl<'a> RepositoryLoader<'a> {
    pub fn new(client: &'a dyn Fetcher, cache: &'a MetadataCache) -> Self {
        Self { client, cache }
    }

    /// Load one repository
    ///
    /// repomd.xml is always fetched; primary and filelists come from the
    /// cache when a live entry with the same checksum exists.
    pub fn load(&self, spec: &RepoSpec) -> Result<Repository> {
        info!("Loading repository {} from {}", spec.name, spec.base_url);

        let repomd_url = join_url(&spec.base_url, REPOMD_LOCATION);
        let repomd = self.client.get(&repomd_url)?;
        let repomd = String::from_utf8(repomd)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", repomd_url, e)))?;
        let documents = fedora::parse_repomd(&repomd)?;

        let primary = self.fetch_document(spec, find_document(&documents, PRIMARY, spec)?)?;
        let filelists = self.fetch_document(spec, find_document(&documents, FILELISTS, spec)?)?;

        let mut packages = fedora::parse_primary_xml(&primary)?;
        let file_lists = fedora::parse_filelists_xml(&filelists)?;
        fedora::join_file_lists(&mut packages, file_lists);

        info!("Repository {} has {} packages", spec.name, packages.len());
        Ok(Repository {
            name: spec.name.clone(),
            base_url: spec.base_url.clone(),
            packages,
        })
    }

    /// Load all repositories in parallel, preserving their order
    pub fn load_all(&self, specs: &[RepoSpec]) -> Result<Vec<Repository>> {
        specs.par_iter().map(|spec| self.load(spec)).collect()
    }

    fn fetch_document(&self, spec: &RepoSpec, doc: &MetadataDocument) -> Result<String> {
        let key = CacheKey::new(&doc.checksum, &doc.kind, &doc.location)?;
        let url = join_url(&spec.base_url, &doc.location);

        let bytes = self.cache.fetch_or_reuse(&key, || {
            let bytes = self.client.get(&url)?;
            parsers::verify_checksum(doc, &bytes)?;
            Ok(bytes)
        })?;

        parsers::decompress(&doc.location, &bytes)
    }

    /// Fill in file digests for repository packages that share a path with
    /// a package under test
    ///
    /// Repository metadata carries no file digests, so each such package is
    /// downloaded and read. Packages shadowed by a package under test never
    /// take part in conflict checks and are skipped, as are packages rejected
    /// by `candidate`. Returns the number of packages downloaded.
    pub fn resolve_file_digests<F>(
        &self,
        repos: &mut [Repository],
        under_test: &[PackageRecord],
        candidate: F,
    ) -> Result<usize>
    where
        F: Fn(&PackageRecord) -> bool + Sync,
    {
        let paths: HashSet<&str> = under_test
            .iter()
            .flat_map(|pkg| pkg.files.iter().map(|f| f.path.as_str()))
            .collect();

        let mut downloaded = 0;
        for repo in repos.iter_mut() {
            let base_url = repo.base_url.clone();
            let needed: Vec<&mut PackageRecord> = repo
                .packages
                .iter_mut()
                .filter(|pkg| {
                    candidate(pkg)
                        && !under_test.iter().any(|tested| shadows(tested, pkg))
                        && pkg
                            .files
                            .iter()
                            .any(|f| f.digest.is_none() && paths.contains(f.path.as_str()))
                })
                .collect();

            downloaded += needed.len();
            needed
                .into_par_iter()
                .try_for_each(|pkg| self.hydrate(&base_url, pkg))?;
        }

        if downloaded > 0 {
            info!("Downloaded {} packages to read file digests", downloaded);
        }
        Ok(downloaded)
    }

    fn hydrate(&self, base_url: &str, pkg: &mut PackageRecord) -> Result<()> {
        let location = pkg.location.as_deref().ok_or_else(|| {
            Error::DownloadError(format!("No package location for {}", pkg))
        })?;
        let url = join_url(base_url, location);
        debug!("Downloading {} for file digests", url);

        let bytes = self.client.get(&url)?;
        let rpm = RpmPackage::parse_bytes(&bytes)?;
        pkg.files = rpm.files().to_vec();
        Ok(())
    }
}

fn find_document<'d>(
    documents: &'d [MetadataDocument],
    kind: &str,
    spec: &RepoSpec,
) -> Result<&'d MetadataDocument> {
    documents.iter().find(|d| d.kind == kind).ok_or_else(|| {
        Error::ParseError(format!(
            "Repository {} has no {} metadata",
            spec.name, kind
        ))
    })
}
