// src/repository/cache.rs

//! Checksum-addressed cache for repository metadata documents
//!
//! Documents are stored at `{root}/{checksum[0]}/{checksum[1..]}/{filename}`.
//! The two-level layout bounds directory fan-out, and because the path is a
//! pure function of the checksum, repeated fetches of the same document are
//! idempotent. Entries older than the configured TTL are deleted by
//! [`MetadataCache::sweep_expired`] and are never served.
//!
//! Caching is an optimization only: write and delete failures are logged
//! and the cache falls back to passing fetched bytes through.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Environment variable overriding the entry TTL, in seconds
pub const EXPIRY_ENV: &str = "DEPLINT_EXPIRY_SECONDS";

/// Environment variable overriding the cache root directory
pub const CACHE_DIR_ENV: &str = "DEPLINT_CACHE_DIR";

/// Default entry TTL (3 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Prefix of in-flight temporary files inside a shard directory
const TEMP_PREFIX: &str = ".tmp";

/// Temporary files younger than this may still be written to
const ABANDONED_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Configuration for the metadata cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for cached documents
    pub root: PathBuf,
    /// Maximum age of an entry before it is evicted
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    /// Build the configuration from the process environment
    pub fn from_env() -> Self {
        let root = std::env::var_os(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::cache_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("deplint")
            });

        let ttl = match std::env::var(EXPIRY_ENV) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => {
                    warn!("Ignoring invalid {}={:?}: {}", EXPIRY_ENV, value, e);
                    DEFAULT_TTL
                }
            },
            Err(_) => DEFAULT_TTL,
        };

        Self { root, ttl }
    }
}

/// Identifies one cached document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Hex digest of the document content
    pub checksum: String,
    /// Metadata kind, e.g. "primary" or "filelists"
    pub kind: String,
    /// Original file name of the document
    pub filename: String,
}

impl CacheKey {
    /// Build a key from a document's checksum, kind and relative location
    ///
    /// The checksum must be a hex digest and the file name a plain path
    /// component, so the entry path always stays below the cache root.
    pub fn new(checksum: &str, kind: &str, location: &str) -> Result<Self> {
        if checksum.is_empty() || !checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::ParseError(format!(
                "Invalid {} checksum: {:?}",
                kind, checksum
            )));
        }

        let filename = location
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(kind);
        if matches!(filename, "." | "..") || filename.contains(['/', '\\']) {
            return Err(Error::ParseError(format!(
                "Invalid {} file name: {:?}",
                kind, filename
            )));
        }

        Ok(Self {
            checksum: checksum.to_ascii_lowercase(),
            kind: kind.to_string(),
            filename: filename.to_string(),
        })
    }
}

/// Metadata document cache
#[derive(Debug, Clone)]
pub struct MetadataCache {
    config: CacheConfig,
}

impl MetadataCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the on-disk path for a cache entry
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let (shard, rest) = key.checksum.split_at(1.min(key.checksum.len()));
        self.config.root.join(shard).join(rest).join(&key.filename)
    }

    /// Return the cached document, or fetch and store it
    ///
    /// `fetch` is only invoked when no live entry exists. A fetch error is
    /// returned unchanged; failure to store the result is not an error.
    pub fn fetch_or_reuse<F>(&self, key: &CacheKey, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let path = self.entry_path(key);

        if let Some(bytes) = self.read_live(&path, SystemTime::now()) {
            debug!("Using cached {} from {}", key.kind, path.display());
            return Ok(bytes);
        }

        let bytes = fetch()?;

        match self.store(&path, &bytes) {
            Ok(()) => debug!("Cached {} at {}", key.kind, path.display()),
            Err(e) => warn!("Failed to cache {} at {}: {}", key.kind, path.display(), e),
        }

        Ok(bytes)
    }

    /// Delete every entry older than the TTL
    ///
    /// Returns the number of files removed. Shard directories left empty
    /// are removed as well.
    pub fn sweep_expired(&self, now: SystemTime) -> usize {
        let root = &self.config.root;
        if !root.exists() {
            return 0;
        }

        let mut removed = 0;
        let files = WalkDir::new(root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for file in files {
            let path = file.path();
            let in_flight = file.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
            let ttl = if in_flight {
                self.config.ttl.max(ABANDONED_TEMP_AGE)
            } else {
                self.config.ttl
            };
            if !older_than(path, ttl, now) {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    removed += 1;
                    debug!("Evicted {}", path.display());
                }
                Err(e) => warn!("Failed to evict {}: {}", path.display(), e),
            }
        }

        // Entry directories come before their shard; removal only succeeds when empty
        let dirs = WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .contents_first(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir());
        for dir in dirs {
            let _ = fs::remove_dir(dir.path());
        }

        if removed > 0 {
            info!("Evicted {} expired metadata cache entries", removed);
        }
        removed
    }

    fn read_live(&self, path: &Path, now: SystemTime) -> Option<Vec<u8>> {
        if !path.is_file() || older_than(path, self.config.ttl, now) {
            return None;
        }
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to read cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write atomically (write to temp in the same directory, then rename)
    fn store(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("cache entry has no parent directory"))?;
        fs::create_dir_all(parent)?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        persist(temp, path)
    }
}

/// Age is measured from the last write; entries stamped in the future count
/// as fresh
fn older_than(path: &Path, max_age: Duration, now: SystemTime) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    now.duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

fn persist(temp: NamedTempFile, path: &Path) -> std::io::Result<()> {
    temp.persist(path).map(|_| ()).map_err(|e| e.error)
}
