//! Cache manager for persisting catalog payloads to disk
//!
//! Provides a `CacheManager` that stores serializable data as JSON files whose
//! modification time is the expiry instant, supporting graceful degradation when
//! the upstream site is unavailable.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};

/// Extension of every cache entry file
const ENTRY_EXTENSION: &str = "json";

/// How a lookup is allowed to use the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve fresh entries, compute on miss, fall back to stale entries on failure
    #[default]
    Auto,
    /// Serve fresh entries only, never compute
    Only,
    /// Always compute and overwrite, never fall back
    Prevent,
}

/// Returned in `CacheMode::Only` when there is no fresh entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no fresh cache entry")]
pub struct CacheMiss;

/// Errors from a compute callback that may be masked by a stale entry
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

/// Result of reading from cache, including metadata about cache freshness
#[derive(Debug)]
pub struct CachedData<T> {
    /// The cached data
    pub data: T,
    /// When the entry stops being fresh
    pub expires_at: DateTime<Utc>,
    /// Whether the cache entry has expired
    pub is_expired: bool,
}

/// Manages reading and writing cached data to disk
///
/// Each key maps to exactly one file in `cache_dir`. The file holds the bare
/// JSON payload and its modification time is set to `written_at + ttl`, so an
/// entry is fresh while `now <= mtime`. Expired entries are still returned by
/// `read` (with `is_expired = true`) to support graceful degradation.
#[derive(Debug, Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// Creates a new CacheManager over `cache_dir` using the given clock
    ///
    /// The directory is created lazily on the first write.
    pub fn new(cache_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { cache_dir, clock }
    }

    /// Creates a new CacheManager with a custom cache directory and wall-clock time
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self::new(cache_dir, Arc::new(SystemClock))
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &[&str]) -> PathBuf {
        self.cache_dir.join(file_name(key))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Writes data to the cache, fresh for `ttl` from now
    ///
    /// The payload is written to a temporary file next to the target, its mtime
    /// is set to the expiry instant and only then is it renamed over the entry.
    pub fn write<T: Serialize>(&self, key: &[&str], data: &T, ttl: Duration) -> io::Result<()> {
        self.ensure_dir()?;

        let expires_at = self.clock.now() + ttl;
        let json = serde_json::to_vec(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().set_modified(SystemTime::from(expires_at))?;
        tmp.persist(self.cache_path(key)).map_err(|e| e.error)?;

        debug!(key = %display_key(key), %expires_at, "stored cache entry");
        Ok(())
    }

    /// Reads data from the cache
    ///
    /// Returns `None` if the entry doesn't exist or cannot be parsed. An entry
    /// that cannot be parsed is logged and otherwise treated as a miss; the next
    /// successful write replaces it.
    pub fn read<T: DeserializeOwned>(&self, key: &[&str]) -> Option<CachedData<T>> {
        let path = self.cache_path(key);

        let expires_at = match modified_at(&path) {
            Ok(expires_at) => expires_at,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key = %display_key(key), error = %e, "cache entry is unreadable");
                return None;
            }
        };

        let data = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<T>(&content).map_err(|e| e.to_string()));

        match data {
            Ok(data) => Some(CachedData {
                data,
                expires_at,
                is_expired: self.clock.now() > expires_at,
            }),
            Err(e) => {
                warn!(key = %display_key(key), error = %e, "cache entry is corrupt, ignoring it");
                None
            }
        }
    }

    /// Returns the cached value for `key` or computes and stores it
    ///
    /// * `Auto` serves a fresh entry, otherwise runs `compute`. When `compute`
    ///   fails with a recoverable error and an expired entry exists, the expired
    ///   payload is returned instead of the error.
    /// * `Only` serves a fresh entry or fails with `CacheMiss`.
    /// * `Prevent` always runs `compute` and never falls back.
    ///
    /// A failure to store the computed value is logged and does not fail the call.
    pub async fn fetch_or_compute<T, E, F, Fut>(
        &self,
        key: &[&str],
        ttl: Duration,
        mode: CacheMode,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheMiss> + Recoverable + Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut stale = None;

        if mode != CacheMode::Prevent {
            if let Some(cached) = self.read::<T>(key) {
                if !cached.is_expired {
                    debug!(key = %display_key(key), "cache hit");
                    return Ok(cached.data);
                }
                stale = Some(cached);
            }

            if mode == CacheMode::Only {
                return Err(CacheMiss.into());
            }
        }

        match compute().await {
            Ok(data) => {
                if let Err(e) = self.write(key, &data, ttl) {
                    warn!(key = %display_key(key), error = %e, "failed to store cache entry");
                }
                Ok(data)
            }
            Err(err) => match stale {
                Some(cached) if err.is_recoverable() => {
                    warn!(
                        key = %display_key(key),
                        error = %err,
                        expired_at = %cached.expires_at,
                        "fetch failed, serving stale cache entry"
                    );
                    Ok(cached.data)
                }
                _ => Err(err),
            },
        }
    }

    /// Deletes the entry for `key`; a missing entry is not an error
    pub fn invalidate(&self, key: &[&str]) -> io::Result<()> {
        remove_if_present(&self.cache_path(key))
    }

    /// Deletes every entry that expired more than `keep` ago
    ///
    /// Returns the number of removed entries.
    pub fn purge_older_than(&self, keep: Duration) -> io::Result<usize> {
        let now = self.clock.now();
        self.remove_entries(|expires_at| now - expires_at > keep)
    }

    /// Deletes every entry regardless of age
    pub fn clear(&self) -> io::Result<usize> {
        self.remove_entries(|_| true)
    }

    fn remove_entries(&self, mut should_remove: impl FnMut(DateTime<Utc>) -> bool) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Ok(expires_at) = modified_at(&path) else {
                continue;
            };
            if should_remove(expires_at) {
                remove_if_present(&path)?;
                removed += 1;
            }
        }

        debug!(dir = %self.cache_dir.display(), removed, "removed cache entries");
        Ok(removed)
    }
}

/// Builds the entry file name for a key
///
/// Every segment is percent-encoded (including `.` and `/`) and the segments
/// are joined with `.`, so no segment can escape the cache directory or
/// collide with a differently split key.
fn file_name(key: &[&str]) -> String {
    let joined = key
        .iter()
        .map(|segment| urlencoding::encode(segment).replace('.', "%2E"))
        .collect::<Vec<_>>()
        .join(".");
    format!("{}.{}", joined, ENTRY_EXTENSION)
}

fn display_key(key: &[&str]) -> String {
    key.join("/")
}

fn modified_at(path: &Path) -> io::Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(fs::metadata(path)?.modified()?))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
