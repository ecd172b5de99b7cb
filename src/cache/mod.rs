//! Cache module for storing catalog payloads on disk
//!
//! This module provides a cache manager that persists fetched payloads to the
//! filesystem with a per-entry TTL. It supports graceful degradation by serving
//! expired entries when a refetch fails, so the catalog stays browsable while
//! the site is down.

mod manager;

pub use manager::{CacheManager, CacheMiss, CacheMode, CachedData, Recoverable};
