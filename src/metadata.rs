//! Maintenance of the locally cached catalog metadata

use chrono::Duration;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::io;
use tracing::{info, warn};

use crate::cache::CacheMode;
use crate::content::{ContentError, ContentFetcher};
use crate::data::CHANNELS;

/// Entries expired for longer than this are removed by `purge_expired`
pub const PURGE_AFTER_DAYS: i64 = 30;

/// Program pages fetched in parallel during an update
const CONCURRENT_FETCHES: usize = 4;

/// Outcome of a metadata update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Programs found in the channel listings
    pub programs: usize,
    /// Programs whose details could not be fetched
    pub failed: usize,
}

/// Bulk operations on the metadata cache of a `ContentFetcher`
pub struct Metadata<'a> {
    content: &'a ContentFetcher,
}

impl<'a> Metadata<'a> {
    pub fn new(content: &'a ContentFetcher) -> Self {
        Self { content }
    }

    /// Fetches every channel listing and the details of every listed program
    ///
    /// Listings are always refetched. Program details are only refetched when
    /// stale, or always when `refresh` is set. A failing program is logged and
    /// skipped; a failing listing aborts the update. `progress` is called with
    /// `(done, total)` after each program.
    pub async fn update(
        &self,
        refresh: bool,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<UpdateSummary, ContentError> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for channel in CHANNELS {
            for program in self.content.get_programs(channel, CacheMode::Prevent).await? {
                if seen.insert(program.path.clone()) {
                    paths.push(program.path);
                }
            }
        }

        let total = paths.len();
        let mode = if refresh { CacheMode::Prevent } else { CacheMode::Auto };
        let content = self.content;

        let mut results = stream::iter(paths)
            .map(move |path| async move {
                let result = content.get_program(&path, mode).await;
                (path, result)
            })
            .buffer_unordered(CONCURRENT_FETCHES);

        let mut done = 0;
        let mut failed = 0;
        while let Some((path, result)) = results.next().await {
            done += 1;
            if let Err(e) = result {
                failed += 1;
                warn!(%path, error = %e, "failed to update program");
            }
            progress(done, total);
        }

        info!(programs = total, failed, "metadata updated");
        Ok(UpdateSummary {
            programs: total,
            failed,
        })
    }

    /// Removes entries that expired more than `PURGE_AFTER_DAYS` ago
    pub fn purge_expired(&self) -> io::Result<usize> {
        self.purge_older_than(Duration::days(PURGE_AFTER_DAYS))
    }

    /// Removes entries that expired more than `keep` ago
    pub fn purge_older_than(&self, keep: Duration) -> io::Result<usize> {
        let removed = self.content.cache().purge_older_than(keep)?;
        info!(removed, "purged expired metadata");
        Ok(removed)
    }

    /// Removes all cached metadata
    pub fn clean(&self) -> io::Result<usize> {
        let removed = self.content.cache().clear()?;
        info!(removed, "cleared metadata");
        Ok(removed)
    }
}
