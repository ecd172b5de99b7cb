//! Catalog data models
//!
//! This module contains the record types produced by the content fetcher:
//! programs, their seasons, episodes and clips, resolved streams, TV guide
//! broadcasts and "My List" entries.

pub mod channel;
pub mod extract;
pub mod parse;

pub use channel::{Channel, UnknownChannel, CHANNELS};
pub use parse::PayloadError;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A program (show) in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Unique identifier, only known once the program page was loaded
    pub uuid: Option<String>,
    /// Site-relative path of the program page, without leading slash
    pub path: String,
    /// Site (channel) the program belongs to, as reported by the page
    pub channel: Option<String>,
    /// Human-readable title
    pub title: String,
    pub description: Option<String>,
    /// Poster image URL
    pub cover: Option<String>,
    /// Hero image URL
    pub background: Option<String>,
    pub seasons: Vec<Season>,
    pub episodes: Vec<Episode>,
    pub clips: Vec<Clip>,
}

/// A season (playlist) of a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub uuid: String,
    pub path: String,
    pub title: String,
    /// Season number, taken from the first episode of the playlist
    pub number: Option<u32>,
}

/// A numbered episode of a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Video identifier used to resolve the stream
    pub uuid: String,
    /// Identifier of the episode page
    pub node_id: String,
    pub path: String,
    pub title: String,
    pub description: Option<String>,
    pub cover: Option<String>,
    /// Duration in seconds
    pub duration: Option<u64>,
    pub season: Option<u32>,
    pub number: u32,
}

/// A video of a program that is not a numbered episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    pub uuid: String,
    pub node_id: String,
    pub path: String,
    pub title: String,
    pub description: Option<String>,
    pub cover: Option<String>,
    /// Duration in seconds
    pub duration: Option<u64>,
}

/// Any record that can appear in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogItem {
    Program(Program),
    Episode(Episode),
    Clip(Clip),
}

impl CatalogItem {
    pub fn title(&self) -> &str {
        match self {
            CatalogItem::Program(program) => &program.title,
            CatalogItem::Episode(episode) => &episode.title,
            CatalogItem::Clip(clip) => &clip.title,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            CatalogItem::Program(program) => &program.path,
            CatalogItem::Episode(episode) => &episode.path,
            CatalogItem::Clip(clip) => &clip.path,
        }
    }
}

/// Streaming protocol of a resolved stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Hls,
    Dash,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Hls => write!(f, "hls"),
            StreamType::Dash => write!(f, "dash"),
        }
    }
}

/// A playable stream for a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Video identifier the stream was resolved for
    pub uuid: String,
    /// Manifest URL
    pub url: String,
    pub stream_type: StreamType,
    /// Widevine license server, for DRM protected streams
    pub license_url: Option<String>,
    /// DRM token to send to the license server
    pub auth: Option<String>,
}

/// A broadcast in the TV guide of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub channel: Channel,
    pub program_title: String,
    pub episode_title: Option<String>,
    /// Title in the original language
    pub original_title: Option<String>,
    pub season: Option<u32>,
    pub number: Option<u32>,
    pub genre: Option<String>,
    pub start: DateTime<Utc>,
    /// Duration in seconds
    pub duration: Option<u32>,
    pub won_id: Option<String>,
    pub won_program_id: Option<String>,
    pub program_description: Option<String>,
    pub description: Option<String>,
    /// Path of the program page, when the program is in the catalog
    pub program_path: Option<String>,
    /// Path of the episode page, only set when it holds this very broadcast
    pub video_path: Option<String>,
    pub cover: Option<String>,
}

impl Broadcast {
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.duration.map(|secs| self.start + Duration::seconds(i64::from(secs)))
    }

    /// Whether the broadcast is on the air at `at`
    ///
    /// A broadcast without a duration is never considered on the air.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        match self.end() {
            Some(end) => self.start <= at && at < end,
            None => false,
        }
    }
}

/// An entry of the user's "My List" dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyListEntry {
    /// Program identifier
    pub id: String,
    /// When the entry was added, in epoch milliseconds
    pub timestamp: i64,
}
