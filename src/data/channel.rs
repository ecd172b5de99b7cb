//! Channels of the GoPlay catalog
//!
//! Every channel shares the same website; each one has its own program
//! overview page.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A broadcaster channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Play4,
    Play5,
    Play6,
    GoPlay,
}

/// All channels, in menu order
pub static CHANNELS: [Channel; 4] = [Channel::Play4, Channel::Play5, Channel::Play6, Channel::GoPlay];

/// Returned when a channel slug is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown channel '{0}'")]
pub struct UnknownChannel(pub String);

impl Channel {
    /// Slug used in cache keys and on the command line
    pub fn slug(&self) -> &'static str {
        match self {
            Channel::Play4 => "play4",
            Channel::Play5 => "play5",
            Channel::Play6 => "play6",
            Channel::GoPlay => "goplay",
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Play4 => "Play 4",
            Channel::Play5 => "Play 5",
            Channel::Play6 => "Play 6",
            Channel::GoPlay => "Go Play",
        }
    }

    /// Path of the program overview page, relative to the site root
    pub fn overview_path(&self) -> &'static str {
        match self {
            Channel::Play4 => "programmas/play-4",
            Channel::Play5 => "programmas/play-5",
            Channel::Play6 => "programmas/play-6",
            Channel::GoPlay => "programmas/goplay",
        }
    }

    /// Id of the channel's TV guide, `None` for the online-only channel
    pub fn guide_id(&self) -> Option<&'static str> {
        match self {
            Channel::Play4 => Some("vier"),
            Channel::Play5 => Some("vijf"),
            Channel::Play6 => Some("zes"),
            Channel::GoPlay => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    /// Accepts the slugs as well as the legacy `vier`, `vijf` and `zes` ids
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "play4" | "vier" => Ok(Channel::Play4),
            "play5" | "vijf" => Ok(Channel::Play5),
            "play6" | "zes" => Ok(Channel::Play6),
            "goplay" => Ok(Channel::GoPlay),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}
