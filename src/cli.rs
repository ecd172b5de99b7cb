//! Command-line interface parsing for the GoPlay client
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the `Settings` and cache modes used by the rest of the crate.

use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::cache::CacheMode;
use crate::config::Settings;
use crate::data::Channel;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// No profile directory was given and none could be derived
    #[error("Could not determine a profile directory; pass --profile-dir or set GOPLAY_PROFILE_DIR")]
    NoProfileDir,
}

/// GoPlay catalog client - browse programs and resolve streams
#[derive(Parser, Debug)]
#[command(name = "goplay")]
#[command(about = "Browse the GoPlay catalog and resolve playable streams")]
#[command(version)]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// GoPlay account username (e-mail address)
    #[arg(long, env = "GOPLAY_USERNAME", default_value = "", hide_default_value = true, global = true)]
    pub username: String,

    /// GoPlay account password
    #[arg(
        long,
        env = "GOPLAY_PASSWORD",
        default_value = "",
        hide_default_value = true,
        hide_env_values = true,
        global = true
    )]
    pub password: String,

    /// Directory for the session and the metadata cache
    #[arg(long, env = "GOPLAY_PROFILE_DIR", value_name = "DIR", global = true)]
    pub profile_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the programs of a channel (play4, play5, play6, goplay)
    Programs {
        channel: Channel,
        #[arg(long, value_enum, default_value_t = CacheArg::Auto)]
        cache: CacheArg,
    },
    /// Show a program with its seasons, episodes and clips
    Program {
        /// Program path, e.g. "de-slimste-mens"
        path: String,
        #[arg(long, value_enum, default_value_t = CacheArg::Auto)]
        cache: CacheArg,
    },
    /// Show the episode on an episode page
    Episode {
        /// Episode page path, e.g. "video/de-slimste-mens/seizoen-1/aflevering-1"
        path: String,
        #[arg(long, value_enum, default_value_t = CacheArg::Auto)]
        cache: CacheArg,
    },
    /// Resolve the playable stream of a video
    Stream {
        /// Video identifier
        uuid: String,
    },
    /// Search programs on all channels
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Show the TV guide of a channel (play4, play5, play6)
    Epg {
        channel: Channel,
        /// today, yesterday, tomorrow or a date like 2025-03-01
        #[arg(long, default_value = "today")]
        date: GuideDay,
        #[arg(long, value_enum, default_value_t = CacheArg::Auto)]
        cache: CacheArg,
    },
    /// Show what a channel broadcasts at a given time
    Broadcast {
        channel: Channel,
        /// RFC 3339 time, e.g. 2025-03-01T20:30:00+01:00
        at: DateTime<FixedOffset>,
    },
    /// Show the programs on your "My List"
    MyList,
    /// Forget the stored session
    Logout,
    /// Maintain the local metadata cache
    Metadata {
        #[command(subcommand)]
        action: MetadataAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum MetadataAction {
    /// Fetch all listings and program details
    Update {
        /// Refetch program details even when they are still fresh
        #[arg(long)]
        refresh: bool,
    },
    /// Remove entries that expired a while ago
    Purge {
        #[arg(long, value_name = "N", default_value_t = 30)]
        keep_days: u32,
    },
    /// Remove all cached metadata
    Clean,
}

/// How a command may use the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheArg {
    /// Use fresh entries, fetch otherwise, fall back to stale entries on failure
    Auto,
    /// Never fetch
    Only,
    /// Always fetch
    Prevent,
}

impl From<CacheArg> for CacheMode {
    fn from(arg: CacheArg) -> Self {
        match arg {
            CacheArg::Auto => CacheMode::Auto,
            CacheArg::Only => CacheMode::Only,
            CacheArg::Prevent => CacheMode::Prevent,
        }
    }
}

/// Day of the TV guide to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideDay {
    Today,
    Yesterday,
    Tomorrow,
    Date(NaiveDate),
}

impl GuideDay {
    /// The calendar date this day stands for, relative to `today`
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            GuideDay::Today => today,
            GuideDay::Yesterday => today.checked_sub_days(Days::new(1)).unwrap_or(today),
            GuideDay::Tomorrow => today.checked_add_days(Days::new(1)).unwrap_or(today),
            GuideDay::Date(date) => date,
        }
    }
}

impl FromStr for GuideDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "today" => Ok(GuideDay::Today),
            "yesterday" => Ok(GuideDay::Yesterday),
            "tomorrow" => Ok(GuideDay::Tomorrow),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(GuideDay::Date)
                .map_err(|_| format!("'{}' is not today, yesterday, tomorrow or a YYYY-MM-DD date", s)),
        }
    }
}

impl Cli {
    /// Builds the settings for this run
    ///
    /// # Returns
    /// * `Ok(Settings)` using `--profile-dir` or the platform data directory
    /// * `Err(CliError::NoProfileDir)` if neither is available
    pub fn settings(&self) -> Result<Settings, CliError> {
        let profile_dir = match &self.profile_dir {
            Some(dir) => dir.clone(),
            None => Settings::default_profile_dir().ok_or(CliError::NoProfileDir)?,
        };
        Ok(Settings::new(profile_dir, self.username.clone(), self.password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_programs() {
        let cli = Cli::parse_from(["goplay", "programs", "vier"]);
        match cli.command {
            Command::Programs { channel, cache } => {
                assert_eq!(channel, Channel::Play4);
                assert_eq!(cache, CacheArg::Auto);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_cache_mode() {
        let cli = Cli::parse_from(["goplay", "program", "thuis", "--cache", "only"]);
        match cli.command {
            Command::Program { path, cache } => {
                assert_eq!(path, "thuis");
                assert_eq!(CacheMode::from(cache), CacheMode::Only);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_channel() {
        assert!(Cli::try_parse_from(["goplay", "programs", "play7"]).is_err());
    }

    #[test]
    fn test_cli_metadata_purge_default() {
        let cli = Cli::parse_from(["goplay", "metadata", "purge"]);
        assert!(matches!(
            cli.command,
            Command::Metadata {
                action: MetadataAction::Purge { keep_days: 30 }
            }
        ));
    }

    #[test]
    fn test_settings_from_profile_dir() {
        let cli = Cli::parse_from([
            "goplay",
            "--profile-dir",
            "/tmp/goplay-profile",
            "--username",
            "user",
            "logout",
        ]);

        let settings = cli.settings().unwrap();

        assert_eq!(settings.profile_dir(), std::path::Path::new("/tmp/goplay-profile"));
        assert_eq!(settings.username, "user");
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/goplay-profile/cache"));
    }

    #[test]
    fn test_cli_parse_search_words() {
        let cli = Cli::parse_from(["goplay", "search", "de", "mol"]);
        match cli.command {
            Command::Search { query } => assert_eq!(query, vec!["de", "mol"]),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["goplay", "search"]).is_err());
    }

    #[test]
    fn test_cli_parse_epg() {
        let cli = Cli::parse_from(["goplay", "epg", "vijf"]);
        match cli.command {
            Command::Epg { channel, date, cache } => {
                assert_eq!(channel, Channel::Play5);
                assert_eq!(date, GuideDay::Today);
                assert_eq!(cache, CacheArg::Auto);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["goplay", "epg", "play4", "--date", "2025-03-01", "--cache", "only"]);
        match cli.command {
            Command::Epg { date, cache, .. } => {
                assert_eq!(date, GuideDay::Date(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
                assert_eq!(cache, CacheArg::Only);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["goplay", "epg", "play4", "--date", "next week"]).is_err());
    }

    #[test]
    fn test_cli_parse_broadcast_time() {
        let cli = Cli::parse_from(["goplay", "broadcast", "play6", "2025-03-01T20:30:00+01:00"]);
        match cli.command {
            Command::Broadcast { channel, at } => {
                assert_eq!(channel, Channel::Play6);
                assert_eq!(at.offset().local_minus_utc(), 3600);
                assert_eq!(at.to_rfc3339(), "2025-03-01T20:30:00+01:00");
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["goplay", "broadcast", "play6", "tonight"]).is_err());
    }

    #[test]
    fn test_guide_day_resolve() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(GuideDay::Today.resolve(today), today);
        assert_eq!(GuideDay::Yesterday.resolve(today), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(GuideDay::Tomorrow.resolve(today), NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!("Tomorrow".parse::<GuideDay>(), Ok(GuideDay::Tomorrow));
        assert!("2025-02-30".parse::<GuideDay>().is_err());
    }

    #[test]
    fn test_cache_arg_conversion() {
        assert_eq!(CacheMode::from(CacheArg::Auto), CacheMode::Auto);
        assert_eq!(CacheMode::from(CacheArg::Prevent), CacheMode::Prevent);
    }
}
