//! GoPlay catalog client
//!
//! Lists programs and episodes of the GoPlay channels and resolves playable
//! streams, keeping a session and a metadata cache in the profile directory.

use std::io;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Local, TimeZone, Utc};
use clap::Parser;
use thiserror::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use goplay::auth::{AuthError, CognitoIdp, CredentialStore, SessionManager};
use goplay::cache::{CacheManager, CacheMode};
use goplay::cli::{Cli, Command, MetadataAction};
use goplay::config::Settings;
use goplay::content::{ContentError, ContentFetcher, HttpFetcher};
use goplay::data::{Broadcast, CatalogItem, Program};
use goplay::metadata::Metadata;

/// Timeout for every HTTP request
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("File system error: {0}")]
    Io(#[from] io::Error),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.settings()?;

    if let Err(e) = run(cli.command, settings).await {
        eprintln!("{}", user_message(&e));
        process::exit(1);
    }

    Ok(())
}

async fn run(command: Command, settings: Settings) -> Result<(), RunError> {
    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let session = SessionManager::new(
        Arc::new(CognitoIdp::new(client.clone())),
        CredentialStore::new(settings.tokens_dir()),
        settings.username.clone(),
        settings.password.clone(),
    );
    if settings.credentials_changed()? {
        info!("credentials changed, clearing session");
        session.clear_session().await;
    }

    let content = ContentFetcher::new(
        Arc::new(HttpFetcher::new(client.clone())),
        CacheManager::with_dir(settings.cache_dir()),
        Arc::new(session),
    )
    .with_client(client);

    match command {
        Command::Programs { channel, cache } => {
            let programs = content.get_programs(channel, cache.into()).await?;
            for program in programs {
                println!("{}", render(&CatalogItem::Program(program)));
            }
        }
        Command::Program { path, cache } => {
            let program = content.get_program(&path, cache.into()).await?;
            print_program(program);
        }
        Command::Episode { path, cache } => match content.get_episode(&path, cache.into()).await? {
            Some(episode) => {
                let description = episode.description.clone();
                println!("{}", render(&CatalogItem::Episode(episode)));
                if let Some(description) = description {
                    println!("\n{}", description);
                }
            }
            None => return Err(ContentError::Unavailable.into()),
        },
        Command::Stream { uuid } => {
            let stream = content.get_stream_for_id(&uuid).await?;
            println!("{}\t{}", stream.stream_type, stream.url);
            if let Some(license_url) = &stream.license_url {
                println!("license\t{}", license_url);
            }
        }
        Command::Search { query } => {
            let query = query.join(" ");
            let programs = content.search(&query).await?;
            if programs.is_empty() {
                println!("Nothing found for '{}'", query);
            }
            for program in programs {
                println!("{}", render(&CatalogItem::Program(program)));
            }
        }
        Command::Epg { channel, date, cache } => {
            let date = date.resolve(Local::now().date_naive());
            for broadcast in content.get_epg(channel, date, cache.into()).await? {
                let start = broadcast.start.with_timezone(&Local).format("%H:%M");
                match &broadcast.video_path {
                    Some(path) => println!("{}\t{}\t{}", start, broadcast_title(&broadcast), path),
                    None => println!("{}\t{}", start, broadcast_title(&broadcast)),
                }
            }
        }
        Command::Broadcast { channel, at } => match content.get_broadcast(channel, at, CacheMode::Auto).await? {
            Some(broadcast) => print_broadcast(&broadcast, at.offset()),
            None => println!("No broadcast on {} at {}", channel.name(), at.format("%Y-%m-%d %H:%M")),
        },
        Command::MyList => {
            for entry in content.get_my_list().await? {
                let added = Utc
                    .timestamp_millis_opt(entry.timestamp)
                    .single()
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}\t{}", entry.id, added);
            }
        }
        Command::Logout => {
            content.session().clear_session().await;
            println!("Logged out");
        }
        Command::Metadata { action } => {
            let metadata = Metadata::new(&content);
            match action {
                MetadataAction::Update { refresh } => {
                    let summary = metadata
                        .update(refresh, |done, total| eprint!("\rUpdating metadata ({}/{})...", done, total))
                        .await?;
                    eprintln!();
                    if summary.failed > 0 {
                        warn!(failed = summary.failed, "some programs could not be updated");
                    }
                    println!("Updated {} programs ({} failed)", summary.programs, summary.failed);
                }
                MetadataAction::Purge { keep_days } => {
                    let removed = metadata.purge_older_than(chrono::Duration::days(i64::from(keep_days)))?;
                    println!("Removed {} expired entries", removed);
                }
                MetadataAction::Clean => {
                    let removed = metadata.clean()?;
                    println!("Local metadata is cleared ({} entries)", removed);
                }
            }
        }
    }

    Ok(())
}

fn print_program(program: Program) {
    println!("{}", program.title);
    if let Some(description) = &program.description {
        println!("{}", description);
    }
    for season in &program.seasons {
        println!("season\t{}\t{}", season.path, season.title);
    }

    let items = program
        .episodes
        .into_iter()
        .map(CatalogItem::Episode)
        .chain(program.clips.into_iter().map(CatalogItem::Clip));
    for item in items {
        println!("{}", render(&item));
    }
}

fn broadcast_title(broadcast: &Broadcast) -> String {
    match &broadcast.episode_title {
        Some(episode) if episode != &broadcast.program_title => format!("{} - {}", broadcast.program_title, episode),
        _ => broadcast.program_title.clone(),
    }
}

fn print_broadcast(broadcast: &Broadcast, offset: &FixedOffset) {
    let start = broadcast.start.with_timezone(offset);
    match broadcast.end() {
        Some(end) => println!(
            "{}\t{} - {}",
            broadcast.channel.name(),
            start.format("%H:%M"),
            end.with_timezone(offset).format("%H:%M")
        ),
        None => println!("{}\t{}", broadcast.channel.name(), start.format("%H:%M")),
    }
    println!("{}", broadcast_title(broadcast));
    if let (Some(season), Some(number)) = (broadcast.season, broadcast.number) {
        println!("S{:02}E{:02}", season, number);
    }
    if let Some(description) = broadcast.description.as_ref().or(broadcast.program_description.as_ref()) {
        println!("\n{}", description);
    }
    if let Some(path) = &broadcast.video_path {
        println!("video\t{}", path);
    }
}

/// One line of a listing
fn render(item: &CatalogItem) -> String {
    match item {
        CatalogItem::Program(program) => format!("{}\t{}", program.path, program.title),
        CatalogItem::Episode(episode) => format!(
            "S{:02}E{:02}\t{}\t{}\t{}",
            episode.season.unwrap_or(0),
            episode.number,
            episode.uuid,
            episode.path,
            episode.title
        ),
        CatalogItem::Clip(clip) => format!("clip\t{}\t{}\t{}", clip.uuid, clip.path, clip.title),
    }
}

fn user_message(error: &RunError) -> String {
    match error {
        RunError::Content(ContentError::Auth(e)) if e.needs_user_action() => format!(
            "{}\nTo watch a video, enter your GoPlay credentials with --username and --password \
             (or GOPLAY_USERNAME and GOPLAY_PASSWORD).",
            e
        ),
        RunError::Content(ContentError::Auth(e @ AuthError::AuthenticationUnavailable(_))) => {
            format!("Logging in is temporarily unavailable, try again later. ({})", e)
        }
        RunError::Content(ContentError::FetchFailed { .. }) | RunError::Http(_) => {
            format!("GoPlay is temporarily unavailable, try again later. ({})", error)
        }
        RunError::Content(ContentError::NotCached) => {
            "This is not in the local cache yet; run the command without --cache only.".to_string()
        }
        other => other.to_string(),
    }
}
