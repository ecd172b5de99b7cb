use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

use super::{ContentError, PageFetcher};
use crate::auth::SessionManager;
use crate::cache::{CacheManager, CacheMode};
use crate::data::{
    extract, parse, Broadcast, Channel, Episode, MyListEntry, PayloadError, Program, ResolvedStream, CHANNELS,
};
use crate::sync::{RequestSigner, SyncClient, SyncError};

/// GoPlay website
pub const SITE_URL: &str = "https://www.goplay.be";

/// GoPlay API
pub const API_URL: &str = "https://api.goplay.be";

/// How long a channel listing stays fresh
pub const LISTING_TTL_SECS: i64 = 5 * 60;

/// How long program and episode details stay fresh
pub const DETAIL_TTL_DAYS: i64 = 30;

/// How long a day of the TV guide stays fresh
pub const GUIDE_TTL_SECS: i64 = 15 * 60;

const MY_LIST_DATASET: &str = "myList";

/// Produces catalog records, going through the cache for everything but streams
pub struct ContentFetcher {
    pages: Arc<dyn PageFetcher>,
    cache: CacheManager,
    session: Arc<SessionManager>,
    client: Client,
    signer: RequestSigner,
    sync_endpoint: Option<Url>,
}

impl ContentFetcher {
    pub fn new(pages: Arc<dyn PageFetcher>, cache: CacheManager, session: Arc<SessionManager>) -> Self {
        Self {
            pages,
            cache,
            session,
            client: Client::new(),
            signer: RequestSigner::default(),
            sync_endpoint: None,
        }
    }

    /// Uses `client` for the signed sync requests
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Sends sync requests to `endpoint` instead of the regional sync service
    pub fn with_sync_endpoint(mut self, endpoint: Url) -> Self {
        self.sync_endpoint = Some(endpoint);
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Lists the programs of a channel
    pub async fn get_programs(&self, channel: Channel, mode: CacheMode) -> Result<Vec<Program>, ContentError> {
        let url = format!("{}/{}", SITE_URL, channel.overview_path());
        let url = &url;

        let listing: Value = self
            .cache
            .fetch_or_compute(
                &["programs", channel.slug()],
                Duration::seconds(LISTING_TTL_SECS),
                mode,
                move || async move {
                    let page = self.pages.get(url, &[], None).await?;
                    let links = extract::program_links(&page).map_err(|e| malformed(url, e))?;
                    let listing =
                        serde_json::to_value(links).map_err(|e| malformed(url, PayloadError(e.to_string())))?;
                    parse::programs(channel, &listing).map_err(|e| malformed(url, e))?;
                    Ok::<_, ContentError>(listing)
                },
            )
            .await?;

        Ok(parse::programs(channel, &listing)?)
    }

    /// Loads a program with its seasons, episodes and clips
    pub async fn get_program(&self, path: &str, mode: CacheMode) -> Result<Program, ContentError> {
        let path = path.trim_start_matches('/');
        let url = format!("{}/{}", SITE_URL, path);
        let url = &url;

        let data: Value = self
            .cache
            .fetch_or_compute(
                &["program", path],
                Duration::days(DETAIL_TTL_DAYS),
                mode,
                move || async move {
                    let page = self.pages.get(url, &[], None).await?;
                    let data = extract::hero_data(&page).map_err(|e| malformed(url, e))?;
                    parse::program(&data).map_err(|e| malformed(url, e))?;
                    Ok::<_, ContentError>(data)
                },
            )
            .await?;

        Ok(parse::program(&data)?)
    }

    /// Loads the episode shown on an episode page
    ///
    /// Returns `None` when the page does not belong to one of the program's
    /// numbered episodes.
    pub async fn get_episode(&self, path: &str, mode: CacheMode) -> Result<Option<Episode>, ContentError> {
        let path = path.trim_start_matches('/');
        let url = format!("{}/{}", SITE_URL, path);
        let url = &url;

        let payload: Value = self
            .cache
            .fetch_or_compute(
                &["episode", path],
                Duration::days(DETAIL_TTL_DAYS),
                mode,
                move || async move {
                    let page = self.pages.get(url, &[], None).await?;
                    let data = extract::hero_data(&page).map_err(|e| malformed(url, e))?;
                    let node_id = extract::page_node_id(&page).map_err(|e| malformed(url, e))?;
                    let payload = parse::episode_payload(data, &node_id);
                    parse::episode(&payload).map_err(|e| malformed(url, e))?;
                    Ok::<_, ContentError>(payload)
                },
            )
            .await?;

        Ok(parse::episode(&payload)?)
    }

    /// Resolves the playable stream of a video
    ///
    /// Streams are never cached and always need a valid session.
    pub async fn get_stream_for_id(&self, uuid: &str) -> Result<ResolvedStream, ContentError> {
        let token = self.session.get_token().await?;
        let url = format!("{}/web/v1/videos/long-form/{}", API_URL, uuid);
        let authorization = format!("Bearer {}", token);

        let body = match self.pages.get(&url, &[], Some(&authorization)).await {
            Ok(body) => body,
            Err(e) => {
                return Err(match e.status() {
                    Some(451) => ContentError::Geoblocked,
                    Some(404) => ContentError::Unavailable,
                    _ => e,
                })
            }
        };

        let data: Value = serde_json::from_str(&body).map_err(|e| malformed(&url, PayloadError(e.to_string())))?;
        let stream = parse::resolved_stream(uuid, &data).map_err(|e| malformed(&url, e))?;
        info!(uuid, stream_type = %stream.stream_type, "resolved stream");

        Ok(stream)
    }

    /// Searches programs on all channels
    ///
    /// Results are never cached. A blank query gives no results without a request.
    pub async fn search(&self, query: &str) -> Result<Vec<Program>, ContentError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/search", API_URL);
        let sites: Vec<&str> = CHANNELS.iter().map(|channel| channel.guide_id().unwrap_or(channel.slug())).collect();
        let body = json!({
            "query": query,
            "sites": sites,
            "page": 0,
            "mode": "byDate",
        });

        let response = self.pages.post_json(&url, &body).await?;
        let data: Value =
            serde_json::from_str(&response).map_err(|e| malformed(&url, PayloadError(e.to_string())))?;
        let programs = parse::search_results(&data).map_err(|e| malformed(&url, e))?;
        debug!(query, results = programs.len(), "search done");

        Ok(programs)
    }

    /// Loads one day of a channel's TV guide
    pub async fn get_epg(
        &self,
        channel: Channel,
        date: NaiveDate,
        mode: CacheMode,
    ) -> Result<Vec<Broadcast>, ContentError> {
        let guide = channel.guide_id().ok_or(ContentError::NoGuide(channel))?;
        let day = date.format("%Y-%m-%d").to_string();
        let url = format!("{}/api/epg/{}/{}", SITE_URL, guide, day);
        let url = &url;

        let data: Value = self
            .cache
            .fetch_or_compute(
                &["epg", channel.slug(), &day],
                Duration::seconds(GUIDE_TTL_SECS),
                mode,
                move || async move {
                    let body = self.pages.get(url, &[], None).await?;
                    let data: Value =
                        serde_json::from_str(&body).map_err(|e| malformed(url, PayloadError(e.to_string())))?;
                    parse::broadcasts(channel, &data).map_err(|e| malformed(url, e))?;
                    Ok::<_, ContentError>(data)
                },
            )
            .await?;

        Ok(parse::broadcasts(channel, &data)?)
    }

    /// Finds what a channel broadcasts at `at`
    ///
    /// The guide of the local day of `at` is consulted.
    pub async fn get_broadcast(
        &self,
        channel: Channel,
        at: DateTime<FixedOffset>,
        mode: CacheMode,
    ) -> Result<Option<Broadcast>, ContentError> {
        let broadcasts = self.get_epg(channel, at.date_naive(), mode).await?;
        let at = at.with_timezone(&Utc);

        Ok(broadcasts.into_iter().find(|broadcast| broadcast.covers(at)))
    }

    /// Reads the user's "My List" from the sync service
    pub async fn get_my_list(&self) -> Result<Vec<MyListEntry>, ContentError> {
        let identity = self.session.federated_identity().await?;
        let mut sync = SyncClient::new(self.client.clone(), self.signer.clone(), identity);
        if let Some(endpoint) = &self.sync_endpoint {
            sync = sync.with_endpoint(endpoint.clone());
        }

        let value = match sync.list_records(MY_LIST_DATASET).await {
            Ok(value) => value,
            Err(SyncError::MissingDataset(_)) => {
                debug!("no my list dataset yet");
                Value::Null
            }
            Err(e) => return Err(e.into()),
        };

        Ok(parse::my_list(&value)?)
    }
}

fn malformed(url: &str, e: PayloadError) -> ContentError {
    error!(url, error = %e, "unexpected payload");
    ContentError::MalformedPayload(e)
}
