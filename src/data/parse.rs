//! Parsers from raw JSON payloads to catalog records
//!
//! These are the only place where payload fields are interpreted. The content
//! fetcher runs them on freshly fetched payloads before caching them and on
//! every payload it returns, cached or not.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use super::{
    Broadcast, CatalogItem, Channel, Clip, Episode, MyListEntry, Program, ResolvedStream, Season, StreamType,
};

/// Widevine license server for DRM protected streams
pub const WIDEVINE_LICENSE_URL: &str = "https://wv-keyos.licensekeyserver.com/";

/// A payload that does not have the expected shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PayloadError(pub String);

impl PayloadError {
    fn missing(field: &str) -> Self {
        PayloadError(format!("missing field '{}'", field))
    }
}

/// Parses a channel listing: an array of `{path, title}` objects
pub fn programs(channel: Channel, listing: &Value) -> Result<Vec<Program>, PayloadError> {
    let entries = listing
        .as_array()
        .ok_or_else(|| PayloadError("program listing is not an array".to_string()))?;

    entries
        .iter()
        .map(|entry| {
            Ok(Program {
                uuid: None,
                path: site_path(&required_str(entry, "path")?),
                channel: Some(channel.slug().to_string()),
                title: required_str(entry, "title")?,
                description: None,
                cover: None,
                background: None,
                seasons: Vec::new(),
                episodes: Vec::new(),
                clips: Vec::new(),
            })
        })
        .collect()
}

/// Parses the data embedded in a program page
pub fn program(data: &Value) -> Result<Program, PayloadError> {
    let mut seasons = Vec::new();
    let mut episodes = Vec::new();
    let mut clips = Vec::new();

    for playlist in array(data, "playlists") {
        let videos = array(playlist, "episodes");

        seasons.push(Season {
            uuid: required_id(playlist, "id")?,
            path: site_path(&required_str(playlist, "link")?),
            title: required_str(playlist, "title")?,
            number: videos.first().and_then(|first| number(first.get("seasonNumber"))),
        });

        for value in videos {
            match video(value)? {
                CatalogItem::Episode(episode) => episodes.push(episode),
                CatalogItem::Clip(clip) => clips.push(clip),
                CatalogItem::Program(_) => {}
            }
        }
    }

    Ok(Program {
        uuid: optional_id(data.get("id")),
        path: site_path(&required_str(data, "link")?),
        channel: optional_str(data.pointer("/pageInfo/site")),
        title: required_str(data, "title")?,
        description: optional_str(data.get("description")),
        cover: optional_str(data.pointer("/images/poster")),
        background: optional_str(data.pointer("/images/hero")),
        seasons,
        episodes,
        clips,
    })
}

/// Parses one video of a playlist
///
/// Videos with an episode number are episodes, all others are clips.
pub fn video(value: &Value) -> Result<CatalogItem, PayloadError> {
    let uuid = required_id(value, "videoUuid")?;
    let node_id = value
        .pointer("/pageInfo/nodeId")
        .and_then(id_string)
        .ok_or_else(|| PayloadError::missing("pageInfo.nodeId"))?;
    let path = site_path(&required_str(value, "link")?);
    let title = required_str(value, "title")?;
    let description =
        optional_str(value.pointer("/pageInfo/description")).or_else(|| optional_str(value.get("description")));
    let cover = optional_str(value.get("image"));
    let duration = number(value.get("duration")).map(u64::from);

    Ok(match number(value.get("episodeNumber")) {
        Some(number_in_season) => CatalogItem::Episode(Episode {
            uuid,
            node_id,
            path,
            title,
            description,
            cover,
            duration,
            season: number(value.get("seasonNumber")),
            number: number_in_season,
        }),
        None => CatalogItem::Clip(Clip {
            uuid,
            node_id,
            path,
            title,
            description,
            cover,
            duration,
        }),
    })
}

/// Builds the payload cached for an episode page
pub fn episode_payload(program_data: Value, node_id: &str) -> Value {
    json!({ "program": program_data, "nodeId": node_id })
}

/// Parses an episode page payload built by [`episode_payload`]
///
/// Returns `None` when the page's node is not one of the program's episodes.
pub fn episode(payload: &Value) -> Result<Option<Episode>, PayloadError> {
    let program = program(payload.get("program").ok_or_else(|| PayloadError::missing("program"))?)?;
    let node_id = payload
        .get("nodeId")
        .and_then(id_string)
        .ok_or_else(|| PayloadError::missing("nodeId"))?;

    Ok(program.episodes.into_iter().find(|episode| episode.node_id == node_id))
}

/// Parses the video API response into a playable stream
///
/// DASH with a DRM token is preferred, then HLS, then unprotected DASH.
/// Older responses only carry an HLS URL under `video.S`.
pub fn resolved_stream(uuid: &str, data: &Value) -> Result<ResolvedStream, PayloadError> {
    let dash = optional_str(data.pointer("/manifestUrls/dash"));
    let hls = optional_str(data.pointer("/manifestUrls/hls"));
    let drm = optional_str(data.get("drmXml"));

    let (url, stream_type, license_url, auth) = match (dash, hls, drm) {
        (Some(dash), _, Some(drm)) => (dash, StreamType::Dash, Some(WIDEVINE_LICENSE_URL.to_string()), Some(drm)),
        (_, Some(hls), _) => (hls, StreamType::Hls, None, None),
        (Some(dash), None, None) => (dash, StreamType::Dash, None, None),
        (None, None, _) => {
            let legacy = optional_str(data.pointer("/video/S"))
                .ok_or_else(|| PayloadError(format!("no manifest for video {}", uuid)))?;
            (legacy, StreamType::Hls, None, None)
        }
    };

    Ok(ResolvedStream {
        uuid: uuid.to_string(),
        url,
        stream_type,
        license_url,
        auth,
    })
}

/// Parses the decoded value of the `myList` dataset
pub fn my_list(value: &Value) -> Result<Vec<MyListEntry>, PayloadError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let entries = value
        .as_array()
        .ok_or_else(|| PayloadError("my list is not an array".to_string()))?;

    entries
        .iter()
        .map(|entry| {
            let timestamp = timestamp(entry.get("timestamp")).ok_or_else(|| PayloadError::missing("timestamp"))?;
            Ok(MyListEntry {
                id: required_id(entry, "id")?,
                timestamp,
            })
        })
        .collect()
}

/// Parses a search response, keeping the program hits
pub fn search_results(data: &Value) -> Result<Vec<Program>, PayloadError> {
    let hits = data
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| PayloadError::missing("hits.hits"))?;

    hits.iter()
        .filter_map(|hit| hit.get("_source"))
        .filter(|source| source.get("bundle").and_then(Value::as_str) == Some("program"))
        .map(|source| {
            Ok(Program {
                uuid: None,
                path: required_str(source, "url")?.trim_matches('/').to_string(),
                channel: optional_str(source.get("site")),
                title: required_str(source, "title")?,
                description: optional_str(source.get("intro")),
                cover: optional_str(source.get("img")),
                background: None,
                seasons: Vec::new(),
                episodes: Vec::new(),
                clips: Vec::new(),
            })
        })
        .collect()
}

/// Parses one day of a channel's TV guide
pub fn broadcasts(channel: Channel, data: &Value) -> Result<Vec<Broadcast>, PayloadError> {
    let entries = data
        .as_array()
        .ok_or_else(|| PayloadError("guide is not an array".to_string()))?;

    entries.iter().map(|entry| broadcast(channel, entry)).collect()
}

fn broadcast(channel: Channel, entry: &Value) -> Result<Broadcast, PayloadError> {
    let start = timestamp(entry.get("timestamp"))
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| PayloadError::missing("timestamp"))?;

    // The linked video is only this broadcast when it is the latest one
    let video = entry.get("video_node").filter(|video| video.get("latest_video").is_some_and(truthy));

    Ok(Broadcast {
        channel,
        program_title: required_str(entry, "program_title")?,
        episode_title: optional_str(entry.get("episode_title")),
        original_title: optional_str(entry.get("original_title")),
        season: number(entry.get("season")),
        number: number(entry.get("episode_nr")),
        genre: optional_str(entry.get("genre")),
        start,
        duration: number(entry.get("duration")),
        won_id: optional_id(entry.get("won_id")),
        won_program_id: optional_id(entry.get("won_program_id")),
        program_description: optional_str(entry.get("program_concept")),
        description: optional_str(entry.get("content_episode")),
        program_path: optional_path(entry.pointer("/program_node/url")),
        video_path: video.and_then(|video| optional_path(video.get("url"))),
        cover: video.and_then(|video| optional_str(video.get("image"))),
    })
}

fn site_path(link: &str) -> String {
    link.trim_start_matches('/').to_string()
}

fn optional_path(value: Option<&Value>) -> Option<String> {
    optional_str(value).map(|link| site_path(&link)).filter(|path| !path.is_empty())
}

fn array<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value.get(field).and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default()
}

fn required_str(value: &Value, field: &str) -> Result<String, PayloadError> {
    optional_str(value.get(field)).ok_or_else(|| PayloadError::missing(field))
}

fn optional_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn required_id(value: &Value, field: &str) -> Result<String, PayloadError> {
    optional_id(value.get(field)).ok_or_else(|| PayloadError::missing(field))
}

fn optional_id(value: Option<&Value>) -> Option<String> {
    value.and_then(id_string)
}

/// Ids show up both as strings and as numbers
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch timestamps show up both as numbers and as strings
fn timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_data() -> Value {
        json!({
            "id": "prog-1",
            "link": "/de-slimste-mens",
            "title": "De Slimste Mens",
            "description": "Quiz",
            "pageInfo": { "site": "vier" },
            "images": { "poster": "https://img/poster.jpg", "hero": "https://img/hero.jpg" },
            "playlists": [
                {
                    "id": "season-1",
                    "link": "/de-slimste-mens/seizoen-1",
                    "title": "Seizoen 1",
                    "episodes": [
                        {
                            "videoUuid": "vid-1",
                            "pageInfo": { "nodeId": 1001, "description": "First" },
                            "link": "/video/de-slimste-mens/s1/aflevering-1",
                            "title": "Aflevering 1",
                            "image": "https://img/ep1.jpg",
                            "duration": 2700,
                            "seasonNumber": 1,
                            "episodeNumber": 1
                        },
                        {
                            "videoUuid": "vid-2",
                            "pageInfo": { "nodeId": "1002" },
                            "link": "/video/de-slimste-mens/s1/aflevering-2",
                            "title": "Aflevering 2",
                            "duration": 2650.5,
                            "seasonNumber": "1",
                            "episodeNumber": "2"
                        }
                    ]
                },
                {
                    "id": "extras",
                    "link": "/de-slimste-mens/extra",
                    "title": "Extra",
                    "episodes": [
                        {
                            "videoUuid": "clip-1",
                            "pageInfo": { "nodeId": 2001 },
                            "link": "/video/de-slimste-mens/extra/bloopers",
                            "title": "Bloopers",
                            "episodeNumber": null
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_programs_listing() {
        let listing = json!([
            { "path": "/de-slimste-mens", "title": "De Slimste Mens" },
            { "path": "/thuis", "title": "Thuis" }
        ]);

        let programs = programs(Channel::Play4, &listing).unwrap();

        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].path, "de-slimste-mens");
        assert_eq!(programs[0].channel.as_deref(), Some("play4"));
        assert_eq!(programs[1].title, "Thuis");
        assert!(programs[1].episodes.is_empty());
    }

    #[test]
    fn test_programs_listing_rejects_non_array() {
        assert!(programs(Channel::Play4, &json!({"items": []})).is_err());
    }

    #[test]
    fn test_program_details() {
        let program = program(&program_data()).unwrap();

        assert_eq!(program.uuid.as_deref(), Some("prog-1"));
        assert_eq!(program.path, "de-slimste-mens");
        assert_eq!(program.channel.as_deref(), Some("vier"));
        assert_eq!(program.cover.as_deref(), Some("https://img/poster.jpg"));
        assert_eq!(program.background.as_deref(), Some("https://img/hero.jpg"));

        assert_eq!(program.seasons.len(), 2);
        assert_eq!(program.seasons[0].number, Some(1));
        assert_eq!(program.seasons[1].number, None);
    }

    #[test]
    fn test_program_splits_episodes_and_clips() {
        let program = program(&program_data()).unwrap();

        assert_eq!(program.episodes.len(), 2);
        assert_eq!(program.clips.len(), 1);

        let first = &program.episodes[0];
        assert_eq!(first.node_id, "1001");
        assert_eq!(first.description.as_deref(), Some("First"));
        assert_eq!(first.duration, Some(2700));
        assert_eq!(first.number, 1);

        let second = &program.episodes[1];
        assert_eq!(second.node_id, "1002");
        assert_eq!(second.season, Some(1));
        assert_eq!(second.number, 2);
        assert_eq!(second.duration, Some(2650));

        assert_eq!(program.clips[0].uuid, "clip-1");
        assert_eq!(program.clips[0].path, "video/de-slimste-mens/extra/bloopers");
    }

    #[test]
    fn test_program_missing_title_is_malformed() {
        let mut data = program_data();
        data.as_object_mut().unwrap().remove("title");

        assert_eq!(program(&data), Err(PayloadError("missing field 'title'".to_string())));
    }

    #[test]
    fn test_episode_lookup_by_node_id() {
        let payload = episode_payload(program_data(), "1002");

        let episode = episode(&payload).unwrap().unwrap();

        assert_eq!(episode.uuid, "vid-2");
    }

    #[test]
    fn test_episode_lookup_unknown_node() {
        let payload = episode_payload(program_data(), "2001");

        assert_eq!(episode(&payload), Ok(None));
    }

    #[test]
    fn test_stream_prefers_drm_dash() {
        let data = json!({
            "manifestUrls": { "dash": "https://cdn/manifest.mpd", "hls": "https://cdn/master.m3u8" },
            "drmXml": "drm-token"
        });

        let stream = resolved_stream("vid-1", &data).unwrap();

        assert_eq!(stream.stream_type, StreamType::Dash);
        assert_eq!(stream.url, "https://cdn/manifest.mpd");
        assert_eq!(stream.license_url.as_deref(), Some(WIDEVINE_LICENSE_URL));
        assert_eq!(stream.auth.as_deref(), Some("drm-token"));
    }

    #[test]
    fn test_stream_hls_without_drm() {
        let data = json!({
            "manifestUrls": { "dash": "https://cdn/manifest.mpd", "hls": "https://cdn/master.m3u8" }
        });

        let stream = resolved_stream("vid-1", &data).unwrap();

        assert_eq!(stream.stream_type, StreamType::Hls);
        assert_eq!(stream.url, "https://cdn/master.m3u8");
        assert!(stream.license_url.is_none());
    }

    #[test]
    fn test_stream_legacy_field() {
        let data = json!({ "video": { "S": "https://cdn/legacy.m3u8" } });

        let stream = resolved_stream("vid-1", &data).unwrap();

        assert_eq!(stream.url, "https://cdn/legacy.m3u8");
        assert_eq!(stream.stream_type, StreamType::Hls);
    }

    #[test]
    fn test_stream_without_manifest() {
        let result = resolved_stream("vid-1", &json!({ "title": "x" }));

        assert_eq!(result, Err(PayloadError("no manifest for video vid-1".to_string())));
    }

    #[test]
    fn test_my_list_entries() {
        let value = json!([
            { "id": "06e209f9", "timestamp": "1600000000000" },
            { "id": "da584be3", "timestamp": 1600000001000_i64 }
        ]);

        let entries = my_list(&value).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp, 1_600_000_000_000);
        assert_eq!(entries[1].id, "da584be3");
    }

    #[test]
    fn test_my_list_null_is_empty() {
        assert_eq!(my_list(&Value::Null), Ok(Vec::new()));
    }

    #[test]
    fn test_search_keeps_program_hits() {
        let data = json!({
            "hits": {
                "total": 3,
                "hits": [
                    { "_source": {
                        "bundle": "program", "site": "vier", "url": "/de-mol/",
                        "title": "De Mol", "intro": "Wie is de mol?", "img": "https://img/mol.jpg"
                    } },
                    { "_source": {
                        "bundle": "video", "site": "vier", "url": "/video/de-mol/aflevering-1",
                        "title": "Aflevering 1"
                    } },
                    { "_source": {
                        "bundle": "program", "site": "zes", "url": "/molly", "title": "Molly"
                    } }
                ]
            }
        });

        let programs = search_results(&data).unwrap();

        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].path, "de-mol");
        assert_eq!(programs[0].channel.as_deref(), Some("vier"));
        assert_eq!(programs[0].description.as_deref(), Some("Wie is de mol?"));
        assert_eq!(programs[0].cover.as_deref(), Some("https://img/mol.jpg"));
        assert_eq!(programs[1].title, "Molly");
        assert!(programs[1].description.is_none());
    }

    #[test]
    fn test_search_without_hits_is_malformed() {
        assert_eq!(
            search_results(&json!({ "error": "x" })),
            Err(PayloadError("missing field 'hits.hits'".to_string()))
        );
    }

    #[test]
    fn test_broadcasts() {
        let data = json!([
            {
                "program_title": "De Slimste Mens",
                "episode_title": "Aflevering 12",
                "episode_nr": "12",
                "season": "19",
                "genre": "Quiz",
                "timestamp": 1740855600,
                "duration": "3600",
                "won_id": "4108762",
                "won_program_id": 200,
                "program_concept": "Quiz",
                "content_episode": "Finale",
                "program_node": { "url": "/de-slimste-mens" },
                "video_node": {
                    "latest_video": true,
                    "url": "/video/de-slimste-mens/aflevering-12",
                    "image": "https://img/12.jpg"
                }
            },
            {
                "program_title": "Reclame",
                "timestamp": "1740859200",
                "duration": null,
                "program_node": [],
                "video_node": { "latest_video": false, "url": "/video/other", "image": "https://img/o.jpg" }
            }
        ]);

        let broadcasts = broadcasts(Channel::Play4, &data).unwrap();

        assert_eq!(broadcasts.len(), 2);
        let quiz = &broadcasts[0];
        assert_eq!(quiz.channel, Channel::Play4);
        assert_eq!(quiz.start, Utc.timestamp_opt(1740855600, 0).unwrap());
        assert_eq!(quiz.duration, Some(3600));
        assert_eq!(quiz.season, Some(19));
        assert_eq!(quiz.number, Some(12));
        assert_eq!(quiz.won_id.as_deref(), Some("4108762"));
        assert_eq!(quiz.won_program_id.as_deref(), Some("200"));
        assert_eq!(quiz.program_path.as_deref(), Some("de-slimste-mens"));
        assert_eq!(quiz.video_path.as_deref(), Some("video/de-slimste-mens/aflevering-12"));
        assert_eq!(quiz.cover.as_deref(), Some("https://img/12.jpg"));

        let ads = &broadcasts[1];
        assert_eq!(ads.start, Utc.timestamp_opt(1740859200, 0).unwrap());
        assert!(ads.duration.is_none());
        assert!(ads.program_path.is_none());
        assert!(ads.video_path.is_none());
        assert!(ads.cover.is_none());
    }

    #[test]
    fn test_broadcasts_reject_bad_shapes() {
        assert!(broadcasts(Channel::Play5, &json!({ "items": [] })).is_err());
        assert_eq!(
            broadcasts(Channel::Play5, &json!([{ "program_title": "Zonder tijd" }])),
            Err(PayloadError("missing field 'timestamp'".to_string()))
        );
        assert_eq!(broadcasts(Channel::Play5, &json!([])), Ok(Vec::new()));
    }
}
