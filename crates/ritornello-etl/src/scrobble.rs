//! Scrobble-history provider client.
//!
//! Pulls recently-played tracks from the Last.fm `user.getRecentTracks`
//! endpoint, page by page, with a lower-bound timestamp filter. The wire
//! format is awkward: artist and album arrive either as bare strings or
//! as `{"#text": ...}` objects, pagination counters are strings, and an
//! in-progress play is flagged through a `@attr.nowplaying` marker
//! instead of a missing timestamp. The DTOs here absorb all of that so
//! the normalizer sees one shape.

use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::resilience::RateLimiter;

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const SOURCE_NAME: &str = "Last.fm";

/// Pacing between successive page requests.
const PAGE_RATE_PER_SECOND: u32 = 2;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: Vec<RawPlay>,
    #[serde(rename = "@attr", default)]
    attr: PageAttr,
}

/// Pagination metadata. The counters arrive as strings; absent or
/// malformed values read as "no pagination info yet".
#[derive(Debug, Default, Deserialize)]
struct PageAttr {
    #[serde(default)]
    page: Option<String>,
    #[serde(rename = "totalPages", default)]
    total_pages: Option<String>,
}

impl PageAttr {
    fn page(&self) -> Option<u32> {
        self.page.as_deref().and_then(|value| value.parse().ok())
    }

    fn total_pages(&self) -> Option<u32> {
        self.total_pages
            .as_deref()
            .and_then(|value| value.parse().ok())
    }
}

/// A single play entry as reported by the scrobble provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlay {
    /// Track title.
    pub name: String,
    /// Artist, as a bare string or a `{"#text": ...}` object.
    pub artist: TextField,
    /// Album, same dual encoding as `artist`.
    #[serde(default)]
    pub album: TextField,
    /// Artwork variants tagged by size.
    #[serde(default)]
    pub image: Vec<ImageVariant>,
    /// When the play completed. Absent for an in-progress play.
    #[serde(default)]
    pub date: Option<PlayDate>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<PlayAttr>,
}

impl RawPlay {
    /// True iff the entry carries the currently-playing marker.
    pub fn is_now_playing(&self) -> bool {
        self.attr
            .as_ref()
            .and_then(|attr| attr.nowplaying.as_deref())
            == Some("true")
    }
}

/// A display-text field that providers serialize either as a plain
/// string or as a structured object with a `#text` member.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Structured {
        #[serde(rename = "#text")]
        text: String,
    },
    Plain(String),
}

impl TextField {
    pub fn text(&self) -> &str {
        match self {
            Self::Structured { text } | Self::Plain(text) => text,
        }
    }
}

impl Default for TextField {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

/// One artwork variant of a play entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageVariant {
    /// Size tag, e.g. "small", "large", "extralarge".
    pub size: String,
    #[serde(rename = "#text")]
    pub url: String,
}

/// Play completion time as Unix seconds (string-typed on the wire).
#[derive(Debug, Clone, Deserialize)]
pub struct PlayDate {
    pub uts: String,
}

impl PlayDate {
    pub fn unix_seconds(&self) -> Option<i64> {
        self.uts.parse().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayAttr {
    #[serde(default)]
    pub nowplaying: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Last.fm API client.
///
/// Wraps an HTTP client, an API key, and a rate limiter pacing the
/// page requests.
#[derive(Debug, Clone)]
pub struct ScrobbleClient {
    http: Client,
    api_key: String,
    rate_limiter: RateLimiter,
}

impl ScrobbleClient {
    /// Create a new scrobble provider client.
    ///
    /// The `api_key` must be a valid Last.fm API key obtained from
    /// <https://www.last.fm/api/account/create>.
    pub fn new(api_key: String) -> SyncResult<Self> {
        let http = Client::builder()
            .user_agent("ritornello/0.1.0 (https://github.com/oxur/ritornello)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key,
            rate_limiter: RateLimiter::new(PAGE_RATE_PER_SECOND),
        })
    }

    /// Fetch every play event strictly after the checkpoint.
    ///
    /// `checkpoint_unix` is the checkpoint as Unix seconds; the request
    /// lower bound backs off by one second so a play landing exactly on
    /// the checkpoint is not lost at the boundary. The merge stage
    /// collapses the duplicate this tolerance can re-fetch.
    ///
    /// Pages are requested until `page == totalPages`; any provider
    /// failure is fatal for the run, so a partial page range is never
    /// mistaken for a fully synced history.
    pub async fn fetch_since(&self, user: &str, checkpoint_unix: i64) -> SyncResult<Vec<RawPlay>> {
        let from = checkpoint_unix - 1;
        let mut plays = Vec::new();
        let mut page = 1_u32;
        let mut pages_fetched = 0_u32;

        loop {
            let response = self.recent_tracks(user, from, page).await?;
            let recent = response.recenttracks;
            plays.extend(recent.track);
            pages_fetched += 1;

            let current = recent.attr.page().unwrap_or(page);
            let total = recent.attr.total_pages().unwrap_or(current);
            if current >= total {
                break;
            }
            page = current + 1;
        }

        log::info!(
            "fetched {} plays across {} pages from {}",
            plays.len(),
            pages_fetched,
            SOURCE_NAME
        );

        Ok(plays)
    }

    /// Request one page of recent tracks with a lower-bound filter.
    async fn recent_tracks(
        &self,
        user: &str,
        from: i64,
        page: u32,
    ) -> SyncResult<RecentTracksResponse> {
        self.rate_limiter.acquire().await;

        let from = from.to_string();
        let page = page.to_string();
        let response = self
            .http
            .get(LASTFM_API_BASE)
            .query(&[
                ("method", "user.getRecentTracks"),
                ("format", "json"),
                ("user", user),
                ("api_key", &self.api_key),
                ("from", from.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SyncError::Http {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        response.json().await.map_err(|e| SyncError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })
    }
}

/// Unix seconds for a naive timestamp in the given fixed reference zone.
pub fn to_unix_seconds(value: NaiveDateTime, zone: FixedOffset) -> i64 {
    value.and_utc().timestamp() - i64::from(zone.local_minus_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn test_play_deserialize_structured_fields() {
        let json = r##"{
            "name": "Nude",
            "artist": {"#text": "Radiohead", "mbid": "a74b1b7f"},
            "album": {"#text": "In Rainbows"},
            "image": [
                {"size": "small", "#text": "https://img.example/s.png"},
                {"size": "extralarge", "#text": "https://img.example/xl.png"}
            ],
            "date": {"uts": "1709290800", "#text": "01 Mar 2024, 11:00"}
        }"##;
        let play: RawPlay = serde_json::from_str(json).unwrap();
        assert_eq!(play.artist.text(), "Radiohead");
        assert_eq!(play.album.text(), "In Rainbows");
        assert_eq!(play.date.as_ref().unwrap().unix_seconds(), Some(1_709_290_800));
        assert!(!play.is_now_playing());
    }

    #[test]
    fn test_play_deserialize_plain_text_fields() {
        let json = r#"{
            "name": "Nude",
            "artist": "Radiohead",
            "album": "In Rainbows"
        }"#;
        let play: RawPlay = serde_json::from_str(json).unwrap();
        assert_eq!(play.artist.text(), "Radiohead");
        assert!(play.image.is_empty());
        assert!(play.date.is_none());
    }

    #[test]
    fn test_now_playing_marker() {
        let json = r#"{
            "name": "Nude",
            "artist": "Radiohead",
            "@attr": {"nowplaying": "true"}
        }"#;
        let play: RawPlay = serde_json::from_str(json).unwrap();
        assert!(play.is_now_playing());

        let json = r#"{
            "name": "Nude",
            "artist": "Radiohead",
            "@attr": {"nowplaying": "false"}
        }"#;
        let play: RawPlay = serde_json::from_str(json).unwrap();
        assert!(!play.is_now_playing());
    }

    #[test]
    fn test_page_attr_parses_string_counters() {
        let json = r#"{
            "recenttracks": {
                "track": [],
                "@attr": {"page": "2", "totalPages": "7", "user": "someone"}
            }
        }"#;
        let response: RecentTracksResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.recenttracks.attr.page(), Some(2));
        assert_eq!(response.recenttracks.attr.total_pages(), Some(7));
    }

    #[test]
    fn test_empty_pagination_metadata_defaults() {
        // No pagination info yet: counters read as None and the fetch
        // loop stops after the first page.
        let json = r#"{"recenttracks": {"track": []}}"#;
        let response: RecentTracksResponse = serde_json::from_str(json).unwrap();
        assert!(response.recenttracks.attr.page().is_none());
        assert!(response.recenttracks.attr.total_pages().is_none());
        assert!(response.recenttracks.track.is_empty());
    }

    #[test]
    fn test_to_unix_seconds_respects_zone() {
        let local = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        assert_eq!(to_unix_seconds(local, utc), 1_709_290_800);
        // The same local wall-clock time is earlier in UTC terms when
        // the zone is ahead.
        assert_eq!(to_unix_seconds(local, ist), 1_709_290_800 - 19_800);
    }

    #[test]
    fn test_client_creation() {
        let client = ScrobbleClient::new("test-key".to_string()).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("ScrobbleClient"));
        assert!(debug.contains("RateLimiter"));
    }
}
