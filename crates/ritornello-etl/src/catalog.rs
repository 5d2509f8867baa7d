//! Music catalog provider client.
//!
//! Searches the Spotify catalog for the best single match of a
//! track/artist pair. The interactive authorization flow that grants
//! the scopes in [`CATALOG_SCOPES`] happens out of band and produces a
//! reusable refresh token; this client only exchanges that token for an
//! access token at startup and attaches it to search requests.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{SyncError, SyncResult};
use crate::resilience::RateLimiter;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";
const SOURCE_NAME: &str = "Spotify";

/// Pacing between successive search requests.
const SEARCH_RATE_PER_SECOND: u32 = 5;

/// Scopes the out-of-band authorization flow must have granted to the
/// refresh token this client reuses.
pub const CATALOG_SCOPES: [&str; 9] = [
    "user-library-read",
    "user-read-playback-state",
    "user-modify-playback-state",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-private",
    "playlist-modify-public",
    "user-top-read",
    "user-read-recently-played",
];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Default, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackMatch>,
}

/// A single track match from the catalog search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackMatch {
    /// Stable catalog identifier.
    pub id: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Popularity score, 0-100.
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: AlbumRef,
}

impl TrackMatch {
    /// Comma-joined display string of all contributing artists, or
    /// `None` when the match carries no artist credits.
    pub fn joined_artists(&self) -> Option<String> {
        if self.artists.is_empty() {
            return None;
        }
        Some(
            self.artists
                .iter()
                .map(|artist| artist.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

/// Album summary attached to a track match. Images are ordered largest
/// first by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub external_urls: ExternalUrls,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Release date at year, year-month, or day precision.
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

/// Build the `track:<title> artist:<artist>` search query.
///
/// The title is trimmed and stripped of apostrophes and parentheses,
/// which trip the search endpoint's field filters.
#[must_use]
pub fn search_query(track: &str, artist: &str) -> String {
    let title: String = track
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\'' | '(' | ')'))
        .collect();
    format!("track:{} artist:{}", title, artist.trim())
}

/// Parse a release date reported at year, year-month, or day precision.
/// Partial values snap to the first day of the period.
#[must_use]
pub fn parse_release_date(value: &str) -> Option<NaiveDate> {
    match value.len() {
        4 => NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Catalog API client holding an exchanged access token.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    access_token: String,
    rate_limiter: RateLimiter,
}

impl CatalogClient {
    /// Exchange the stored refresh token for a fresh access token.
    ///
    /// Uses the standard refresh grant with HTTP Basic client
    /// authentication. A rejected exchange is fatal; without a catalog
    /// credential the run cannot mark records as enrichment-attempted
    /// truthfully.
    pub async fn authorize(
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> SyncResult<Self> {
        let http = Client::builder()
            .user_agent("ritornello/0.1.0 (https://github.com/oxur/ritornello)")
            .timeout(Duration::from_secs(30))
            .build()?;

        let basic = BASE64.encode(format!("{client_id}:{client_secret}"));
        let response = http
            .post(TOKEN_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SyncError::Auth {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        let token: TokenResponse = response.json().await.map_err(|e| SyncError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        log::info!("authorized with {}", SOURCE_NAME);

        Ok(Self {
            http,
            access_token: token.access_token,
            rate_limiter: RateLimiter::new(SEARCH_RATE_PER_SECOND),
        })
    }

    /// Best single match for a query, or `None` when the search comes
    /// back empty.
    pub async fn search_track(&self, query: &str) -> SyncResult<Option<TrackMatch>> {
        self.rate_limiter.acquire().await;

        let response = self
            .http
            .get(SEARCH_URL)
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| SyncError::Http {
                source_name: SOURCE_NAME.to_string(),
                message: e.to_string(),
            })?;

        let result: SearchResponse = response.json().await.map_err(|e| SyncError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        Ok(result.tracks.items.into_iter().next())
    }
}
