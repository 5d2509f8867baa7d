//! Run orchestration.
//!
//! One synchronization run is strictly sequential: load the store and
//! its checkpoint, fetch new plays, normalize, enrich, merge, write.
//! Every fatal error aborts before the write, leaving prior history
//! untouched; the checkpoint only advances when the whole run lands.

use chrono::NaiveDateTime;

use ritornello_core::HistoryStore;

use crate::catalog::CatalogClient;
use crate::config::Config;
use crate::enrich::CatalogEnricher;
use crate::error::{SyncError, SyncResult};
use crate::merge::merge_history;
use crate::normalize::{local_now, normalize_plays};
use crate::scrobble::{to_unix_seconds, ScrobbleClient};

/// Summary of one completed run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Raw play entries fetched from the scrobble provider.
    pub fetched: usize,
    /// Records surviving normalization (in-progress plays dropped).
    pub new_records: usize,
    /// Records that got a catalog match.
    pub matched: usize,
    /// Net new records added to the store after deduplication.
    pub appended: usize,
    /// Total records in the rewritten store.
    pub total: usize,
    /// The store's new checkpoint.
    pub checkpoint: NaiveDateTime,
}

/// Run one synchronization pass.
pub async fn run_sync(config: &Config) -> SyncResult<SyncReport> {
    let zone = config
        .reference_zone()
        .map_err(|e| SyncError::Config(e.to_string()))?;
    let api_key = require(config.lastfm_api_key.as_deref(), "lastfm_api_key")?;
    let user = require(config.lastfm_user.as_deref(), "lastfm_user")?;

    let store = HistoryStore::new(config.history_path.clone(), config.snapshot_path.clone());
    let stored = store.load()?;
    let previous_total = stored.records.len();
    let checkpoint = stored.checkpoint()?;
    log::info!(
        "checkpoint {} over {} stored records",
        checkpoint,
        previous_total
    );

    let scrobbles = ScrobbleClient::new(api_key.to_string())?;
    let raw = scrobbles
        .fetch_since(user, to_unix_seconds(checkpoint, zone))
        .await?;
    let fetched = raw.len();

    let now = local_now(zone);
    let mut batch = normalize_plays(raw, zone, now);
    let new_records = batch.len();

    let mut matched = 0;
    if batch.is_empty() {
        log::info!("no completed plays past the checkpoint");
    } else {
        let client_id = require(config.spotify_client_id.as_deref(), "spotify_client_id")?;
        let client_secret = require(
            config.spotify_client_secret.as_deref(),
            "spotify_client_secret",
        )?;
        let refresh_token = require(
            config.spotify_refresh_token.as_deref(),
            "spotify_refresh_token",
        )?;
        let catalog = CatalogClient::authorize(client_id, client_secret, refresh_token).await?;
        let stats = CatalogEnricher::new(catalog).enrich_all(&mut batch).await;
        matched = stats.matched;
        log::info!(
            "enriched {} records: {} matched, {} missed, {} failed",
            new_records,
            stats.matched,
            stats.missed,
            stats.failed
        );
    }

    let merged = merge_history(batch, stored)?;
    let total = merged.len();
    let appended = total.saturating_sub(previous_total);
    let new_checkpoint = merged.first().map_or(checkpoint, |record| record.played_on);

    store.write(&merged)?;
    log::info!("{} records appended; store now holds {}", appended, total);

    Ok(SyncReport {
        fetched,
        new_records,
        matched,
        appended,
        total,
        checkpoint: new_checkpoint,
    })
}

fn require<'a>(value: Option<&'a str>, key: &'static str) -> SyncResult<&'a str> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SyncError::Config(format!("{key} is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_present_value() {
        assert_eq!(require(Some("key"), "lastfm_api_key").unwrap(), "key");
    }

    #[test]
    fn test_require_missing_or_blank() {
        for value in [None, Some(""), Some("   ")] {
            let err = require(value, "lastfm_api_key").unwrap_err();
            assert!(matches!(err, SyncError::Config(_)));
            assert!(err.to_string().contains("lastfm_api_key"));
        }
    }
}
