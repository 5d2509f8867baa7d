//! Catalog enrichment stage.
//!
//! For each normalized record, issues a best-single-match catalog
//! search and attaches the matched metadata. A miss is not an error:
//! the enrichment fields stay unset and only the processed flag flips.
//! A provider failure on one record is retried once (transient errors
//! only) and then absorbed as a null enrichment; one flaky lookup never
//! aborts the batch.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};

use ritornello_core::PlayRecord;

use crate::catalog::{parse_release_date, search_query, CatalogClient, TrackMatch};
use crate::error::SyncError;

/// Delay before the single retry of a failed lookup.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Counters for one enrichment pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    /// Records with a catalog match attached.
    pub matched: usize,
    /// Records the catalog had no result for.
    pub missed: usize,
    /// Records whose lookup failed even after the retry.
    pub failed: usize,
}

/// Enriches play records with catalog metadata.
#[derive(Debug, Clone)]
pub struct CatalogEnricher {
    client: CatalogClient,
}

impl CatalogEnricher {
    #[must_use]
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }

    /// Enrich every record in place, strictly in order.
    ///
    /// Every record comes out with `catalog_processed_flag` set:
    /// enrichment was attempted for all of them, whatever the outcome.
    pub async fn enrich_all(&self, records: &mut [PlayRecord]) -> EnrichStats {
        let mut stats = EnrichStats::default();

        for record in records.iter_mut() {
            let query = search_query(&record.track_name, &record.artist_name);
            let lookup = || async { self.client.search_track(&query).await };
            let outcome = lookup
                .retry(
                    ConstantBuilder::default()
                        .with_delay(RETRY_DELAY)
                        .with_max_times(1),
                )
                .when(SyncError::is_transient)
                .await;

            match outcome {
                Ok(Some(track)) => {
                    apply_match(record, &track);
                    stats.matched += 1;
                }
                Ok(None) => {
                    stats.missed += 1;
                }
                Err(e) => {
                    log::warn!(
                        "catalog search failed for {} - {}: {}",
                        record.artist_name,
                        record.track_name,
                        e
                    );
                    stats.failed += 1;
                }
            }
            record.catalog_processed_flag = true;
        }

        stats
    }
}

/// Copy the matched track's metadata onto the record.
fn apply_match(record: &mut PlayRecord, track: &TrackMatch) {
    record.catalog_album_url = track.album.external_urls.spotify.clone();
    record.catalog_album_image_url = track.album.images.first().map(|image| image.url.clone());
    record.catalog_release_date = track
        .album
        .release_date
        .as_deref()
        .and_then(parse_release_date);
    record.catalog_track_url = track.external_urls.spotify.clone();
    record.catalog_track_id = Some(track.id.clone());
    record.catalog_all_artists = track.joined_artists();
    record.catalog_track_duration_ms = track.duration_ms;
    record.catalog_track_popularity = track.popularity;
}
