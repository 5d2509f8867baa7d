use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single play of a track, as persisted in the history store.
///
/// The record is created fresh each run from scrobble-provider data,
/// enriched once against the catalog provider, and merged into the
/// store. After the merge it is never mutated except for `entry_id`
/// renumbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    /// Dense 1..N display/sort aid, reassigned on every merge. Not a
    /// stable identifier across runs.
    pub entry_id: u32,

    pub track_name: String,

    pub artist_name: String,

    pub album_name: String,

    /// When the play completed, in the configured local reference zone.
    /// This is the deduplication key: unique across the stored set.
    pub played_on: NaiveDateTime,

    /// True only for an in-progress play. Such records are filtered out
    /// before the store and never persisted.
    pub now_playing: bool,

    /// Artwork from the scrobble provider (largest available variant).
    pub image_url: Option<String>,

    /// When this record was processed by the pipeline.
    pub etl_datetime: NaiveDateTime,

    // --- Catalog enrichment (all None when no match was found) ---
    /// External link to the matched album.
    pub catalog_album_url: Option<String>,

    /// Largest album artwork URL from the catalog match.
    pub catalog_album_image_url: Option<String>,

    /// Album release date; partial precision snaps to the first day of
    /// the year or month.
    pub catalog_release_date: Option<NaiveDate>,

    /// External link to the matched track.
    pub catalog_track_url: Option<String>,

    /// Stable catalog identifier of the matched track.
    pub catalog_track_id: Option<String>,

    /// Comma-joined display string of all contributing artists.
    pub catalog_all_artists: Option<String>,

    pub catalog_track_duration_ms: Option<u64>,

    pub catalog_track_popularity: Option<u32>,

    /// True once enrichment was attempted, regardless of match success.
    pub catalog_processed_flag: bool,
}

impl PlayRecord {
    /// Canonical column order of the history store. The store's header
    /// row must match this exactly before a merge is accepted.
    pub const FIELDS: [&'static str; 17] = [
        "entry_id",
        "track_name",
        "artist_name",
        "album_name",
        "played_on",
        "now_playing",
        "image_url",
        "etl_datetime",
        "catalog_album_url",
        "catalog_album_image_url",
        "catalog_release_date",
        "catalog_track_url",
        "catalog_track_id",
        "catalog_all_artists",
        "catalog_track_duration_ms",
        "catalog_track_popularity",
        "catalog_processed_flag",
    ];

    /// Create a pre-enrichment record from normalized scrobble data.
    ///
    /// All catalog fields start out unset; the enrichment stage fills
    /// them in and flips `catalog_processed_flag`.
    #[must_use]
    pub fn new(
        entry_id: u32,
        track_name: String,
        artist_name: String,
        album_name: String,
        played_on: NaiveDateTime,
        now_playing: bool,
        image_url: Option<String>,
        etl_datetime: NaiveDateTime,
    ) -> Self {
        Self {
            entry_id,
            track_name,
            artist_name,
            album_name,
            played_on,
            now_playing,
            image_url,
            etl_datetime,
            catalog_album_url: None,
            catalog_album_image_url: None,
            catalog_release_date: None,
            catalog_track_url: None,
            catalog_track_id: None,
            catalog_all_artists: None,
            catalog_track_duration_ms: None,
            catalog_track_popularity: None,
            catalog_processed_flag: false,
        }
    }
}

/// Reassign `entry_id` densely 1..N over the slice's current order.
///
/// Used both for the provisional ids of a freshly normalized batch and
/// for the final renumbering after a merge.
pub fn assign_entry_ids(records: &mut [PlayRecord]) {
    let mut next = 1_u32;
    for record in records {
        record.entry_id = next;
        next += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record() -> PlayRecord {
        let played_on = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        PlayRecord::new(
            1,
            "Paranoid Android".to_string(),
            "Radiohead".to_string(),
            "OK Computer".to_string(),
            played_on,
            false,
            Some("https://img.example/cover.png".to_string()),
            played_on,
        )
    }

    #[test]
    fn test_new_record_has_no_enrichment() {
        let record = sample_record();
        assert!(record.catalog_album_url.is_none());
        assert!(record.catalog_track_id.is_none());
        assert!(record.catalog_release_date.is_none());
        assert!(!record.catalog_processed_flag);
    }

    #[test]
    fn test_fields_match_serialized_header() {
        // The FIELDS constant must stay in sync with the struct's own
        // serde layout, since writes emit the header explicitly.
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(sample_record()).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, PlayRecord::FIELDS.join(","));
    }

    #[test]
    fn test_csv_round_trip_preserves_options() {
        let mut record = sample_record();
        record.catalog_track_id = Some("6LgJvl0Xdtc".to_string());
        record.catalog_track_duration_ms = Some(383_000);
        record.catalog_processed_flag = true;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(&record).unwrap();
        let bytes = writer.into_inner().unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let decoded: PlayRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(decoded, record);
        // Unset options stay unset through the empty-cell encoding.
        assert!(decoded.catalog_album_url.is_none());
        assert!(decoded.catalog_track_popularity.is_none());
    }
}
