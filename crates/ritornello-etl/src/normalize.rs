//! Record normalizer.
//!
//! Maps raw provider entries to the canonical [`PlayRecord`] shape:
//! text-or-object fields collapse to text, the largest artwork variant
//! is selected, in-progress plays are dropped, and the play timestamp
//! is rendered into the configured local reference zone.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use ritornello_core::{assign_entry_ids, PlayRecord};

use crate::scrobble::RawPlay;

/// The artwork variant persisted to the store.
const ARTWORK_VARIANT: &str = "extralarge";

/// Current time in the reference zone, with the offset stripped; the
/// store keeps naive local timestamps.
pub fn local_now(zone: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&zone).naive_local()
}

/// Normalize a fetched batch into pre-enrichment play records.
///
/// In-progress plays are dropped here; they represent incomplete plays,
/// not historical events, and never reach the store. The survivors get
/// provisional dense `entry_id`s and a batch-wide `etl_datetime` stamp
/// of `now`.
pub fn normalize_plays(raw: Vec<RawPlay>, zone: FixedOffset, now: NaiveDateTime) -> Vec<PlayRecord> {
    let mut records: Vec<PlayRecord> = raw
        .into_iter()
        .filter(|play| !play.is_now_playing())
        .map(|play| normalize_play(play, zone, now))
        .collect();
    assign_entry_ids(&mut records);
    records
}

fn normalize_play(play: RawPlay, zone: FixedOffset, now: NaiveDateTime) -> PlayRecord {
    // A missing or unparseable timestamp means the play is happening
    // right now; those entries are the now-playing ones filtered above,
    // so stamping with `now` is a defensive fallback, not the primary
    // path.
    let played_on = play
        .date
        .as_ref()
        .and_then(|date| date.unix_seconds())
        .and_then(|uts| DateTime::<Utc>::from_timestamp(uts, 0))
        .map_or(now, |instant| instant.with_timezone(&zone).naive_local());

    let image_url = play
        .image
        .into_iter()
        .find(|variant| variant.size == ARTWORK_VARIANT)
        .map(|variant| variant.url)
        .filter(|url| !url.is_empty());

    PlayRecord::new(
        0, // provisional; reassigned over the whole batch
        play.name,
        play.artist.text().to_string(),
        play.album.text().to_string(),
        played_on,
        false,
        image_url,
        now,
    )
}
