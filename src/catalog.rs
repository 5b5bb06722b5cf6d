//! Catalog building: normalize collected tracks into a deduplicated,
//! decade-binned set of records ready for matching.

use std::collections::HashSet;

use crate::dates::{decade_of, parse_year};

/// One track as returned by the collector, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrack {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub release_date: String,
    pub genres: Vec<String>,
    pub duration_ms: i64,
    pub popularity: i64,
    pub danceability: f64,
    pub energy: f64,
    pub tempo: f64,
    pub key: i32,
    pub time_signature: i32,
    pub valence: f64,
    /// Opaque reference to the audio-features resource.
    pub feature_ref: String,
}

/// A normalized catalog entry. Title and artist are uppercased.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub release_date: String,
    /// `None` when no year could be read from `release_date`.
    pub release_year: Option<i32>,
    pub release_decade: Option<i32>,
    pub genres: Vec<String>,
    pub duration_ms: i64,
    pub popularity: i64,
    pub danceability: f64,
    pub energy: f64,
    pub tempo: f64,
    pub key: i32,
    pub time_signature: i32,
    pub valence: f64,
    pub feature_ref: String,
}

impl TrackRecord {
    /// Text used for fuzzy matching against chart rows.
    pub fn match_key(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

/// Deduplicated records, indexed contiguously from zero.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub records: Vec<TrackRecord>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&TrackRecord> {
        self.records.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRecord> {
        self.records.iter()
    }

    pub fn match_keys(&self) -> Vec<String> {
        self.records.iter().map(TrackRecord::match_key).collect()
    }
}

/// Normalize raw tracks into a catalog.
///
/// Uppercases title and artist, drops later duplicates of a (title, artist)
/// pair, then derives release year and decade. A release date with no
/// readable year leaves both derived fields unset; the record is kept.
pub fn normalize(records: Vec<RawTrack>) -> Catalog {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for raw in records {
        let title = raw.title.to_uppercase();
        let artist = raw.artist.to_uppercase();

        if !seen.insert((title.clone(), artist.clone())) {
            dropped += 1;
            continue;
        }

        let release_year = match parse_year(&raw.release_date) {
            Ok(y) => Some(y),
            Err(e) => {
                log::debug!("{title} / {artist}: {e}");
                None
            }
        };

        out.push(TrackRecord {
            track_id: raw.track_id,
            title,
            artist,
            release_date: raw.release_date,
            release_year,
            release_decade: release_year.map(decade_of),
            genres: raw.genres,
            duration_ms: raw.duration_ms,
            popularity: raw.popularity,
            danceability: raw.danceability,
            energy: raw.energy,
            tempo: raw.tempo,
            key: raw.key,
            time_signature: raw.time_signature,
            valence: raw.valence,
            feature_ref: raw.feature_ref,
        });
    }

    if dropped > 0 {
        log::info!("Dropped {dropped} duplicate (title, artist) records");
    }

    Catalog { records: out }
}

#[cfg(test)]
pub(crate) fn raw(title: &str, artist: &str, release_date: &str) -> RawTrack {
    RawTrack {
        track_id: format!("id-{}-{}", title.to_lowercase(), artist.to_lowercase()),
        title: title.to_string(),
        artist: artist.to_string(),
        release_date: release_date.to_string(),
        genres: vec!["rock".to_string()],
        duration_ms: 200_000,
        popularity: 50,
        danceability: 0.5,
        energy: 0.5,
        tempo: 120.0,
        key: 5,
        time_signature: 4,
        valence: 0.5,
        feature_ref: "https://api.spotify.com/v1/tracks/x".to_string(),
    }
}
