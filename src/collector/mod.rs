pub mod client;
pub mod models;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

pub use self::client::SpotifyClient;
use self::models::{ApiArtist, ApiTrack, AudioFeatures, PlaylistTracksPage};
use crate::catalog::RawTrack;
use crate::db::Database;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("{0}")]
    Missing(String),
}

impl FetchError {
    /// The track itself is gone or incomplete, as opposed to a failed request.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Missing(_) | Self::Status { status: 404, .. })
    }
}

/// The streaming-service operations the collector consumes.
pub trait StreamingApi {
    /// First page of a playlist's items when `next` is `None`, otherwise the
    /// page at the `next` URL returned by the previous call.
    fn playlist_page(
        &self,
        playlist_id: &str,
        next: Option<&str>,
    ) -> Result<PlaylistTracksPage, FetchError>;
    fn track(&self, id: &str) -> Result<ApiTrack, FetchError>;
    fn audio_features(&self, id: &str) -> Result<AudioFeatures, FetchError>;
    fn artist(&self, id: &str) -> Result<ApiArtist, FetchError>;
}

/// Strip `spotify:playlist:` URIs and open.spotify.com URLs down to the bare id.
pub fn playlist_id(raw: &str) -> &str {
    let s = raw.trim();
    if let Some(rest) = s.strip_prefix("spotify:playlist:") {
        return rest;
    }
    if let Some(pos) = s.find("/playlist/") {
        let rest = &s[pos + "/playlist/".len()..];
        return rest.split(['?', '/']).next().unwrap_or(rest);
    }
    s
}

/// Every track id in a playlist, in playlist order. Follows pagination and
/// skips items without an id (local files, removed tracks).
pub fn playlist_track_ids(api: &dyn StreamingApi, playlist: &str) -> Result<Vec<String>, FetchError> {
    let mut ids = Vec::new();
    let mut skipped = 0usize;
    let mut next: Option<String> = None;

    loop {
        let page = api.playlist_page(playlist, next.as_deref())?;
        for item in page.items {
            match item.track.and_then(|t| t.id) {
                Some(id) => ids.push(id),
                None => skipped += 1,
            }
        }
        match page.next {
            Some(url) => next = Some(url),
            None => break,
        }
    }

    if skipped > 0 {
        log::info!("{playlist}: skipped {skipped} items without a track id");
    }
    Ok(ids)
}

/// Fetch metadata, audio features and genres for one track.
///
/// Artist shown is the album's first artist; genres come from the track's
/// first artist.
pub fn fetch_track(api: &dyn StreamingApi, id: &str) -> Result<RawTrack, FetchError> {
    let track = api.track(id)?;
    let features = api.audio_features(id)?;

    let genres = match track.artists.first().and_then(|a| a.id.as_deref()) {
        Some(artist_id) => api.artist(artist_id)?.genres,
        None => Vec::new(),
    };

    let artist = track
        .album
        .artists
        .first()
        .or(track.artists.first())
        .map(|a| a.name.clone())
        .ok_or_else(|| FetchError::Missing(format!("track {id} has no artist")))?;

    Ok(RawTrack {
        track_id: id.to_string(),
        title: track.name,
        artist,
        release_date: track.album.release_date,
        genres,
        duration_ms: track.duration_ms,
        popularity: track.popularity,
        danceability: features.danceability,
        energy: features.energy,
        tempo: features.tempo,
        key: features.key,
        time_signature: features.time_signature,
        valence: features.valence,
        feature_ref: features.track_href,
    })
}

/// Cache behaviour for a collection run.
pub struct CollectOptions {
    /// Cached tracks older than this are fetched again.
    pub ttl_days: i64,
    /// Ignore the cache entirely.
    pub refresh: bool,
}

/// Result of a collection run.
#[derive(Debug, Default)]
pub struct CollectResult {
    pub playlists: usize,
    pub tracks: usize,
    pub fetched: usize,
    pub cached: usize,
    /// Refetch failed but an older cached copy was kept.
    pub stale: usize,
    pub errors: usize,
}

/// Collect each (playlist, owner) pair into the track cache, recording the
/// playlist's membership in order.
///
/// A track that fails to fetch keeps its cached row if there is one. A track
/// that is missing or has no audio features is skipped. Any other failure
/// aborts the run before the playlist's stored membership is replaced.
pub fn collect_playlists(
    api: &dyn StreamingApi,
    db: &Database,
    playlists: &[(String, String)],
    opts: &CollectOptions,
) -> Result<CollectResult> {
    let mut result = CollectResult::default();

    for (raw_id, owner) in playlists {
        let pid = playlist_id(raw_id);
        let ids = playlist_track_ids(api, pid)
            .with_context(|| format!("Failed to list playlist {pid}"))?;
        println!("Playlist {pid} ({owner}): {} tracks", ids.len());

        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} tracks ({eta} remaining) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        let mut members = Vec::with_capacity(ids.len());
        for id in &ids {
            let cached = if opts.refresh {
                None
            } else {
                db.get_cached_track(id, opts.ttl_days)
                    .context("Failed to read track cache")?
            };

            match cached {
                Some(_) => {
                    result.cached += 1;
                    members.push(id.clone());
                }
                None => match fetch_track(api, id) {
                    Ok(track) => {
                        pb.set_message(track.title.clone());
                        db.store_track(&track)
                            .with_context(|| format!("Failed to cache track {id}"))?;
                        result.fetched += 1;
                        members.push(id.clone());
                    }
                    Err(e) => {
                        let stale = db
                            .get_track(id)
                            .context("Failed to read track cache")?;
                        if stale.is_some() {
                            log::warn!("Keeping cached copy of track {id}: {e}");
                            result.stale += 1;
                            members.push(id.clone());
                        } else if e.is_not_found() {
                            log::warn!("Skipping track {id}: {e}");
                            result.errors += 1;
                        } else {
                            pb.finish_and_clear();
                            return Err(e).with_context(|| {
                                format!("Failed to fetch track {id} of playlist {pid}")
                            });
                        }
                    }
                },
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        db.set_playlist_tracks(pid, owner, &members)
            .with_context(|| format!("Failed to store playlist {pid}"))?;
        result.playlists += 1;
        result.tracks += members.len();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::models::{ApiAlbum, ApiArtistRef, ItemTrack, PlaylistItem};
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Two-page playlist; track "t-bad" has no audio features. Ids in
    /// `track_status` fail with that HTTP status.
    struct FakeApi {
        pages: HashMap<Option<String>, PlaylistTracksPage>,
        track_calls: Cell<usize>,
        track_status: RefCell<HashMap<String, u16>>,
    }

    fn item(id: Option<&str>) -> PlaylistItem {
        PlaylistItem {
            track: Some(ItemTrack { id: id.map(String::from) }),
        }
    }

    impl FakeApi {
        fn new() -> Self {
            let mut pages = HashMap::new();
            pages.insert(
                None,
                PlaylistTracksPage {
                    items: vec![item(Some("t1")), item(None), item(Some("t2"))],
                    next: Some("page-2".to_string()),
                },
            );
            pages.insert(
                Some("page-2".to_string()),
                PlaylistTracksPage {
                    items: vec![item(Some("t-bad")), PlaylistItem { track: None }, item(Some("t3"))],
                    next: None,
                },
            );
            Self {
                pages,
                track_calls: Cell::new(0),
                track_status: RefCell::new(HashMap::new()),
            }
        }
    }

    impl StreamingApi for FakeApi {
        fn playlist_page(&self, _p: &str, next: Option<&str>) -> Result<PlaylistTracksPage, FetchError> {
            let page = self.pages.get(&next.map(String::from)).ok_or(FetchError::Status {
                status: 404,
                url: "x".into(),
            })?;
            Ok(PlaylistTracksPage {
                items: page
                    .items
                    .iter()
                    .map(|i| PlaylistItem {
                        track: i.track.as_ref().map(|t| ItemTrack { id: t.id.clone() }),
                    })
                    .collect(),
                next: page.next.clone(),
            })
        }

        fn track(&self, id: &str) -> Result<ApiTrack, FetchError> {
            self.track_calls.set(self.track_calls.get() + 1);
            if let Some(&status) = self.track_status.borrow().get(id) {
                return Err(FetchError::Status {
                    status,
                    url: format!("https://api.spotify.com/v1/tracks/{id}"),
                });
            }
            Ok(ApiTrack {
                name: format!("Song {id}"),
                duration_ms: 180_000,
                popularity: 40,
                artists: vec![ApiArtistRef { id: Some("a1".into()), name: "Track Artist".into() }],
                album: ApiAlbum {
                    release_date: "1975-03-01".into(),
                    artists: vec![ApiArtistRef { id: Some("a1".into()), name: "Album Artist".into() }],
                },
            })
        }

        fn audio_features(&self, id: &str) -> Result<AudioFeatures, FetchError> {
            if id == "t-bad" {
                return Err(FetchError::Missing(format!("no audio features for {id}")));
            }
            Ok(AudioFeatures {
                danceability: 0.6,
                energy: 0.7,
                tempo: 110.0,
                key: 2,
                time_signature: 4,
                valence: 0.3,
                track_href: format!("https://api.spotify.com/v1/tracks/{id}"),
            })
        }

        fn artist(&self, _id: &str) -> Result<ApiArtist, FetchError> {
            Ok(ApiArtist { genres: vec!["glam rock".into()] })
        }
    }

    #[test]
    fn test_playlist_id() {
        assert_eq!(playlist_id("spotify:playlist:4EhBYkl4jtI2POrkUxU6Ul"), "4EhBYkl4jtI2POrkUxU6Ul");
        assert_eq!(
            playlist_id("https://open.spotify.com/playlist/4EhBYkl4jtI2POrkUxU6Ul?si=abc"),
            "4EhBYkl4jtI2POrkUxU6Ul"
        );
        assert_eq!(playlist_id("4EhBYkl4jtI2POrkUxU6Ul"), "4EhBYkl4jtI2POrkUxU6Ul");
    }

    #[test]
    fn test_pagination_and_skips() {
        let api = FakeApi::new();
        let ids = playlist_track_ids(&api, "p").unwrap();
        assert_eq!(ids, vec!["t1", "t2", "t-bad", "t3"]);
    }

    #[test]
    fn test_fetch_track_fields() {
        let api = FakeApi::new();
        let t = fetch_track(&api, "t1").unwrap();
        assert_eq!(t.title, "Song t1");
        assert_eq!(t.artist, "Album Artist");
        assert_eq!(t.genres, vec!["glam rock"]);
        assert_eq!(t.release_date, "1975-03-01");
        assert_eq!(t.key, 2);
        assert!(fetch_track(&api, "t-bad").is_err());
    }

    #[test]
    fn test_collect_uses_cache_and_skips_failures() {
        let api = FakeApi::new();
        let db = Database::open_in_memory().unwrap();
        let playlists = vec![("spotify:playlist:p".to_string(), "owner".to_string())];
        let opts = CollectOptions { ttl_days: 30, refresh: false };

        let first = collect_playlists(&api, &db, &playlists, &opts).unwrap();
        assert_eq!(first.fetched, 3);
        assert_eq!(first.errors, 1);
        assert_eq!(first.tracks, 3);
        assert_eq!(api.track_calls.get(), 4);

        let second = collect_playlists(&api, &db, &playlists, &opts).unwrap();
        assert_eq!(second.cached, 3);
        assert_eq!(second.fetched, 0);
        // Only the failed track is retried
        assert_eq!(api.track_calls.get(), 5);

        let stored = db.get_playlist_tracks("p").unwrap();
        let ids: Vec<&str> = stored.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_refresh_bypasses_cache() {
        let api = FakeApi::new();
        let db = Database::open_in_memory().unwrap();
        let playlists = vec![("p".to_string(), "owner".to_string())];

        collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: false }).unwrap();
        let again = collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: true }).unwrap();
        assert_eq!(again.cached, 0);
        assert_eq!(again.fetched, 3);
    }

    #[test]
    fn test_failed_refresh_keeps_cached_members() {
        let api = FakeApi::new();
        let db = Database::open_in_memory().unwrap();
        let playlists = vec![("p".to_string(), "owner".to_string())];
        collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: false }).unwrap();

        api.track_status.borrow_mut().insert("t1".into(), 429);
        api.track_status.borrow_mut().insert("t2".into(), 500);
        let again = collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: true }).unwrap();
        assert_eq!(again.stale, 2);
        assert_eq!(again.fetched, 1);
        assert_eq!(again.tracks, 3);

        let stored = db.get_playlist_tracks("p").unwrap();
        let ids: Vec<&str> = stored.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_transient_error_aborts_without_replacing_membership() {
        let api = FakeApi::new();
        let db = Database::open_in_memory().unwrap();
        let playlists = vec![("p".to_string(), "owner".to_string())];

        api.track_status.borrow_mut().insert("t2".into(), 429);
        assert!(collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: false }).is_err());
        assert!(db.list_playlists().unwrap().is_empty());

        // A 404 is a missing track, so it is skipped like t-bad
        api.track_status.borrow_mut().insert("t2".into(), 404);
        let result = collect_playlists(&api, &db, &playlists, &CollectOptions { ttl_days: 30, refresh: false }).unwrap();
        assert_eq!(result.errors, 2);
        assert_eq!(result.tracks, 2);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(FetchError::Missing("gone".into()).is_not_found());
        assert!(FetchError::Status { status: 404, url: "u".into() }.is_not_found());
        assert!(!FetchError::Status { status: 429, url: "u".into() }.is_not_found());
        assert!(!FetchError::Transport("reset".into()).is_not_found());
    }
}
