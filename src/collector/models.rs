//! Web API response shapes. Only the fields the collector reads are modelled.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// One page of a playlist's items.
#[derive(Debug, Deserialize)]
pub struct PlaylistTracksPage {
    pub items: Vec<PlaylistItem>,
    /// Absolute URL of the next page, if any.
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    /// Null for removed or unavailable tracks.
    pub track: Option<ItemTrack>,
}

#[derive(Debug, Deserialize)]
pub struct ItemTrack {
    /// Null for local files.
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTrack {
    pub name: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub popularity: i64,
    pub artists: Vec<ApiArtistRef>,
    pub album: ApiAlbum,
}

#[derive(Debug, Deserialize)]
pub struct ApiAlbum {
    #[serde(default)]
    pub release_date: String,
    pub artists: Vec<ApiArtistRef>,
}

#[derive(Debug, Deserialize)]
pub struct ApiArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiArtist {
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f64,
    pub energy: f64,
    pub tempo: f64,
    pub key: i32,
    pub time_signature: i32,
    pub valence: f64,
    pub track_href: String,
}
