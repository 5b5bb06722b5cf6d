/// A cached playlist with its membership count.
#[derive(Debug, Clone)]
pub struct PlaylistSummary {
    pub playlist_id: String,
    pub owner: String,
    pub track_count: i64,
    pub collected_at: String,
}

/// Cache statistics.
pub struct CacheStats {
    pub total_tracks: i64,
    pub total_playlists: i64,
    /// Tracks with an empty release date.
    pub undated_tracks: i64,
    pub oldest_fetch: Option<String>,
    pub newest_fetch: Option<String>,
    /// Most common first-artist genres.
    pub genres: Vec<(String, i64)>,
}
