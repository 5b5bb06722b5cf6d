use super::models::{CacheStats, PlaylistSummary};
use super::{Database, Result};
use crate::catalog::RawTrack;
use rusqlite::{params, OptionalExtension, Row};

const TRACK_COLUMNS: &str = "t.track_id, t.title, t.artist, t.release_date, t.genres,
     t.duration_ms, t.popularity, t.danceability, t.energy, t.tempo,
     t.musical_key, t.time_signature, t.valence, t.feature_ref";

/// Map a row selected with `TRACK_COLUMNS`. Genres come back as raw JSON and
/// are decoded by the caller.
fn track_from_row(row: &Row) -> rusqlite::Result<(RawTrack, String)> {
    Ok((
        RawTrack {
            track_id: row.get(0)?,
            title: row.get(1)?,
            artist: row.get(2)?,
            release_date: row.get(3)?,
            genres: Vec::new(),
            duration_ms: row.get(5)?,
            popularity: row.get(6)?,
            danceability: row.get(7)?,
            energy: row.get(8)?,
            tempo: row.get(9)?,
            key: row.get(10)?,
            time_signature: row.get(11)?,
            valence: row.get(12)?,
            feature_ref: row.get(13)?,
        },
        row.get(4)?,
    ))
}

fn with_genres((mut track, genres): (RawTrack, String)) -> Result<RawTrack> {
    track.genres = serde_json::from_str(&genres)?;
    Ok(track)
}

impl Database {
    /// Insert or replace a fetched track, stamping it as fetched now.
    pub fn store_track(&self, t: &RawTrack) -> Result<()> {
        let genres = serde_json::to_string(&t.genres)?;
        self.conn.execute(
            "INSERT INTO tracks (
                track_id, title, artist, release_date, genres,
                duration_ms, popularity, danceability, energy, tempo,
                musical_key, time_signature, valence, feature_ref, fetched_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, datetime('now')
            )
            ON CONFLICT(track_id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                release_date = excluded.release_date,
                genres = excluded.genres,
                duration_ms = excluded.duration_ms,
                popularity = excluded.popularity,
                danceability = excluded.danceability,
                energy = excluded.energy,
                tempo = excluded.tempo,
                musical_key = excluded.musical_key,
                time_signature = excluded.time_signature,
                valence = excluded.valence,
                feature_ref = excluded.feature_ref,
                fetched_at = datetime('now')
            ",
            params![
                t.track_id, t.title, t.artist, t.release_date, genres,
                t.duration_ms, t.popularity, t.danceability, t.energy, t.tempo,
                t.key, t.time_signature, t.valence, t.feature_ref,
            ],
        )?;
        Ok(())
    }

    /// A cached track fetched within the last `ttl_days` days, if any.
    pub fn get_cached_track(&self, track_id: &str, ttl_days: i64) -> Result<Option<RawTrack>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks t
             WHERE t.track_id = ?1 AND t.fetched_at >= datetime('now', ?2)"
        );
        let row = self
            .conn
            .query_row(&sql, params![track_id, format!("-{ttl_days} days")], track_from_row)
            .optional()?;
        row.map(with_genres).transpose()
    }

    /// A cached track regardless of age.
    pub fn get_track(&self, track_id: &str) -> Result<Option<RawTrack>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.track_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![track_id], track_from_row)
            .optional()?;
        row.map(with_genres).transpose()
    }

    /// Replace a playlist's membership with `track_ids`, in order.
    pub fn set_playlist_tracks(&self, playlist_id: &str, owner: &str, track_ids: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO playlists (playlist_id, owner, collected_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(playlist_id) DO UPDATE SET
                owner = excluded.owner,
                collected_at = excluded.collected_at",
            params![playlist_id, owner],
        )?;
        tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO playlist_tracks (playlist_id, position, track_id) VALUES (?1, ?2, ?3)",
            )?;
            for (pos, id) in track_ids.iter().enumerate() {
                stmt.execute(params![playlist_id, pos as i64, id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Tracks of one cached playlist in playlist order.
    pub fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<RawTrack>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS}
             FROM playlist_tracks pt
             JOIN tracks t ON t.track_id = pt.track_id
             WHERE pt.playlist_id = ?1
             ORDER BY pt.position"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![playlist_id], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(with_genres).collect()
    }

    /// Tracks of several playlists concatenated in the given playlist order.
    /// Duplicates across playlists are kept; the catalog builder drops them.
    pub fn get_tracks_for_playlists(&self, playlist_ids: &[String]) -> Result<Vec<RawTrack>> {
        let mut all = Vec::new();
        for id in playlist_ids {
            let tracks = self.get_playlist_tracks(id)?;
            if tracks.is_empty() {
                log::warn!("Playlist {id} has no cached tracks; run `collect` first");
            }
            all.extend(tracks);
        }
        Ok(all)
    }

    pub fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.playlist_id, p.owner, COUNT(pt.track_id), p.collected_at
             FROM playlists p
             LEFT JOIN playlist_tracks pt ON pt.playlist_id = p.playlist_id
             GROUP BY p.playlist_id
             ORDER BY p.playlist_id",
        )?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(PlaylistSummary {
                    playlist_id: row.get(0)?,
                    owner: row.get(1)?,
                    track_count: row.get(2)?,
                    collected_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        let total_tracks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks",
            [],
            |row| row.get(0),
        )?;

        let total_playlists: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM playlists",
            [],
            |row| row.get(0),
        )?;

        let undated_tracks: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE TRIM(release_date) = ''",
            [],
            |row| row.get(0),
        )?;

        let (oldest_fetch, newest_fetch): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(fetched_at), MAX(fetched_at) FROM tracks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut genre_stmt = self.conn.prepare(
            "SELECT g.value, COUNT(*)
             FROM tracks t, json_each(t.genres) g
             GROUP BY g.value
             ORDER BY COUNT(*) DESC, g.value
             LIMIT 15",
        )?;
        let genres: Vec<(String, i64)> = genre_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CacheStats {
            total_tracks,
            total_playlists,
            undated_tracks,
            oldest_fetch,
            newest_fetch,
            genres,
        })
    }
}
