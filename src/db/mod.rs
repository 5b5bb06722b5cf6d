pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Malformed genres column: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Local cache of fetched tracks and playlist membership.
pub struct Database {
    pub conn: Connection,
}

/// Schema version this build writes.
const SCHEMA_VERSION: i32 = 1;

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: tracks, playlists, ordered membership
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tracks (
                track_id        TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                artist          TEXT NOT NULL,
                release_date    TEXT NOT NULL,
                genres          TEXT NOT NULL DEFAULT '[]',  -- JSON array
                duration_ms     INTEGER NOT NULL,
                popularity      INTEGER NOT NULL,

                -- Audio features
                danceability    REAL NOT NULL,
                energy          REAL NOT NULL,
                tempo           REAL NOT NULL,
                musical_key     INTEGER NOT NULL,
                time_signature  INTEGER NOT NULL,
                valence         REAL NOT NULL,
                feature_ref     TEXT NOT NULL,

                fetched_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS playlists (
                playlist_id     TEXT PRIMARY KEY,
                owner           TEXT NOT NULL,
                collected_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS playlist_tracks (
                playlist_id     TEXT NOT NULL REFERENCES playlists(playlist_id) ON DELETE CASCADE,
                position        INTEGER NOT NULL,
                track_id        TEXT NOT NULL REFERENCES tracks(track_id),
                PRIMARY KEY (playlist_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_playlist_tracks_track ON playlist_tracks(track_id);
            ",
        )?;
        Ok(())
    }
}
