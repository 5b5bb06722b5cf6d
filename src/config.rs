use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::reconcile::MatchSettings;

pub const CLIENT_ID_ENV: &str = "CHARTLINK_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CHARTLINK_CLIENT_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "no API credentials: set [credentials] in the config file or CHARTLINK_CLIENT_ID/CHARTLINK_CLIENT_SECRET"
    )]
    MissingCredentials,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Application configuration loaded from TOML config file.
/// Everything except the API credentials has a default, so the file is optional
/// for commands that work offline.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Client-credentials pair for the streaming API.
    pub credentials: Option<Credentials>,
    /// Playlists to analyze, in file order.
    pub playlists: Vec<PlaylistEntry>,
    /// Reference playlists for audio-feature comparison, same shape as `playlists`.
    pub baseline: Vec<PlaylistEntry>,
    pub chart: ChartConfig,
    pub matching: MatchingConfig,
    pub cache: CacheConfig,
}

/// One `[[playlists]]` or `[[baseline]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    /// Playlist id, `spotify:playlist:` URI or open.spotify.com URL.
    pub id: String,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Chart scraper settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Most recent chart page; the walk goes backward from here.
    pub start_url: String,
    /// Prefix for relative "prev" links.
    pub base_url: String,
    /// Chart log CSV (overrides XDG default).
    pub log_path: Option<PathBuf>,
    /// Delay between page fetches in milliseconds.
    pub delay_ms: u64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            start_url: "https://www.officialcharts.com/charts/singles-chart/".to_string(),
            base_url: "https://www.officialcharts.com/".to_string(),
            log_path: None,
            delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Fractional cutoff for candidate generation.
    pub candidate_threshold: f64,
    /// 0-100 cutoff a best match must exceed.
    pub accept_threshold: f64,
    /// Chart rows per matching batch.
    pub chunksize: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let d = MatchSettings::default();
        Self {
            candidate_threshold: d.candidate_threshold,
            accept_threshold: d.accept_threshold,
            chunksize: d.chunksize,
        }
    }
}

impl MatchingConfig {
    pub fn settings(&self) -> MatchSettings {
        MatchSettings {
            candidate_threshold: self.candidate_threshold,
            accept_threshold: self.accept_threshold,
            chunksize: self.chunksize,
        }
    }
}

/// Track cache settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Cached tracks older than this many days are fetched again.
    pub ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            ttl_days: 30,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/chartlink/config.toml`.
    /// Returns default config if the file doesn't exist. A file that exists but
    /// can't be read or parsed is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// API credentials, with the environment taking precedence over the file.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        resolve_credentials(
            self.credentials.as_ref(),
            std::env::var(CLIENT_ID_ENV).ok(),
            std::env::var(CLIENT_SECRET_ENV).ok(),
        )
    }

    /// Configured playlists as (id, owner) pairs.
    pub fn playlist_pairs(&self) -> Vec<(String, String)> {
        pairs(&self.playlists)
    }

    pub fn baseline_pairs(&self) -> Vec<(String, String)> {
        pairs(&self.baseline)
    }

    pub fn db_path(&self) -> PathBuf {
        self.cache.db_path.clone().unwrap_or_else(default_db_path)
    }

    pub fn chart_log_path(&self) -> PathBuf {
        self.chart.log_path.clone().unwrap_or_else(default_chart_log_path)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn pairs(entries: &[PlaylistEntry]) -> Vec<(String, String)> {
    entries.iter().map(|e| (e.id.clone(), e.owner.clone())).collect()
}

fn resolve_credentials(
    file: Option<&Credentials>,
    env_id: Option<String>,
    env_secret: Option<String>,
) -> Result<Credentials, ConfigError> {
    let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    let client_id = non_empty(env_id).or_else(|| non_empty(file.map(|c| c.client_id.clone())));
    let client_secret =
        non_empty(env_secret).or_else(|| non_empty(file.map(|c| c.client_secret.clone())));

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Credentials {
            client_id,
            client_secret,
        }),
        _ => Err(ConfigError::MissingCredentials),
    }
}

fn data_file(name: &str) -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join(name)
    } else {
        // Fallback: current directory
        PathBuf::from(name)
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    data_file("chartlink.db")
}

/// Resolve the default chart log path using XDG data directory.
pub fn default_chart_log_path() -> PathBuf {
    data_file("chart_log.csv")
}
