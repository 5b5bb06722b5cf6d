use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("chart log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("chart log CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("chart log not found at {0} (run `chartlink scrape` first)")]
    Missing(PathBuf),
}

/// One (week, position) observation scraped from a chart page.
///
/// Field order is the on-disk column order of the headerless log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub week_start: String,
    pub chart_position: i32,
    pub artist: String,
    pub title: String,
}

impl ChartRow {
    /// Text used for fuzzy matching against catalog entries.
    pub fn match_key(&self) -> String {
        format!("{} {}", self.title, self.artist)
    }
}

/// Append-only, headerless CSV log of scraped chart rows.
///
/// Rows are never deduplicated: scraping the same weeks twice writes them twice.
pub struct ChartLog {
    path: PathBuf,
}

impl ChartLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append rows to the end of the log, creating it if needed.
    pub fn append(&self, rows: &[ChartRow]) -> Result<usize, LogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| LogError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LogError::Io {
                path: self.path.clone(),
                source,
            })?;

        let mut wr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            wr.serialize(row)?;
        }
        wr.flush().map_err(|source| LogError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(rows.len())
    }

    /// Read every row in file order. Columns are assigned positionally.
    pub fn read_all(&self) -> Result<Vec<ChartRow>, LogError> {
        if !self.path.exists() {
            return Err(LogError::Missing(self.path.clone()));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let rows = rdr
            .deserialize::<ChartRow>()
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Read {} chart rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    /// Truncate the log. Callers decide when a fresh walk is wanted.
    pub fn clear(&self) -> Result<(), LogError> {
        if self.path.exists() {
            std::fs::write(&self.path, b"").map_err(|source| LogError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
