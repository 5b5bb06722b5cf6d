pub mod history;
pub mod page;

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

pub use self::history::{ChartLog, ChartRow};
use self::page::parse_page;

#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-success status: the oldest chart has been passed.
    #[error("end of chart history (HTTP {0})")]
    EndOfData(u16),
    #[error("request failed: {0}")]
    Transport(String),
}

/// Where chart page HTML comes from.
pub trait PageSource {
    fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Blocking HTTP page source.
pub struct HttpPageSource {
    agent: ureq::Agent,
}

impl HttpPageSource {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        log::debug!("Fetching {url}");
        match self.agent.get(url).call() {
            Ok(mut resp) => {
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::EndOfData(status.as_u16()));
                }
                resp.body_mut()
                    .read_to_string()
                    .map_err(|e| FetchError::Transport(e.to_string()))
            }
            Err(ureq::Error::StatusCode(code)) => Err(FetchError::EndOfData(code)),
            Err(e) => Err(FetchError::Transport(e.to_string())),
        }
    }
}

/// Scraper settings.
pub struct ScrapeSettings {
    /// Prefix for relative "prev" links.
    pub base_url: String,
    /// Pause between page fetches in milliseconds.
    pub delay_ms: u64,
}

/// Why the backward walk stopped. All are normal ends of history.
#[derive(Debug, PartialEq)]
pub enum StopReason {
    NoPreviousLink,
    EndOfData(u16),
    /// The "prev" link pointed at a page already scraped in this walk.
    Revisited(String),
}

/// Result of a chart walk.
#[derive(Debug)]
pub struct ScrapeResult {
    pub pages: usize,
    pub rows_written: usize,
    /// Last page successfully scraped; restart point for a resumed walk.
    pub last_url: Option<String>,
    pub oldest_week: Option<String>,
    pub stop_reason: StopReason,
}

/// Resolve a "prev" href against the site base URL.
fn resolve_link(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}

/// Walk backward through weekly chart pages from `start_url`, appending each
/// page's rows to `chart_log` as soon as the page is parsed.
///
/// Stops normally when a page has no "prev" link, a fetch returns a
/// non-success status, or the "prev" link leads back to a page already seen. Transport and log errors are propagated; rows from
/// pages already scraped stay in the log.
pub fn scrape_from(
    source: &dyn PageSource,
    start_url: &str,
    chart_log: &ChartLog,
    settings: &ScrapeSettings,
) -> Result<ScrapeResult> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} weeks {msg}")
            .unwrap(),
    );

    let mut result = ScrapeResult {
        pages: 0,
        rows_written: 0,
        last_url: None,
        oldest_week: None,
        stop_reason: StopReason::NoPreviousLink,
    };

    let mut next_url = Some(start_url.to_string());
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(url) = next_url.take() {
        if !visited.insert(url.clone()) {
            log::warn!("Stopping at {url}: page already scraped");
            result.stop_reason = StopReason::Revisited(url);
            break;
        }

        let html = match source.fetch(&url) {
            Ok(html) => html,
            Err(FetchError::EndOfData(status)) => {
                log::info!("Stopping at {url}: HTTP {status}");
                result.stop_reason = StopReason::EndOfData(status);
                break;
            }
            Err(e) => {
                pb.abandon();
                return Err(e).with_context(|| format!("Failed to fetch {url}"));
            }
        };

        let page = parse_page(&html).with_context(|| format!("Failed to parse {url}"))?;

        let written = chart_log
            .append(&page.rows)
            .with_context(|| format!("Failed to append rows for {}", page.week_start))?;
        log::debug!("{}: {written} rows", page.week_start);

        result.pages += 1;
        result.rows_written += written;
        result.last_url = Some(url);
        pb.set_message(page.week_start.clone());
        pb.inc(1);
        result.oldest_week = Some(page.week_start);

        match page.prev_href {
            Some(href) => {
                next_url = Some(resolve_link(&settings.base_url, &href));
                if settings.delay_ms > 0 {
                    thread::sleep(Duration::from_millis(settings.delay_ms));
                }
            }
            None => {
                result.stop_reason = StopReason::NoPreviousLink;
            }
        }
    }

    pb.finish_with_message("done");
    Ok(result)
}
