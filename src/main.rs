use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use chartlink::analysis::{self, Feature};
use chartlink::catalog::{self, Catalog};
use chartlink::chart::{self, ChartLog, ChartRow, HttpPageSource, ScrapeSettings, StopReason};
use chartlink::collector::{self, CollectOptions, SpotifyClient};
use chartlink::config::AppConfig;
use chartlink::db::Database;
use chartlink::matching::NgramMatcher;
use chartlink::reconcile::{self, Reconciliation};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chartlink", version, about = "Playlist vs. singles-chart history analyzer")]
struct Cli {
    /// Path to the SQLite track cache
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Path to the chart log CSV
    #[arg(long, global = true)]
    chart_log: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FeatureName {
    Valence,
    Danceability,
    Energy,
    Tempo,
}

impl From<FeatureName> for Feature {
    fn from(f: FeatureName) -> Self {
        match f {
            FeatureName::Valence => Feature::Valence,
            FeatureName::Danceability => Feature::Danceability,
            FeatureName::Energy => Feature::Energy,
            FeatureName::Tempo => Feature::Tempo,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch playlist tracks and audio features into the local cache
    Collect {
        /// Also collect the baseline playlists from the config file
        #[arg(long)]
        baseline: bool,

        /// Re-fetch tracks even if cached within the TTL
        #[arg(long)]
        refresh: bool,
    },

    /// Walk back through weekly singles charts, appending to the chart log
    Scrape {
        /// Chart page to start from (defaults to config chart.start_url)
        #[arg(long)]
        start_url: Option<String>,

        /// Truncate the chart log before scraping
        #[arg(long)]
        fresh: bool,

        /// Delay between page fetches in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show the normalized catalog: release years, decades, most popular
    Catalog {
        /// Playlists to include (defaults to config playlists)
        playlists: Vec<String>,

        /// Number of popular tracks to list
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Match the catalog against the chart log and show best positions per decade
    Reconcile {
        /// Playlists to include (defaults to config playlists)
        playlists: Vec<String>,

        /// Similarity (0-100) a best match must exceed
        #[arg(long)]
        accept_threshold: Option<f64>,

        /// Fractional cutoff for candidate generation
        #[arg(long)]
        candidate_threshold: Option<f64>,

        /// Chart rows per matching batch
        #[arg(long)]
        chunksize: Option<usize>,

        /// Also list the best position per chart year
        #[arg(long)]
        yearly: bool,
    },

    /// Summarize an audio feature per release decade against the baseline
    Features {
        /// Which feature to summarize
        #[arg(value_enum, default_value = "valence")]
        feature: FeatureName,

        /// Playlists to include (defaults to config playlists)
        #[arg(short, long)]
        playlist: Vec<String>,
    },

    /// Show cache and chart log statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Config file is optional, but a broken one is fatal
    let config = AppConfig::load().context("Failed to load config")?;

    // Resolve paths: CLI > config > XDG default
    let db_path = cli.db_path.unwrap_or_else(|| config.db_path());
    let chart_log = ChartLog::new(cli.chart_log.unwrap_or_else(|| config.chart_log_path()));
    log::info!("Database: {}", db_path.display());
    log::info!("Chart log: {}", chart_log.path().display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Collect { baseline, refresh } => {
            let mut playlists = config.playlist_pairs();
            if baseline {
                playlists.extend(config.baseline_pairs());
            }
            if playlists.is_empty() {
                anyhow::bail!("No playlists configured. Add [[playlists]] entries to the config file.");
            }

            let credentials = config.credentials()?;
            let client = SpotifyClient::new(&credentials);
            let opts = CollectOptions {
                ttl_days: config.cache.ttl_days,
                refresh,
            };
            let result = collector::collect_playlists(&client, &db, &playlists, &opts)
                .context("Collection failed")?;
            println!(
                "Collection complete: {} playlists, {} tracks ({} fetched, {} cached, {} stale), {} errors",
                result.playlists, result.tracks, result.fetched, result.cached, result.stale, result.errors
            );
        }

        Commands::Scrape {
            start_url,
            fresh,
            delay_ms,
        } => {
            if fresh && chart_log.exists() {
                chart_log.clear().context("Failed to truncate chart log")?;
                println!("Cleared {}", chart_log.path().display());
            }

            let start_url = start_url.unwrap_or_else(|| config.chart.start_url.clone());
            let settings = ScrapeSettings {
                base_url: config.chart.base_url.clone(),
                delay_ms: delay_ms.unwrap_or(config.chart.delay_ms),
            };
            let source = HttpPageSource::new();
            let result = chart::scrape_from(&source, &start_url, &chart_log, &settings)
                .context("Chart scrape failed")?;

            let reason = match result.stop_reason {
                StopReason::NoPreviousLink => "no earlier chart".to_string(),
                StopReason::EndOfData(status) => format!("HTTP {status}"),
                StopReason::Revisited(url) => format!("{url} already scraped"),
            };
            println!(
                "Scrape complete: {} pages, {} rows written, stopped at {} ({})",
                result.pages,
                result.rows_written,
                result.oldest_week.as_deref().unwrap_or("-"),
                reason
            );
            if let Some(url) = &result.last_url {
                log::info!("Last page: {url}");
            }
        }

        Commands::Catalog { playlists, limit } => {
            let ids = playlist_ids(&playlists, &config)?;
            let catalog = load_catalog(&db, &ids)?;
            println!("Catalog: {} tracks from {} playlists", catalog.len(), ids.len());
            println!();

            print_counts("Songs per release year", &analysis::release_year_counts(&catalog));
            print_counts("Songs per release decade", &analysis::release_decade_counts(&catalog));

            println!("Most popular");
            print_track_table(&analysis::top_by_popularity(&catalog, limit));
        }

        Commands::Reconcile {
            playlists,
            accept_threshold,
            candidate_threshold,
            chunksize,
            yearly,
        } => {
            let ids = playlist_ids(&playlists, &config)?;
            let catalog = load_catalog(&db, &ids)?;
            let rows = load_chart_rows(&chart_log)?;

            let mut settings = config.matching.settings();
            if let Some(t) = accept_threshold {
                settings.accept_threshold = t;
            }
            if let Some(t) = candidate_threshold {
                settings.candidate_threshold = t;
            }
            if let Some(c) = chunksize {
                settings.chunksize = c;
            }

            let rec = reconcile::reconcile(&rows, &catalog, &NgramMatcher::default(), &settings);
            println!(
                "Matched {} of {} tracks against {} chart rows (similarity > {})",
                rec.matches.len(),
                catalog.len(),
                rows.len(),
                settings.accept_threshold
            );
            println!();

            print_charted_split(&catalog, &rec);
            print_counts(
                "Charted songs per chart decade",
                &analysis::chart_decade_counts(&rec.occurrences),
            );
            print_occurrence_table(&catalog, &rec);
            if yearly {
                println!();
                print_yearly_table(&catalog, &rec);
            }
        }

        Commands::Features { feature, playlist } => {
            let feature = Feature::from(feature);
            let ids = playlist_ids(&playlist, &config)?;
            let catalog = load_catalog(&db, &ids)?;

            println!("{} by release decade", feature.label());
            println!(
                "{:<8} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
                "Decade", "N", "Mean", "Min", "Q1", "Median", "Q3", "Max"
            );
            println!("{}", "-".repeat(70));
            for (decade, s) in analysis::feature_by_decade(&catalog, feature) {
                println!(
                    "{:<8} {:>5} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
                    format!("{decade}s"),
                    s.count,
                    s.mean,
                    s.min,
                    s.q1,
                    s.median,
                    s.q3,
                    s.max
                );
            }

            let baseline_ids: Vec<String> = config
                .baseline_pairs()
                .iter()
                .map(|(id, _)| collector::playlist_id(id).to_string())
                .collect();
            if baseline_ids.is_empty() {
                println!();
                println!("(no baseline playlists configured)");
            } else {
                let baseline = load_catalog(&db, &baseline_ids)?;
                println!();
                println!("Against baseline ({} tracks)", baseline.len());
                println!("{:<8} {:>9} {:>9} {:>9}", "Decade", "Catalog", "Baseline", "Delta");
                println!("{}", "-".repeat(38));
                for row in analysis::compare_to_baseline(&catalog, &baseline, feature) {
                    println!(
                        "{:<8} {:>9} {:>9} {:>9}",
                        format!("{}s", row.decade),
                        fmt_opt(row.catalog_mean),
                        fmt_opt(row.baseline_mean),
                        fmt_opt(row.delta()),
                    );
                }
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Cache Statistics");
            println!("================");
            println!("Tracks:           {}", stats.total_tracks);
            println!("Playlists:        {}", stats.total_playlists);
            println!("Undated tracks:   {}", stats.undated_tracks);
            if let (Some(oldest), Some(newest)) = (&stats.oldest_fetch, &stats.newest_fetch) {
                println!("Fetched:          {oldest} .. {newest}");
            }
            println!();

            let playlists = db.list_playlists().context("Failed to list playlists")?;
            if !playlists.is_empty() {
                println!("Playlists:");
                for p in &playlists {
                    println!(
                        "  {:<24} {:<20} {:>5} tracks  ({})",
                        p.playlist_id, p.owner, p.track_count, p.collected_at
                    );
                }
                println!();
            }

            if !stats.genres.is_empty() {
                println!("Genres:");
                for (genre, count) in &stats.genres {
                    println!("  {:<30} {}", genre, count);
                }
                println!();
            }

            if chart_log.exists() {
                let rows = load_chart_rows(&chart_log)?;
                let weeks: std::collections::HashSet<&str> =
                    rows.iter().map(|r| r.week_start.as_str()).collect();
                println!("Chart log:        {} rows, {} weeks", rows.len(), weeks.len());
            } else {
                println!("Chart log:        (none, run `scrape`)");
            }
        }
    }

    Ok(())
}

/// Playlist ids from the command line, or the configured playlists.
fn playlist_ids(args: &[String], config: &AppConfig) -> Result<Vec<String>> {
    let ids: Vec<String> = if !args.is_empty() {
        args.iter().map(|p| collector::playlist_id(p).to_string()).collect()
    } else {
        config
            .playlist_pairs()
            .iter()
            .map(|(id, _)| collector::playlist_id(id).to_string())
            .collect()
    };
    if ids.is_empty() {
        anyhow::bail!("No playlists given. Pass playlist ids or add [[playlists]] entries to the config.");
    }
    Ok(ids)
}

fn load_catalog(db: &Database, ids: &[String]) -> Result<Catalog> {
    let raw = db
        .get_tracks_for_playlists(ids)
        .context("Failed to read cached tracks")?;
    Ok(catalog::normalize(raw))
}

fn load_chart_rows(chart_log: &ChartLog) -> Result<Vec<ChartRow>> {
    chart_log
        .read_all()
        .with_context(|| format!("Failed to read chart log {}", chart_log.path().display()))
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_counts(title: &str, counts: &std::collections::BTreeMap<i32, usize>) {
    println!("{title}");
    for (k, n) in counts {
        println!("  {:<6} {:>4}  {}", k, n, "#".repeat(*n));
    }
    println!();
}

fn print_track_table(tracks: &[&catalog::TrackRecord]) {
    println!("{:<30} {:<24} {:>6} {:>4}", "Title", "Artist", "Year", "Pop");
    println!("{}", "-".repeat(67));
    for t in tracks {
        println!(
            "{:<30} {:<24} {:>6} {:>4}",
            truncate(&t.title, 30),
            truncate(&t.artist, 24),
            t.release_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
            t.popularity
        );
    }
    println!();
}

fn print_charted_split(catalog: &Catalog, rec: &Reconciliation) {
    println!("Charted by release decade");
    println!("  {:<6} {:>8} {:>12}", "Decade", "Charted", "Not charted");
    for (decade, split) in analysis::charted_by_release_decade(catalog, rec) {
        println!("  {:<6} {:>8} {:>12}", decade, split.charted, split.not_charted);
    }
    println!();
}

/// Best position per (track, chart decade).
fn print_occurrence_table(catalog: &Catalog, rec: &Reconciliation) {
    println!(
        "{:<30} {:<22} {:>6} {:>6} {:>4}  {}",
        "Title", "Artist", "Rel", "Decade", "Pos", "Week"
    );
    println!("{}", "-".repeat(90));
    for (t, o) in rec.joined(catalog) {
        println!(
            "{:<30} {:<22} {:>6} {:>6} {:>4}  {}",
            truncate(&t.title, 30),
            truncate(&t.artist, 22),
            t.release_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into()),
            o.chart_decade,
            o.best_position,
            o.week_start
        );
    }
}

fn print_yearly_table(catalog: &Catalog, rec: &Reconciliation) {
    println!("{:<30} {:<22} {:>6} {:>4}", "Title", "Artist", "Year", "Pos");
    println!("{}", "-".repeat(65));
    for p in &rec.yearly {
        let Some(t) = catalog.get(p.track) else {
            continue;
        };
        println!(
            "{:<30} {:<22} {:>6} {:>4}",
            truncate(&t.title, 30),
            truncate(&t.artist, 22),
            p.chart_year,
            p.best_position
        );
    }
}
