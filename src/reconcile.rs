//! Reconcile catalog tracks against the chart log.
//!
//! Pipeline: fuzzy candidates → best candidate per catalog entry → acceptance
//! cutoff → expansion to every week the matched (artist, title) charted →
//! collapse to the best position per chart year and per chart decade.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::catalog::{Catalog, TrackRecord};
use crate::chart::ChartRow;
use crate::dates::{decade_of, parse_year};
use crate::matching::{MatchCandidate, NameMatcher};

/// Thresholds for the two filtering stages, kept independent.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Fractional cutoff used by the matcher for candidate generation.
    pub candidate_threshold: f64,
    /// 0-100 cutoff a best match must strictly exceed to be accepted.
    pub accept_threshold: f64,
    /// Chart rows compared per matcher batch.
    pub chunksize: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            candidate_threshold: 0.3,
            accept_threshold: 75.0,
            chunksize: 100_000,
        }
    }
}

/// Best chart position of a track within one chart year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyPeak {
    pub track: usize,
    pub chart_year: i32,
    pub week_start: String,
    pub best_position: i32,
}

/// Best chart position of a track within one chart decade.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartingOccurrence {
    pub track: usize,
    pub chart_decade: i32,
    /// Year and week of the best-ranked appearance.
    pub chart_year: i32,
    pub week_start: String,
    pub best_position: i32,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Accepted best match per catalog entry, ordered by catalog index.
    pub matches: Vec<MatchCandidate>,
    pub yearly: Vec<YearlyPeak>,
    pub occurrences: Vec<ChartingOccurrence>,
}

impl Reconciliation {
    /// Catalog indices with an accepted chart match.
    pub fn matched_tracks(&self) -> HashSet<usize> {
        self.matches.iter().map(|m| m.y).collect()
    }

    /// Occurrences joined with their catalog records.
    pub fn joined<'c>(
        &'c self,
        catalog: &'c Catalog,
    ) -> impl Iterator<Item = (&'c TrackRecord, &'c ChartingOccurrence)> + 'c {
        self.occurrences
            .iter()
            .filter_map(move |o| catalog.get(o.track).map(|r| (r, o)))
    }
}

/// Keep the highest-similarity candidate for each catalog entry `y`.
/// On ties the first candidate seen wins.
pub fn best_matches(
    batches: impl IntoIterator<Item = Vec<MatchCandidate>>,
) -> BTreeMap<usize, MatchCandidate> {
    let mut best: BTreeMap<usize, MatchCandidate> = BTreeMap::new();
    for batch in batches {
        for c in batch {
            match best.get(&c.y) {
                Some(current) if current.similarity >= c.similarity => {}
                _ => {
                    best.insert(c.y, c);
                }
            }
        }
    }
    best
}

/// Drop best matches whose similarity does not strictly exceed `threshold`.
pub fn accept(best: BTreeMap<usize, MatchCandidate>, threshold: f64) -> Vec<MatchCandidate> {
    best.into_values()
        .filter(|c| c.similarity > threshold)
        .collect()
}

/// Collapse one track's weekly appearances to per-year and per-decade bests.
///
/// Rows are taken in log order; among equal positions the earliest row wins.
/// Rows whose week has no readable year are skipped.
fn collapse(track: usize, rows: &[&ChartRow]) -> (Vec<YearlyPeak>, Vec<ChartingOccurrence>) {
    let mut by_year: BTreeMap<i32, YearlyPeak> = BTreeMap::new();
    let mut by_decade: BTreeMap<i32, ChartingOccurrence> = BTreeMap::new();

    for row in rows {
        let year = match parse_year(&row.week_start) {
            Ok(y) => y,
            Err(e) => {
                log::debug!("Skipping chart row for track {track}: {e}");
                continue;
            }
        };
        let decade = decade_of(year);

        match by_year.get(&year) {
            Some(p) if p.best_position <= row.chart_position => {}
            _ => {
                by_year.insert(
                    year,
                    YearlyPeak {
                        track,
                        chart_year: year,
                        week_start: row.week_start.clone(),
                        best_position: row.chart_position,
                    },
                );
            }
        }

        match by_decade.get(&decade) {
            Some(o) if o.best_position <= row.chart_position => {}
            _ => {
                by_decade.insert(
                    decade,
                    ChartingOccurrence {
                        track,
                        chart_decade: decade,
                        chart_year: year,
                        week_start: row.week_start.clone(),
                        best_position: row.chart_position,
                    },
                );
            }
        }
    }

    (by_year.into_values().collect(), by_decade.into_values().collect())
}

/// Expand accepted matches to every chart week of the matched (artist, title)
/// and collapse them per year and decade.
pub fn expand_and_collapse(chart_rows: &[ChartRow], accepted: Vec<MatchCandidate>) -> Reconciliation {
    let mut by_song: HashMap<(&str, &str), Vec<&ChartRow>> = HashMap::new();
    for row in chart_rows {
        by_song
            .entry((row.artist.as_str(), row.title.as_str()))
            .or_default()
            .push(row);
    }

    let mut result = Reconciliation::default();
    for m in &accepted {
        let Some(matched) = chart_rows.get(m.x) else {
            log::warn!("Match for track {} points past the chart log (x = {})", m.y, m.x);
            continue;
        };
        let weeks = by_song
            .get(&(matched.artist.as_str(), matched.title.as_str()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (yearly, occurrences) = collapse(m.y, weeks);
        result.yearly.extend(yearly);
        result.occurrences.extend(occurrences);
    }
    result.matches = accepted;
    result
}

/// Run the full reconciliation of `catalog` against `chart_rows`.
pub fn reconcile(
    chart_rows: &[ChartRow],
    catalog: &Catalog,
    matcher: &dyn NameMatcher,
    settings: &MatchSettings,
) -> Reconciliation {
    let x_keys: Vec<String> = chart_rows.iter().map(ChartRow::match_key).collect();
    let y_keys = catalog.match_keys();

    let batches = matcher.match_names(
        &x_keys,
        &y_keys,
        settings.candidate_threshold,
        settings.chunksize,
    );
    let best = best_matches(batches);
    let candidates = best.len();
    let accepted = accept(best, settings.accept_threshold);

    log::info!(
        "{} of {} catalog tracks have candidates, {} accepted (> {})",
        candidates,
        catalog.len(),
        accepted.len(),
        settings.accept_threshold
    );

    expand_and_collapse(chart_rows, accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{normalize, raw};
    use crate::matching::NgramMatcher;

    fn cand(x: usize, y: usize, similarity: f64) -> MatchCandidate {
        MatchCandidate { x, y, similarity }
    }

    fn row(week: &str, pos: i32, artist: &str, title: &str) -> ChartRow {
        ChartRow {
            week_start: week.to_string(),
            chart_position: pos,
            artist: artist.to_string(),
            title: title.to_string(),
        }
    }

    /// Returns a fixed candidate list, split into batches of `chunksize`.
    struct FixedMatcher(Vec<MatchCandidate>);

    impl NameMatcher for FixedMatcher {
        fn match_names<'a>(
            &'a self,
            _x: &'a [String],
            _y: &'a [String],
            _threshold: f64,
            chunksize: usize,
        ) -> Box<dyn Iterator<Item = Vec<MatchCandidate>> + 'a> {
            Box::new(self.0.chunks(chunksize.max(1)).map(|c| c.to_vec()))
        }
    }

    #[test]
    fn test_best_match_keeps_max() {
        let best = best_matches(vec![vec![cand(1, 5, 60.0), cand(2, 5, 82.0)]]);
        assert_eq!(best.len(), 1);
        assert_eq!(best[&5], cand(2, 5, 82.0));

        let accepted = accept(best, 75.0);
        assert_eq!(accepted, vec![cand(2, 5, 82.0)]);
    }

    #[test]
    fn test_best_match_across_batches_and_ties() {
        let best = best_matches(vec![
            vec![cand(0, 1, 90.0), cand(3, 2, 50.0)],
            vec![cand(4, 1, 90.0), cand(5, 2, 70.0)],
        ]);
        // Tie on y=1: first seen wins
        assert_eq!(best[&1].x, 0);
        assert_eq!(best[&2].x, 5);
    }

    #[test]
    fn test_best_match_invariant() {
        let all = vec![
            cand(0, 0, 10.0),
            cand(1, 0, 99.0),
            cand(2, 1, 40.0),
            cand(3, 2, 76.0),
            cand(4, 1, 41.0),
            cand(5, 2, 75.5),
            cand(6, 0, 98.0),
        ];
        let best = best_matches(vec![all.clone()]);
        for (y, b) in &best {
            let max = all
                .iter()
                .filter(|c| c.y == *y)
                .map(|c| c.similarity)
                .fold(f64::MIN, f64::max);
            assert_eq!(b.similarity, max);
        }
        assert_eq!(best.len(), 3);
    }

    #[test]
    fn test_threshold_is_strict() {
        let best = best_matches(vec![vec![cand(0, 0, 75.0), cand(1, 1, 75.0001), cand(2, 2, 20.0)]]);
        let accepted = accept(best, 75.0);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].y, 1);
        assert!(accepted.iter().all(|c| c.similarity > 75.0));
    }

    #[test]
    fn test_decade_collapse_keeps_best_position() {
        let rows = vec![
            row("02 January 1975", 40, "ARTIST X", "TRACK A"),
            row("09 January 1975", 12, "ARTIST X", "TRACK A"),
            row("16 January 1975", 30, "ARTIST X", "TRACK A"),
        ];
        let result = expand_and_collapse(&rows, vec![cand(0, 0, 90.0)]);
        assert_eq!(result.occurrences.len(), 1);
        let o = &result.occurrences[0];
        assert_eq!(o.chart_decade, 1970);
        assert_eq!(o.best_position, 12);
        assert_eq!(o.week_start, "09 January 1975");
        assert_eq!(result.yearly.len(), 1);
        assert_eq!(result.yearly[0].best_position, 12);
    }

    #[test]
    fn test_collapse_per_decade_and_year() {
        let rows = vec![
            row("1 June 1979", 5, "A", "S"),
            row("1 June 1981", 3, "A", "S"),
            row("1 July 1985", 1, "A", "S"),
            row("1 Aug 1985", 1, "A", "S"),
            row("bad week", 1, "A", "S"),
        ];
        let result = expand_and_collapse(&rows, vec![cand(0, 7, 80.0)]);

        let decades: Vec<(i32, i32)> = result
            .occurrences
            .iter()
            .map(|o| (o.chart_decade, o.best_position))
            .collect();
        assert_eq!(decades, vec![(1970, 5), (1980, 1)]);
        // Tie at position 1 in 1985: earliest week kept
        assert_eq!(result.occurrences[1].week_start, "1 July 1985");

        let years: Vec<(i32, i32)> = result
            .yearly
            .iter()
            .map(|p| (p.chart_year, p.best_position))
            .collect();
        assert_eq!(years, vec![(1979, 5), (1981, 3), (1985, 1)]);
        assert!(result.occurrences.iter().all(|o| o.track == 7));
    }

    #[test]
    fn test_expansion_uses_exact_pair_only() {
        let rows = vec![
            row("1 May 1980", 9, "BLONDIE", "CALL ME"),
            row("8 May 1980", 4, "BLONDIE", "CALL ME"),
            row("8 May 1980", 2, "BLONDIE", "CALL ME (REMIX)"),
            row("8 May 1980", 1, "SOMEONE ELSE", "CALL ME"),
        ];
        // Matched row is the first one; only exact (artist, title) pairs expand
        let result = expand_and_collapse(&rows, vec![cand(0, 0, 88.0)]);
        assert_eq!(result.occurrences.len(), 1);
        assert_eq!(result.occurrences[0].best_position, 4);
    }

    #[test]
    fn test_best_position_invariant() {
        let rows = vec![
            row("1 Jan 1964", 20, "A", "S"),
            row("1 Jan 1966", 8, "A", "S"),
            row("1 Jan 1971", 15, "A", "S"),
            row("1 Jan 1968", 11, "A", "S"),
            row("1 Jan 1977", 2, "A", "S"),
        ];
        let result = expand_and_collapse(&rows, vec![cand(0, 0, 99.0)]);
        for o in &result.occurrences {
            let min = rows
                .iter()
                .filter(|r| decade_of(parse_year(&r.week_start).unwrap()) == o.chart_decade)
                .map(|r| r.chart_position)
                .min()
                .unwrap();
            assert_eq!(o.best_position, min);
            assert_eq!(o.chart_decade % 10, 0);
            assert!(o.chart_decade <= o.chart_year);
        }
        assert_eq!(result.occurrences.len(), 2);
    }

    #[test]
    fn test_reconcile_with_fixed_matcher() {
        let catalog = normalize(vec![
            raw("Track A", "Artist X", "1975-03-01"),
            raw("Never Charted", "Nobody", "1990"),
        ]);
        let rows = vec![
            row("02 January 1975", 40, "ARTIST X", "TRACK A"),
            row("09 January 1975", 12, "ARTIST X", "TRACK A"),
            row("09 January 1975", 1, "OTHER", "HIT"),
        ];
        let matcher = FixedMatcher(vec![cand(0, 0, 95.0), cand(2, 1, 60.0), cand(1, 0, 70.0)]);
        let result = reconcile(&rows, &catalog, &matcher, &MatchSettings { chunksize: 1, ..Default::default() });

        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matched_tracks(), HashSet::from([0]));
        let joined: Vec<_> = result.joined(&catalog).collect();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].0.title, "TRACK A");
        assert_eq!(joined[0].1.best_position, 12);
    }

    #[test]
    fn test_reconcile_end_to_end_with_ngram_matcher() {
        let catalog = normalize(vec![
            raw("She Loves You", "The Beatles", "1963-08-23"),
            raw("Obscure Protest Song", "Unknown Folk Band", "1971"),
        ]);
        let rows = vec![
            row("5 September 1963", 3, "BEATLES", "SHE LOVES YOU"),
            row("12 September 1963", 1, "BEATLES", "SHE LOVES YOU"),
            row("12 September 1963", 2, "BILLY J KRAMER", "BAD TO ME"),
            row("2 January 1964", 6, "BEATLES", "SHE LOVES YOU"),
            row("9 January 1964", 14, "DAVE CLARK FIVE", "GLAD ALL OVER"),
        ];
        let result = reconcile(&rows, &catalog, &NgramMatcher::default(), &MatchSettings::default());

        assert_eq!(result.matched_tracks(), HashSet::from([0]));
        let decades: Vec<(i32, i32)> = result
            .occurrences
            .iter()
            .map(|o| (o.chart_decade, o.best_position))
            .collect();
        assert_eq!(decades, vec![(1960, 1)]);
        assert_eq!(result.yearly.len(), 2);
    }

    #[test]
    fn test_unmatched_catalog_has_no_occurrences() {
        let catalog = normalize(vec![raw("Quiet Song", "Nobody", "2001")]);
        let rows = vec![row("1 Jan 2001", 1, "SOMEBODY", "LOUD SONG")];
        let result = reconcile(&rows, &catalog, &FixedMatcher(vec![]), &MatchSettings::default());
        assert!(result.matches.is_empty());
        assert!(result.occurrences.is_empty());
    }
}
