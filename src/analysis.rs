//! Aggregations over the catalog and the reconciled chart history.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::catalog::{Catalog, TrackRecord};
use crate::reconcile::{ChartingOccurrence, Reconciliation};

/// Audio features that can be summarized per decade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Valence,
    Danceability,
    Energy,
    Tempo,
}

impl Feature {
    pub fn value(&self, r: &TrackRecord) -> f64 {
        match self {
            Self::Valence => r.valence,
            Self::Danceability => r.danceability,
            Self::Energy => r.energy,
            Self::Tempo => r.tempo,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Valence => "valence",
            Self::Danceability => "danceability",
            Self::Energy => "energy",
            Self::Tempo => "tempo",
        }
    }
}

/// Songs per release year. Records without a year are not counted.
pub fn release_year_counts(catalog: &Catalog) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for year in catalog.iter().filter_map(|r| r.release_year) {
        *counts.entry(year).or_insert(0) += 1;
    }
    counts
}

/// Songs per release decade. Records without a year are not counted.
pub fn release_decade_counts(catalog: &Catalog) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for decade in catalog.iter().filter_map(|r| r.release_decade) {
        *counts.entry(decade).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChartedSplit {
    pub charted: usize,
    pub not_charted: usize,
}

/// Charted vs. not charted songs per release decade.
pub fn charted_by_release_decade(
    catalog: &Catalog,
    rec: &Reconciliation,
) -> BTreeMap<i32, ChartedSplit> {
    let matched = rec.matched_tracks();
    let mut out: BTreeMap<i32, ChartedSplit> = BTreeMap::new();
    for (idx, r) in catalog.records.iter().enumerate() {
        let Some(decade) = r.release_decade else {
            continue;
        };
        let split = out.entry(decade).or_default();
        if matched.contains(&idx) {
            split.charted += 1;
        } else {
            split.not_charted += 1;
        }
    }
    out
}

/// Distinct tracks charting in each chart decade.
pub fn chart_decade_counts(occurrences: &[ChartingOccurrence]) -> BTreeMap<i32, usize> {
    let mut tracks: BTreeMap<i32, HashSet<usize>> = BTreeMap::new();
    for o in occurrences {
        tracks.entry(o.chart_decade).or_default().insert(o.track);
    }
    tracks.into_iter().map(|(d, t)| (d, t.len())).collect()
}

/// The `n` most popular records, most popular first. Ties keep catalog order.
pub fn top_by_popularity(catalog: &Catalog, n: usize) -> Vec<&TrackRecord> {
    let mut records: Vec<&TrackRecord> = catalog.iter().collect();
    records.sort_by(|a, b| b.popularity.cmp(&a.popularity));
    records.truncate(n);
    records
}

/// Five-number summary plus mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Quantile of sorted data by linear interpolation between closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    Some(Summary {
        count: v.len(),
        mean: v.iter().sum::<f64>() / v.len() as f64,
        min: v[0],
        q1: quantile(&v, 0.25),
        median: quantile(&v, 0.5),
        q3: quantile(&v, 0.75),
        max: v[v.len() - 1],
    })
}

fn values_by_decade(catalog: &Catalog, feature: Feature) -> BTreeMap<i32, Vec<f64>> {
    let mut by_decade: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for r in catalog.iter() {
        if let Some(decade) = r.release_decade {
            by_decade.entry(decade).or_default().push(feature.value(r));
        }
    }
    by_decade
}

/// Distribution of one audio feature per release decade.
pub fn feature_by_decade(catalog: &Catalog, feature: Feature) -> BTreeMap<i32, Summary> {
    values_by_decade(catalog, feature)
        .into_iter()
        .filter_map(|(d, v)| summarize(&v).map(|s| (d, s)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineRow {
    pub decade: i32,
    pub catalog_mean: Option<f64>,
    pub baseline_mean: Option<f64>,
}

impl BaselineRow {
    /// Catalog mean minus baseline mean, when both exist.
    pub fn delta(&self) -> Option<f64> {
        Some(self.catalog_mean? - self.baseline_mean?)
    }
}

/// Mean of a feature per release decade for the catalog and the baseline,
/// over every decade present in either.
pub fn compare_to_baseline(catalog: &Catalog, baseline: &Catalog, feature: Feature) -> Vec<BaselineRow> {
    let ours = feature_by_decade(catalog, feature);
    let theirs = feature_by_decade(baseline, feature);
    let decades: BTreeSet<i32> = ours.keys().chain(theirs.keys()).copied().collect();

    decades
        .into_iter()
        .map(|decade| BaselineRow {
            decade,
            catalog_mean: ours.get(&decade).map(|s| s.mean),
            baseline_mean: theirs.get(&decade).map(|s| s.mean),
        })
        .collect()
}
