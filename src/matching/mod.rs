//! Fuzzy name matching between chart rows and catalog entries.

pub mod fuzzy;

pub use fuzzy::NgramMatcher;

/// A scored pairing of chart row `x` with catalog entry `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    /// Index into the chart row list.
    pub x: usize,
    /// Index into the catalog.
    pub y: usize,
    /// Similarity on a 0-100 scale.
    pub similarity: f64,
}

/// Produces candidate matches between two key lists.
///
/// Implementations stream results in batches so the full cross product is
/// never materialized. The concatenation of all batches must not depend on
/// `chunksize`.
pub trait NameMatcher {
    fn match_names<'a>(
        &'a self,
        x_keys: &'a [String],
        y_keys: &'a [String],
        threshold: f64,
        chunksize: usize,
    ) -> Box<dyn Iterator<Item = Vec<MatchCandidate>> + 'a>;
}
