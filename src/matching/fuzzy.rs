use std::collections::HashMap;

use strsim::normalized_levenshtein;

use super::{MatchCandidate, NameMatcher};

/// Character n-gram matcher.
///
/// Candidates are generated by n-gram cosine similarity (`>= threshold`,
/// fractional). Each surviving pair is scored as the mean of the cosine,
/// normalized Levenshtein on the cleaned keys, and normalized Levenshtein on
/// the alphabetically sorted tokens, scaled to 0-100.
#[derive(Debug, Clone)]
pub struct NgramMatcher {
    pub ngram: usize,
}

impl Default for NgramMatcher {
    fn default() -> Self {
        Self { ngram: 3 }
    }
}

/// A key prepared for comparison.
struct Prepared {
    text: String,
    sorted_tokens: String,
    grams: HashMap<String, f64>,
    magnitude: f64,
}

/// Lowercase, turn punctuation into spaces, collapse runs of whitespace.
fn clean(key: &str) -> String {
    let mapped: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn prepare(key: &str, n: usize) -> Prepared {
    let text = clean(key);

    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    let sorted_tokens = tokens.join(" ");

    let mut grams: HashMap<String, f64> = HashMap::new();
    if !text.is_empty() {
        let padded: Vec<char> = format!(" {text} ").chars().collect();
        if padded.len() >= n {
            for w in padded.windows(n) {
                *grams.entry(w.iter().collect()).or_insert(0.0) += 1.0;
            }
        }
    }
    let magnitude = grams.values().map(|v| v * v).sum::<f64>().sqrt();

    Prepared {
        text,
        sorted_tokens,
        grams,
        magnitude,
    }
}

/// Blended 0-100 score for a pair that passed candidate generation.
fn score(a: &Prepared, b: &Prepared, cosine: f64) -> f64 {
    let lev = normalized_levenshtein(&a.text, &b.text);
    let sorted = normalized_levenshtein(&a.sorted_tokens, &b.sorted_tokens);
    (cosine.min(1.0) + lev + sorted) / 3.0 * 100.0
}

/// Inverted n-gram index over the target (y) keys.
struct TargetIndex {
    targets: Vec<Prepared>,
    postings: HashMap<String, Vec<(usize, f64)>>,
}

impl TargetIndex {
    fn build(keys: &[String], n: usize) -> Self {
        let targets: Vec<Prepared> = keys.iter().map(|k| prepare(k, n)).collect();
        let mut postings: HashMap<String, Vec<(usize, f64)>> = HashMap::new();
        for (y, t) in targets.iter().enumerate() {
            for (g, w) in &t.grams {
                postings.entry(g.clone()).or_default().push((y, *w));
            }
        }
        Self { targets, postings }
    }
}

/// Lazy stream of candidate batches, one per block of `chunksize` x keys.
pub struct MatchStream<'a> {
    ngram: usize,
    x_keys: &'a [String],
    index: TargetIndex,
    threshold: f64,
    chunksize: usize,
    cursor: usize,
    dots: Vec<f64>,
}

impl Iterator for MatchStream<'_> {
    type Item = Vec<MatchCandidate>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.x_keys.len() {
            return None;
        }
        let end = (self.cursor + self.chunksize).min(self.x_keys.len());
        let mut batch = Vec::new();
        let mut touched: Vec<usize> = Vec::new();

        for x in self.cursor..end {
            let p = prepare(&self.x_keys[x], self.ngram);
            if p.magnitude == 0.0 {
                continue;
            }

            for (g, w) in &p.grams {
                if let Some(posting) = self.index.postings.get(g) {
                    for &(y, wy) in posting {
                        if self.dots[y] == 0.0 {
                            touched.push(y);
                        }
                        self.dots[y] += w * wy;
                    }
                }
            }

            touched.sort_unstable();
            for &y in &touched {
                let t = &self.index.targets[y];
                let cosine = self.dots[y] / (p.magnitude * t.magnitude);
                self.dots[y] = 0.0;
                if cosine >= self.threshold {
                    batch.push(MatchCandidate {
                        x,
                        y,
                        similarity: score(&p, t, cosine),
                    });
                }
            }
            touched.clear();
        }

        log::debug!(
            "Matched chart rows {}..{}: {} candidates",
            self.cursor,
            end,
            batch.len()
        );
        self.cursor = end;
        Some(batch)
    }
}

impl NgramMatcher {
    pub fn stream<'a>(
        &self,
        x_keys: &'a [String],
        y_keys: &[String],
        threshold: f64,
        chunksize: usize,
    ) -> MatchStream<'a> {
        let index = TargetIndex::build(y_keys, self.ngram);
        let dots = vec![0.0; index.targets.len()];
        MatchStream {
            ngram: self.ngram,
            x_keys,
            index,
            threshold,
            chunksize: chunksize.max(1),
            cursor: 0,
            dots,
        }
    }
}

impl NameMatcher for NgramMatcher {
    fn match_names<'a>(
        &'a self,
        x_keys: &'a [String],
        y_keys: &'a [String],
        threshold: f64,
        chunksize: usize,
    ) -> Box<dyn Iterator<Item = Vec<MatchCandidate>> + 'a> {
        Box::new(self.stream(x_keys, y_keys, threshold, chunksize))
    }
}
