//! In-memory Okapi BM25 index over tool descriptors (and, via the same
//! tokenizer, over guide entries and memory entries — anything that can
//! produce an indexable document string).
//!
//! Strictly a derived projection: nothing here touches the persistent
//! store. Rebuilding after a restart is just replaying `addOrReplace`
//! over `Store::list_tools()`.

use std::collections::HashMap;

use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone)]
struct DocEntry {
    term_freqs: HashMap<String, u32>,
    length: u32,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub avg_length: f64,
}

/// Split on non-alphanumeric boundaries, lowercase, drop empties. No
/// stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[derive(Default)]
pub struct Bm25Index {
    params: Bm25Params,
    docs: HashMap<String, DocEntry>,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self {
            params: Bm25Params::default(),
            docs: HashMap::new(),
        }
    }

    pub fn set_params(&mut self, k1: f64, b: f64) {
        self.params = Bm25Params { k1, b };
    }

    /// Insert or overwrite the document keyed by `name`. `document` is
    /// the already-concatenated, already-lowercased indexable text.
    pub fn add_or_replace(&mut self, name: &str, document: &str) {
        let tokens = tokenize(document);
        let mut term_freqs = HashMap::new();
        for tok in &tokens {
            *term_freqs.entry(tok.clone()).or_insert(0) += 1;
        }
        self.docs.insert(
            name.to_string(),
            DocEntry {
                length: tokens.len() as u32,
                term_freqs,
            },
        );
    }

    /// No-op if `name` was never indexed.
    pub fn remove(&mut self, name: &str) {
        self.docs.remove(name);
    }

    pub fn stats(&self) -> IndexStats {
        let documents = self.docs.len();
        let avg_length = if documents == 0 {
            0.0
        } else {
            self.docs.values().map(|d| d.length as f64).sum::<f64>() / documents as f64
        };
        IndexStats {
            documents,
            avg_length,
        }
    }

    /// Ranked `(name, score)` pairs, descending by score, truncated to
    /// `limit`, filtered to scores strictly above `score_floor`. Empty
    /// query (no tokens) returns an empty list.
    pub fn search(&self, query: &str, limit: usize, score_floor: f64) -> Vec<(String, f64)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f64;
        let avg_len = self.stats().avg_length.max(1.0);

        let mut idf_cache: HashMap<&str, f64> = HashMap::new();
        for term in &query_terms {
            if idf_cache.contains_key(term.as_str()) {
                continue;
            }
            let df = self
                .docs
                .values()
                .filter(|d| d.term_freqs.contains_key(term))
                .count() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            idf_cache.insert(term.as_str(), idf);
        }

        let mut scored: Vec<(String, f64)> = self
            .docs
            .iter()
            .filter_map(|(name, doc)| {
                let mut score = 0.0;
                for term in &query_terms {
                    let Some(&tf) = doc.term_freqs.get(term) else {
                        continue;
                    };
                    let idf = idf_cache[term.as_str()];
                    let tf = tf as f64;
                    let denom = tf
                        + self.params.k1
                            * (1.0 - self.params.b + self.params.b * doc.length as f64 / avg_len);
                    score += idf * (tf * (self.params.k1 + 1.0)) / denom;
                }
                (score > score_floor).then_some((name.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        trace!(hits = scored.len(), query, "bm25 search");
        scored
    }
}
