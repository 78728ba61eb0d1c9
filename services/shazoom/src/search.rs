//!
//! src/search.rs  Oct 16th, 2026
//!
//! Client side relevance scoring over the catalog. Weights and thresholds
//! are fixed; see `score` for the order the signals are applied in
//!

use tracing::debug;

use crate::types::{CatalogEntry, ScoredEntry};

/// Exact full-string match
const EXACT: [u32; 3] = [100, 80, 60];
/// Whole query contained in the field
const CONTAINS: [u32; 3] = [50, 40, 30];
/// Per query word longer than MIN_WORD_CHARS
const WORD: [u32; 3] = [25, 20, 15];
/// Similarity above FUZZY_THRESHOLD
const FUZZY: [u32; 3] = [10, 8, 6];

const MIN_WORD_CHARS: usize = 2;
const FUZZY_THRESHOLD: f64 = 0.7;

///
/// Character overlap ratio in [0, 1]: characters of the shorter string that
/// occur anywhere in the longer one, over the longer one's length. Not an
/// edit distance; "abc" vs "cba" is 1.0.
///
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // ties go to `b` as the longer string
    let (longer, shorter) = if a.len() > b.len() { (&a, &b) } else { (&b, &a) };
    let matches = shorter.iter().filter(|c| longer.contains(*c)).count();
    matches as f64 / longer.len() as f64
}

/// Additive relevance of `entry` for `query`; zero means no match
pub fn score(entry: &CatalogEntry, query: &str) -> u32 {
    let query = query.to_lowercase();
    let fields = [
        entry.title.to_lowercase(),
        entry.artist.to_lowercase(),
        entry.album.to_lowercase()
    ];

    let mut total = 0;

    for (field, weight) in fields.iter().zip(EXACT) {
        if *field == query {
            total += weight;
        }
    }

    for (field, weight) in fields.iter().zip(CONTAINS) {
        if field.contains(query.as_str()) {
            total += weight;
        }
    }

    for word in query.split(' ').filter(|w| w.chars().count() > MIN_WORD_CHARS) {
        for (field, weight) in fields.iter().zip(WORD) {
            if field.contains(word) {
                total += weight;
            }
        }
    }

    for (field, weight) in fields.iter().zip(FUZZY) {
        if similarity(field, &query) > FUZZY_THRESHOLD {
            total += weight;
        }
    }

    total
}

/// Result of a search request; blank queries never run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    NotSearched,
    Results(Vec<ScoredEntry>)
}

impl SearchOutcome {
    pub fn has_searched(&self) -> bool {
        matches!(self, SearchOutcome::Results(_))
    }

    pub fn results(&self) -> &[ScoredEntry] {
        match self {
            SearchOutcome::NotSearched => &[],
            SearchOutcome::Results(r) => r
        }
    }

    /// Line shown above the results once a search has run
    pub fn summary(&self) -> Option<String> {
        match self {
            SearchOutcome::NotSearched => None,
            SearchOutcome::Results(r) if r.is_empty() =>
                Some("No songs found matching your search.".to_string()),
            SearchOutcome::Results(r) => Some(format!(
                "Found {} song{}.",
                r.len(),
                if r.len() == 1 { "" } else { "s" }
            ))
        }
    }
}

/// Score every entry, keep positives, highest first. Equal scores keep
/// catalog order.
pub fn search(catalog: &[CatalogEntry], query: &str) -> SearchOutcome {
    if query.trim().is_empty() {
        return SearchOutcome::NotSearched;
    }

    let mut scored: Vec<ScoredEntry> = catalog.iter()
        .filter_map(|entry| {
            let score = score(entry, query);
            (score > 0).then(|| ScoredEntry { entry: entry.clone(), score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));

    debug!(query, hits = scored.len(), "search.done");
    SearchOutcome::Results(scored)
}
