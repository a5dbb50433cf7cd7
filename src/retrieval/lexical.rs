//! Lexical (keyword) scoring over note fields.
//!
//! Produces the keyword-ranked list that hybrid search fuses with the
//! semantic ranking. Body matches are weighted inversely to body length so
//! long notes don't win on surface area alone.

use crate::eid::Eid;
use crate::notes::Note;

/// Result of lexical scoring for one note.
#[derive(Debug, Clone)]
pub struct LexicalResult {
    pub id: Eid,
    /// Number of distinct query terms matched.
    pub matched_terms: usize,
    /// Weighted score across all fields (length-normalized).
    pub total_hits: f32,
}

/// Score notes against a query with keyword matching.
///
/// Returns only notes with at least one match, sorted by
/// `matched_terms` DESC then `total_hits` DESC.
pub fn score_lexical(query: &str, notes: &[Note]) -> Vec<LexicalResult> {
    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return vec![];
    }

    let mut results: Vec<LexicalResult> = notes
        .iter()
        .filter_map(|note| {
            let (matched_terms, total_hits) = count_matches(&query_terms, note);
            if matched_terms > 0 {
                Some(LexicalResult {
                    id: note.id.clone(),
                    matched_terms,
                    total_hits,
                })
            } else {
                None
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.matched_terms.cmp(&a.matched_terms).then_with(|| {
            b.total_hits
                .partial_cmp(&a.total_hits)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    results
}

/// Tokenize a query into lowercase terms, dropping one-character terms and
/// common stop words.
fn tokenize(query: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "in", "on", "at",
        "to", "for", "of", "with", "by", "from", "as", "and", "or", "but", "not", "no", "so",
        "if", "then",
    ];

    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|s| s.to_lowercase())
        .filter(|s| s.len() > 1 && !STOP_WORDS.contains(&s.as_str()))
        .collect()
}

/// Body length at or below which matches get full weight (characters).
const BODY_LENGTH_BASELINE: f32 = 200.0;

/// Logarithmic decay of body-match weight with body length.
fn body_length_weight(len: usize) -> f32 {
    if len <= BODY_LENGTH_BASELINE as usize {
        return 1.0;
    }
    1.0 / (1.0 + (len as f32 / BODY_LENGTH_BASELINE).ln())
}

fn count_matches(query_terms: &[String], note: &Note) -> (usize, f32) {
    let title_lower = note.title.to_lowercase();
    let content_lower = note.content.to_lowercase();
    let tags_lower: Vec<String> = note.tags.iter().map(|t| t.to_lowercase()).collect();

    let body_weight = body_length_weight(note.content.len());

    let mut matched_terms = 0;
    let mut total_hits: f32 = 0.0;

    for term in query_terms {
        let mut term_hits: f32 = 0.0;

        if title_lower.contains(term) {
            term_hits += 2.0;
        }

        if content_lower.contains(term) {
            term_hits += body_weight;
        }

        // tag match: exact or hierarchy prefix ("work" matches "work/reports")
        for tag in &tags_lower {
            if tag == term || tag.starts_with(&format!("{term}/")) {
                term_hits += 3.0;
            }
        }

        if term_hits > 0.0 {
            matched_terms += 1;
            total_hits += term_hits;
        }
    }

    (matched_terms, total_hits)
}
