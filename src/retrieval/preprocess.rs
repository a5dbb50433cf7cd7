//! Text preparation for embedding input.
//!
//! Title and body are trimmed, joined, and truncated before being handed to
//! the embedding collaborator. The content hash recorded alongside each
//! embedding detects stale vectors after edits.

/// Maximum embedding input length (characters, not tokens).
const MAX_CONTENT_LENGTH: usize = 2048;

/// Suffix appended when content is truncated.
const TRUNCATION_SUFFIX: &str = "...";

/// Prepare a note's title and content for embedding.
///
/// Returns `None` when both fields are empty after trimming; such notes get
/// no vector.
pub fn preprocess_content(title: &str, content: &str) -> Option<String> {
    let title = title.trim();
    let content = content.trim();

    if title.is_empty() && content.is_empty() {
        return None;
    }

    let text = if title.is_empty() {
        content.to_string()
    } else if content.is_empty() {
        title.to_string()
    } else {
        format!("{title}\n{content}")
    };

    Some(truncate(&text))
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_CONTENT_LENGTH {
        return text.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}{TRUNCATION_SUFFIX}")
}

/// SHA-256 hex digest of the trimmed note text. Stored in the
/// embedding-association record to detect content changes.
pub fn content_hash(title: &str, content: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(content.trim().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
