//! Content preprocessing for embedding generation.
//!
//! Prepares a captured text batch for embedding:
//! 1. Trim whitespace
//! 2. Skip if empty
//! 3. Truncate to max length with ellipsis

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 512;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Preprocess a text batch for embedding generation.
///
/// Returns `None` if the text is empty after trimming.
pub fn preprocess_content(text: &str) -> Option<String> {
    let text = text.trim();

    if text.is_empty() {
        return None;
    }

    Some(truncate_content(text))
}

/// Truncate content to MAX_CONTENT_LENGTH characters, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content_returns_none() {
        assert!(preprocess_content("").is_none());
        assert!(preprocess_content("   ").is_none());
        assert!(preprocess_content("\n\t  \r\n").is_none());
    }

    #[test]
    fn test_trims_whitespace() {
        let result = preprocess_content("  Company X raises $10M  ");
        assert_eq!(result, Some("Company X raises $10M".to_string()));
    }

    #[test]
    fn test_truncation() {
        let long_content = "x".repeat(600);
        let content = preprocess_content(&long_content).unwrap();

        assert_eq!(content.chars().count(), MAX_CONTENT_LENGTH);
        assert!(content.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_truncation_keeps_multibyte_chars_whole() {
        let long_content = "ж".repeat(600);
        let content = preprocess_content(&long_content).unwrap();

        assert_eq!(content.chars().count(), MAX_CONTENT_LENGTH);
        assert!(content.starts_with("жжж"));
    }

    #[test]
    fn test_no_truncation_for_short_content() {
        let short = "Short batch";
        assert_eq!(preprocess_content(short), Some(short.to_string()));
    }
}
