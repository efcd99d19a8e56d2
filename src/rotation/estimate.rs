//! Approximate token accounting.

/// Characters per estimated token unit.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of `text` as one unit per four characters,
/// rounded up. Empty text costs nothing.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("hello world"), 3);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("日本語です"), 2);
    }
}
