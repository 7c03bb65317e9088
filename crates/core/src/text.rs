//! Description text helpers shared by ingestion, learning and analysis.

pub const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "an", "a",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lower-cases, drops punctuation and collapses whitespace.
pub fn normalize_description(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case alphanumeric runs longer than two characters.
pub fn significant_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Whitespace-separated tokens with punctuation squeezed out, keeping those
/// longer than two characters that are not stop words.
pub fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .collect()
}

/// Best-effort vendor name from the leading part of a description:
/// `STARBUCKS #1234` becomes `STARBUCKS`, `AMAZON 123` becomes `AMAZON`.
pub fn guess_merchant_name(description: &str) -> Option<String> {
    let head = description.trim().split('#').next().unwrap_or_default();
    let head = head
        .trim_end_matches(|c: char| c.is_ascii_digit() || c.is_whitespace() || c == '*')
        .trim();
    if head.chars().count() <= 2 || is_stop_word(&head.to_lowercase()) {
        return None;
    }
    Some(head.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize_description("  AMAZON.COM*MK1AB2   Seattle, WA "),
            "amazoncommk1ab2 seattle wa"
        );
    }

    #[test]
    fn significant_words_splits_on_punctuation() {
        assert_eq!(
            significant_words("AMAZON.COM*MK1AB2 to WA"),
            vec!["amazon", "com", "mk1ab2"]
        );
    }

    #[test]
    fn content_tokens_drop_stop_words() {
        assert_eq!(
            content_tokens("Payment for the Rent, thanks"),
            vec!["payment", "rent", "thanks"]
        );
    }

    #[test]
    fn merchant_before_store_number() {
        assert_eq!(guess_merchant_name("STARBUCKS #1234").as_deref(), Some("STARBUCKS"));
    }

    #[test]
    fn merchant_before_trailing_digits() {
        assert_eq!(guess_merchant_name("AMAZON 123").as_deref(), Some("AMAZON"));
    }

    #[test]
    fn merchant_too_short_or_generic() {
        assert_eq!(guess_merchant_name("AB 12"), None);
        assert_eq!(guess_merchant_name("THE 42"), None);
        assert_eq!(guess_merchant_name("#123"), None);
    }
}
