//! Channel name normalization
//!
//! Playlist names carry decorations the schedule source does not use:
//! quality tags, timeshift markers, region notes in parentheses. These
//! helpers reduce a name to a comparable form.

use once_cell::sync::Lazy;
use regex::Regex;

static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static TIMESHIFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+\s*\d+").unwrap());
static QUALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:FHD|UHD|HD|4K|SD)\b").unwrap());
static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{Latin}\p{Cyrillic}0-9_\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Words that say what kind of channel it is, not which one.
const GENERIC_WORDS: &[&str] = &[
    "tv", "тв", "radio", "радио", "fm", "movie", "movies", "кино", "фильм", "music", "музыка",
    "муз",
];

/// Reduce a channel name to its comparable form.
///
/// "НТВ (HD) +4" -> "нтв", "Discovery Channel FHD" -> "discovery channel"
pub fn normalize(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let s = PARENTHESIZED.replace_all(name, " ");
    let s = TIMESHIFT.replace_all(&s, " ");
    let s = QUALITY.replace_all(&s, " ");
    let s = NON_WORD.replace_all(&s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    s.trim().to_lowercase()
}

/// Tokens of the normalized name, single characters dropped.
pub fn extract_keywords(name: &str) -> Vec<String> {
    normalize(name)
        .split_whitespace()
        .filter(|t| t.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Whether a keyword only describes the channel genre.
pub fn is_generic_word(word: &str) -> bool {
    GENERIC_WORDS.contains(&word)
}

/// Alternative spellings worth looking up, most specific first, without duplicates.
pub fn variants(name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(4);
    let mut push = |v: String| {
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    };

    let normalized = normalize(name);
    push(name.trim().to_lowercase());
    push(normalized.clone());

    let without_digits = DIGITS.replace_all(&normalized, " ");
    push(WHITESPACE.replace_all(&without_digits, " ").trim().to_string());

    if let Some(first) = normalized.split_whitespace().find(|t| t.chars().count() > 1) {
        if first.chars().count() > 2 && !is_generic_word(first) {
            push(first.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_decorations() {
        assert_eq!(normalize("НТВ (HD) +4"), "нтв");
        assert_eq!(normalize("Discovery Channel FHD"), "discovery channel");
        assert_eq!(normalize("  Eurosport   1 4K "), "eurosport 1");
        assert_eq!(normalize("Первый канал +2"), "первый канал");
        assert_eq!(normalize("CNN International (Europe)"), "cnn international");
    }

    #[test]
    fn test_normalize_quality_is_whole_word() {
        assert_eq!(normalize("SDA Sport hd"), "sda sport");
        assert_eq!(normalize("Shdtv"), "shdtv");
    }

    #[test]
    fn test_normalize_removes_punctuation() {
        assert_eq!(normalize("Muz-TV!"), "muztv");
        assert_eq!(normalize("Canal+ Sport"), "canal sport");
        assert_eq!(normalize("Télé-Québec"), "téléquébec");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("(HD)"), "");
        assert!(extract_keywords("").is_empty());
        assert!(variants("").is_empty());
    }

    #[test]
    fn test_extract_keywords_drops_single_chars() {
        assert_eq!(extract_keywords("Channel 5 News"), vec!["channel", "news"]);
        assert_eq!(extract_keywords("Матч! Премьер HD"), vec!["матч", "премьер"]);
    }

    #[test]
    fn test_variants_order_and_dedup() {
        assert_eq!(
            variants("Eurosport 2 HD"),
            vec!["eurosport 2 hd", "eurosport 2", "eurosport"]
        );
        assert_eq!(variants("nickelodeon"), vec!["nickelodeon"]);
    }

    #[test]
    fn test_variants_skip_generic_first_keyword() {
        let v = variants("TV 1000 Action");
        assert_eq!(v, vec!["tv 1000 action", "tv action"]);
        assert!(!v.contains(&"tv".to_string()));
    }
}
