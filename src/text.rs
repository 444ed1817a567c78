//! Accent- and case-insensitive text normalization and keyword matching.
//!
//! Matching is a plain substring test on normalized text. It does not look at
//! token boundaries, so a short acronym such as `BCL` also matches inside a
//! longer word. That behaviour is intentional and relied upon by existing jobs.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Normalize text for comparison.
///
/// Applies NFKD decomposition, drops combining marks, lowercases, collapses
/// runs of whitespace to a single space and trims both ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_text("FINANCIÈRE"), "financiere");
/// assert_eq!(normalize_text(" BNP   PARIBAS "), "bnp paribas");
/// ```
pub fn normalize_text(text: &str) -> String {
    let stripped: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered = stripped.to_lowercase();
    WHITESPACE.replace_all(&lowered, " ").trim().to_string()
}

/// True when `keyword` occurs in `normalized_body`.
///
/// `normalized_body` must already be the output of [`normalize_text`]; the
/// keyword is normalized here. A keyword that normalizes to nothing matches
/// every body, so callers reject blank keywords up front.
pub fn keyword_matches(keyword: &str, normalized_body: &str) -> bool {
    normalized_body.contains(&normalize_text(keyword))
}

/// Keywords (in configured order) that occur in `body`.
pub fn matched_keywords(keywords: &[String], body: &str) -> Vec<String> {
    let normalized = normalize_text(body);
    keywords
        .iter()
        .filter(|kw| keyword_matches(kw, &normalized))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_accents() {
        assert_eq!(normalize_text("FINANCIÈRE"), "financiere");
        assert_eq!(normalize_text("FINANCIÈRE"), normalize_text("financiere"));
        assert_eq!(normalize_text(" BNP   PARIBAS "), "bnp paribas");
        assert_eq!(normalize_text("Place\tfinancière\n du  Luxembourg"), "place financiere du luxembourg");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for s in ["Ënnerwee an der Stad", "  MÄRZ 2024 ", "São Paulo", "", "ﬁnance"] {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn test_matched_keywords_keeps_configured_order() {
        let keywords = vec!["CSSF".to_string(), "Place Financière".to_string(), "FMI".to_string()];
        let body = "La place financiere reagit. Le communiqué de la cssf est tombé.";
        assert_eq!(
            matched_keywords(&keywords, body),
            vec!["CSSF".to_string(), "Place Financière".to_string()]
        );
    }

    #[test]
    fn test_blank_keyword_is_a_plain_substring() {
        assert!(keyword_matches("   ", "anything at all"));
        assert!(keyword_matches("", ""));
    }

    // Known limitation: substring matching over-matches short acronyms.
    #[test]
    fn test_short_acronym_matches_inside_longer_token() {
        let body = normalize_text("Le groupe BCLX annonce ses résultats");
        assert!(keyword_matches("BCL", &body));
    }
}
