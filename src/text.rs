//! Text normalization for OCR output.
//!
//! Scanned drawings mix full-width and half-width forms, a zoo of dash-like
//! code points, and arbitrary spacing inside what is logically one token.
//! Every matcher in this crate works on NFKC-normalized text so the regex
//! patterns only ever see the half-width ASCII forms.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// Dash-like code points the OCR emits for a plain hyphen:
    /// long vowel marks, minus signs, en/em dashes, horizontal bars.
    static ref DASH_VARIANTS: Regex = Regex::new("[ー―−–—‐‑‒ｰ－]").unwrap();
    static ref MULTI_SPACE: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// NFKC-normalize a string (full-width → half-width, compatibility forms).
pub fn normalize_text(value: &str) -> String {
    value.nfkc().collect()
}

/// NFKC-normalize and remove all spaces (ASCII and ideographic).
///
/// Keyword matching against OCR rows uses this form because the OCR
/// frequently splits a label like 相当型番 into separate one-character
/// tokens.
pub fn compact_text(value: &str) -> String {
    normalize_text(value).replace(' ', "").replace('\u{3000}', "")
}

/// Fold every dash-like code point to an ASCII hyphen after NFKC.
pub fn normalize_dash(value: &str) -> String {
    DASH_VARIANTS.replace_all(&normalize_text(value), "-").into_owned()
}

/// Collapse runs of whitespace to a single space.
pub fn collapse_spaces(value: &str) -> String {
    MULTI_SPACE.replace_all(value, " ").trim().to_string()
}

/// Whether the text contains any Japanese characters (kana or kanji).
pub fn contains_japanese(value: &str) -> bool {
    value.chars().any(|c| {
        matches!(c as u32,
            0x3041..=0x3096   // Hiragana
            | 0x30A1..=0x30FA // Katakana
            | 0x4E00..=0x9FFF // CJK
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fullwidth_to_halfwidth() {
        assert_eq!(normalize_text("ＴＰ１"), "TP1");
        assert_eq!(normalize_text("２００Ｖ"), "200V");
    }

    #[test]
    fn test_compact_strips_ideographic_space() {
        assert_eq!(compact_text("器具　記号"), "器具記号");
        assert_eq!(compact_text(" 相当 型番 "), "相当型番");
    }

    #[test]
    fn test_normalize_dash_variants() {
        assert_eq!(normalize_dash("LZDー93039"), "LZD-93039");
        assert_eq!(normalize_dash("TAD—ELT"), "TAD-ELT");
        assert_eq!(normalize_dash("A−B–C"), "A-B-C");
    }

    #[test]
    fn test_collapse_spaces() {
        assert_eq!(collapse_spaces("a   b  c"), "a b c");
    }

    #[test]
    fn test_contains_japanese() {
        assert!(contains_japanese("排風機"));
        assert!(contains_japanese("ポンプ"));
        assert!(!contains_japanese("EF-B2-2"));
    }
}
