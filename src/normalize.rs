//! IPA input normalization.
//!
//! Callers feed either true IPA (Unicode) or eSpeak phoneme mnemonics
//! (Kirshenbaum-ish ASCII, e.g. `rI2z'o@rs`).  This module removes eSpeak
//! utility markers and maps known mnemonics and symbol variants onto the
//! IPA clusters the language packs actually define, so the token builder
//! only ever sees a stable symbol stream.
//!
//! Several mappings are accent-conditional (rhotic vs non-rhotic English)
//! and several fall back to simpler symbols when the active pack lacks the
//! precise one.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pack::PackSet;

/// Multi-character mnemonics shared by every accent.  Applied longest-first,
/// before the single-character map.
const MULTI_COMMON: &[(&str, &str)] = &[
    ("tS", "t͡ʃ"),
    ("t͡S", "t͡ʃ"),
    ("dZ", "d͡ʒ"),
    ("d͡Z", "d͡ʒ"),
    ("ts", "t͡s"),
    ("dz", "d͡z"),
    ("I2", "ɪ"),
    ("e#", "ɛ"),
    ("@L", "əl"),
    ("e@", "eə"),
    ("U@", "ʊə"),
];

/// Single-character ASCII mnemonics.
const ASCII_MAP: &[(char, &str)] = &[
    ('@', "ə"),
    ('E', "ɛ"),
    ('O', "ɔ"),
    ('V', "ʌ"),
    ('U', "ʊ"),
    ('I', "ɪ"),
    ('A', "ɑ"),
    ('N', "ŋ"),
    ('S', "ʃ"),
    ('Z', "ʒ"),
    ('T', "θ"),
    ('D', "ð"),
];

/// Cross-language approximations for symbols most packs do not carry.
const APPROX_MAP: &[(&str, &str)] = &[
    ("t͡ɕ", "t͡ʃ"),
    ("d͡ʑ", "d͡ʒ"),
    ("ɕ", "ʃ"),
    ("ʑ", "ʒ"),
    ("ʂ", "ʃ"),
    ("ʐ", "ʒ"),
    ("β", "b"),
    ("ɣ", "g"),
    ("x", "h"),
    ("ʝ", "j"),
    ("ʎ", "l"),
    ("c", "k"),
    ("ɟ", "g"),
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn is_english(tag: &str) -> bool {
    tag.starts_with("en")
}

fn is_rhotic_english(tag: &str) -> bool {
    matches!(tag, "en-us" | "en-ca" | "en-us-nyc")
}

/// Normalize an IPA / eSpeak-mnemonic string into the pack's symbol set.
///
/// `lang_tag` must already be normalized (lowercase, hyphen-separated).
pub fn normalize_ipa(text: &str, lang_tag: &str, pack: &PackSet) -> String {
    let english = is_english(lang_tag);
    let rhotic = english && is_rhotic_english(lang_tag);
    let in_pack = |key: &str| pack.phonemes.contains_key(key);

    let mut text = text.to_string();

    // Tie-bar variants.
    text = text.replace('\u{35c}', "\u{361}");

    // Wrapper punctuation.
    for c in ['[', ']', '(', ')', '{', '}', '/', '\\'] {
        text = text.replace(c, "");
    }

    // eSpeak dictionary utility codes: || is a word boundary inside a
    // phoneme string, _: and _ are pause markers.
    text = text.replace("||", " ");
    text = text.replace('|', "");
    text = text.replace('%', "");
    text = text.replace('=', "");
    text = text.replace("_:", " ");
    text = text.replace('_', " ");

    // Stress and length markers.
    text = text.replace('\'', "ˈ");
    text = text.replace(',', "ˌ");
    text = text.replace(':', "ː");

    // Multi-character mnemonics, longest first.
    let mut multi: Vec<(String, String)> = MULTI_COMMON
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    // ROSES/BLESSED vary by accent; GenAm centralises to ᵻ.
    let reduced = if rhotic { "ᵻ" } else { "ɪ" };
    multi.push(("I#".to_string(), reduced.to_string()));
    multi.push(("I2#".to_string(), reduced.to_string()));
    let near = if rhotic { "ɪɹ" } else { "ɪə" };
    multi.push(("i@3".to_string(), near.to_string()));
    multi.push(("i@".to_string(), near.to_string()));
    if english {
        if rhotic {
            multi.push(("3ː".to_string(), "ɝ".to_string()));
            multi.push(("3".to_string(), "ɚ".to_string()));
            multi.push(("A@".to_string(), "ɑɹ".to_string()));
            multi.push(("O@".to_string(), "ɔɹ".to_string()));
            multi.push(("o@".to_string(), "oɹ".to_string()));
        } else {
            multi.push(("3ː".to_string(), "ɜ".to_string()));
            multi.push(("3".to_string(), "ə".to_string()));
            multi.push(("A@".to_string(), "ɑː".to_string()));
            multi.push(("O@".to_string(), "ɔː".to_string()));
            multi.push(("o@".to_string(), "ɔː".to_string()));
        }
    }
    multi.sort_by_key(|(k, _)| std::cmp::Reverse(k.chars().count()));
    for (k, v) in &multi {
        text = text.replace(k.as_str(), v);
    }

    // Single-character ASCII mnemonics.
    for (c, v) in ASCII_MAP {
        text = text.replace(*c, v);
    }
    // English LOT vowel differs across accents.
    text = text.replace('0', if rhotic { "ɑ" } else { "ɒ" });

    // Dark-L and syllabic-L variants.
    if !in_pack("ɫ") {
        text = text.replace('ɫ', "l");
    }
    text = text.replace("l\u{329}", "əl");
    text = text.replace("ɫ\u{329}", "əl");
    text = text.replace("ə͡l", "əl");
    text = text.replace("ʊ͡l", "əl");

    // Centralised reduced vowel used by some eSpeak accents.
    if !in_pack("ᵻ") {
        text = text.replace('ᵻ', "ɪ");
    }

    // Rhotic hook and syllabic-r.
    text = text.replace('˞', "ɹ");
    let syllabic_r = if in_pack("ɚ") { "ɚ" } else { "əɹ" };
    text = text.replace("ɹ\u{329}", syllabic_r);
    text = text.replace("r\u{329}", syllabic_r);

    // If rhotic vowels don't exist in the pack, fall back to vowel + ɹ.
    if !in_pack("ɚ") {
        text = text.replace('ɚ', "əɹ");
    }
    if !in_pack("ɝ") {
        text = text.replace('ɝ', "ɜɹ");
    }

    if english {
        text = text.replace('r', "ɹ");
    }

    // Cross-language approximations.
    for (k, v) in APPROX_MAP {
        text = text.replace(k, v);
    }
    text = text.replace('ɲ', if in_pack("ɲ") { "ɲ" } else { "n" });
    text = text.replace('ɘ', if in_pack("ɘ") { "ɘ" } else { "ə" });
    let mid_round = if in_pack("ɵ") {
        "ɵ"
    } else if in_pack("ø") {
        "ø"
    } else {
        "o"
    };
    text = text.replace('ɵ', mid_round);
    text = text.replace('ɤ', if in_pack("ɤ") { "ɤ" } else { "ʌ" });

    // Precomposed nasal vowels.
    text = text.replace('ã', "a");
    text = text.replace('ẽ', "e");
    text = text.replace('ĩ', "i");
    text = text.replace('õ', "o");
    text = text.replace('ũ', "u");

    // English TRAP: keep /a/ for non-US accents, /æ/ for en-US.
    if rhotic {
        text = text.replace('a', "æ");
    }

    // Leftover eSpeak hash markers.
    text = text.replace('#', "");

    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
