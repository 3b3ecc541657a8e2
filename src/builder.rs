//! Token builder — IPA text to the initial token sequence.
//!
//! The builder is the only stage allowed to create or reorder tokens.
//! It lexes the normalized IPA stream into pack clusters, establishes word
//! and syllable structure, inserts the micro-silences the passes rely on
//! (pre-stop gap, cluster gap, vowel-hiatus gap) and the aspiration tails
//! of voiceless stops, resolves copy-adjacent phonemes, and assigns
//! durations, default fades, and the clause intonation contour.
//!
//! Everything downstream only mutates fields, durations, and fades in
//! place.

use anyhow::{bail, Result};

use crate::fields::FieldId;
use crate::intonation;
use crate::normalize::normalize_ipa;
use crate::pack::{PackSet, PhonemeDef, PhonemeFlags};
use crate::token::{Stress, Token};

/// Reduced vowels must stay audible even at high speaking rates.
const MIN_VOWEL_DURATION_MS: f64 = 18.0;

/// Micro-gap lengths (ms at nominal speed).
const CLUSTER_GAP_MS: f64 = 8.0;
const VOWEL_HIATUS_GAP_MS: f64 = 12.0;

// ─────────────────────────────────────────────────────────────────────────────
// Lexer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum LexItem<'p> {
    WordBreak,
    Phoneme {
        def: &'p PhonemeDef,
        stress: Stress,
        tied_to: bool,
        tied_from: bool,
        lengthened: bool,
    },
}

const TIE: char = '\u{361}';
const LONG: char = 'ː';

/// Lex normalized IPA into pack clusters.
///
/// A pending stress mark attaches to the next recognized phoneme.  Tied
/// clusters (`t͡ʃ`) are looked up as three scalars, lengthened ones (`aː`)
/// as two; on a miss the lexer falls back to the single base scalar but
/// keeps the diacritic flags.  Unrecognized scalars are skipped.
fn lex<'p>(pack: &'p PackSet, text: &str) -> Vec<LexItem<'p>> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut pending_stress: Stress = 0;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            'ˈ' => {
                pending_stress = 1;
                i += 1;
                continue;
            }
            'ˌ' => {
                pending_stress = 2;
                i += 1;
                continue;
            }
            ' ' => {
                out.push(LexItem::WordBreak);
                i += 1;
                continue;
            }
            _ => {}
        }

        let lengthened = chars.get(i + 1) == Some(&LONG);
        let tied_to = chars.get(i + 1) == Some(&TIE);
        let tied_from = i > 0 && chars[i - 1] == TIE;

        let mut def = None;
        let mut consumed = 1usize;
        if tied_to {
            if i + 2 < chars.len() {
                let key: String = chars[i..i + 3].iter().collect();
                def = pack.phoneme(&key);
            }
            consumed = if def.is_some() { 3 } else { 2 };
        } else if lengthened {
            let key: String = chars[i..i + 2].iter().collect();
            def = pack.phoneme(&key);
            consumed = 2;
        }
        if def.is_none() {
            def = pack.phoneme(&c.to_string());
        }

        if let Some(def) = def {
            out.push(LexItem::Phoneme {
                def,
                stress: pending_stress,
                tied_to,
                tied_from,
                lengthened,
            });
            pending_stress = 0;
        }
        i += consumed;
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────────────────────────────────────

fn flags_of(tok: &Token) -> PhonemeFlags {
    tok.def.map(|d| d.flags).unwrap_or_default()
}

/// Assemble lexed phonemes into the token sequence: word/syllable starts,
/// stress attachment, aspiration tails, and the three micro-silences.
fn assemble<'p>(pack: &'p PackSet, lexed: Vec<LexItem<'p>>) -> Vec<Token<'p>> {
    let mut out: Vec<Token<'p>> = Vec::new();
    let mut new_word = true;
    // Last phoneme token (micro-gaps excluded), and the start of the
    // syllable currently being built.
    let mut last_idx: Option<usize> = None;
    let mut syl_idx: Option<usize> = None;

    for item in lexed {
        let (def, stress, tied_to, tied_from, lengthened) = match item {
            LexItem::WordBreak => {
                new_word = true;
                continue;
            }
            LexItem::Phoneme { def, stress, tied_to, tied_from, lengthened } => {
                (def, stress, tied_to, tied_from, lengthened)
            }
        };

        let mut tok = Token::phoneme(def);
        tok.tied_to = tied_to;
        tok.tied_from = tied_from;
        tok.lengthened = lengthened;

        // A consonant directly before a vowel starts that vowel's syllable;
        // a primary stress right after a vowel starts a fresh one.
        let mut current_is_syl_start = false;
        if let Some(li) = last_idx {
            let last_is_vowel = out[li].is_vowel();
            if !last_is_vowel && tok.is_vowel() {
                out[li].syllable_start = true;
                syl_idx = Some(li);
            } else if stress == 1 && last_is_vowel {
                tok.syllable_start = true;
                current_is_syl_start = true;
            }
        }

        // Voiceless stop released into a voiced continuant: insert the
        // aspiration tail (the pack's /h/, which copies its formants from
        // the neighbor later).
        if let Some(li) = last_idx {
            let prev = flags_of(&out[li]);
            let cur = def.flags;
            if prev.stop && !prev.voiced && cur.voiced && !cur.stop && !cur.affricate {
                if let Some(h) = pack.phoneme("h") {
                    let mut asp = Token::phoneme(h);
                    asp.post_stop_aspiration = true;
                    out.push(asp);
                    last_idx = Some(out.len() - 1);
                }
            }
        }

        // Micro-silences between directly adjacent segments.
        if let Some(li) = last_idx {
            if li + 1 == out.len() {
                let prev = &out[li];
                let prev_flags = flags_of(prev);
                if prev_flags.fricative && def.flags.fricative {
                    let mut gap = Token::silence();
                    gap.cluster_gap = true;
                    out.push(gap);
                } else if prev.is_vowel() && def.flags.vowel && !tied_from && !prev.tied_to {
                    let mut gap = Token::silence();
                    gap.vowel_hiatus_gap = true;
                    out.push(gap);
                }
            }
        }

        if new_word {
            new_word = false;
            tok.word_start = true;
            tok.syllable_start = true;
            current_is_syl_start = true;
        }

        if stress == 0 && (def.flags.stop || def.flags.affricate) {
            let mut gap = Token::silence();
            gap.pre_stop_gap = true;
            out.push(gap);
        }

        out.push(tok);
        let idx = out.len() - 1;
        last_idx = Some(idx);
        if current_is_syl_start {
            syl_idx = Some(idx);
        }
        if stress > 0 {
            let target = syl_idx.unwrap_or(idx);
            out[target].stress = stress;
        }
    }

    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Copy-adjacent correction
// ─────────────────────────────────────────────────────────────────────────────

/// Phonemes flagged `copyAdjacent` (e.g. /h/ and inserted aspiration tails)
/// take every field they lack from the following real phoneme, or from the
/// preceding one when there is no following.
fn correct_copy_adjacent(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        let is_copy = tokens[i].def.map_or(false, |d| d.flags.copy_adjacent);
        if !is_copy {
            continue;
        }

        let next_ok = i + 1 < tokens.len() && !tokens[i + 1].silence;
        let adjacent = if next_ok {
            Some(i + 1)
        } else if i > 0 {
            Some(i - 1)
        } else {
            None
        };
        let Some(adj) = adjacent else { continue };

        let copied: Vec<(FieldId, f64)> = FieldId::ALL
            .iter()
            .filter(|&&id| !tokens[i].has_field(id) && tokens[adj].has_field(id))
            .map(|&id| (id, tokens[adj].field(id)))
            .collect();
        for (id, v) in copied {
            tokens[i].set_field(id, v);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Durations
// ─────────────────────────────────────────────────────────────────────────────

/// Assign per-token duration and default fade, in milliseconds.
///
/// The working speed is re-derived at every syllable start: primary-stress
/// syllables run at `speed / 1.25`, secondary at `speed / 1.07`.
fn calculate_times(tokens: &mut [Token], base_speed: f64) {
    let base_speed = if base_speed > 0.0 { base_speed } else { 1.0 };
    let mut speed = base_speed;
    let mut syllable_stress: Stress = 0;

    for i in 0..tokens.len() {
        let prev_flags = if i > 0 { flags_of(&tokens[i - 1]) } else { PhonemeFlags::default() };
        let next = tokens.get(i + 1).map(|t| (t.word_start, flags_of(t)));

        let t = &mut tokens[i];
        if t.syllable_start {
            syllable_stress = t.stress;
            speed = match syllable_stress {
                1 => base_speed / 1.25,
                2 => base_speed / 1.07,
                _ => base_speed,
            };
        }

        let flags = t.def.map(|d| d.flags).unwrap_or_default();
        let mut duration = 60.0 / speed;
        let mut fade = 10.0 / speed;

        if t.pre_stop_gap {
            duration = 41.0 / speed;
        } else if t.cluster_gap {
            duration = CLUSTER_GAP_MS / speed;
        } else if t.vowel_hiatus_gap {
            duration = VOWEL_HIATUS_GAP_MS / speed;
        } else if t.post_stop_aspiration {
            duration = 20.0 / speed;
        } else if flags.tap || flags.trill {
            // Keep taps and trills short without forcing a stop-style gap.
            duration = if flags.trill { 22.0 / speed } else { (14.0 / speed).min(14.0) };
            fade = 0.001;
        } else if flags.stop {
            duration = (6.0 / speed).min(6.0);
            fade = 0.001;
        } else if flags.affricate {
            duration = 24.0 / speed;
            fade = 0.001;
        } else if !flags.voiced {
            duration = 45.0 / speed;
        } else if flags.vowel {
            if prev_flags.liquid || prev_flags.semivowel {
                fade = 25.0 / speed;
            }
            if t.tied_to {
                duration = 50.0 / speed;
            } else if t.tied_from {
                duration = 26.0 / speed;
                fade = 10.0 / speed;
            } else if syllable_stress == 0 && !t.syllable_start {
                // Unstressed vowel gliding into a same-word liquid/nasal.
                if let Some((next_word_start, next_flags)) = next {
                    if !next_word_start && (next_flags.liquid || next_flags.nasal) {
                        duration =
                            if next_flags.liquid { 45.0 / speed } else { 50.0 / speed };
                    }
                }
            }
        } else {
            duration = 30.0 / speed;
            if flags.liquid || flags.semivowel {
                fade = 12.0 / speed;
            }
        }

        if t.lengthened {
            duration *= 1.05;
        }
        if flags.vowel && duration < MIN_VOWEL_DURATION_MS {
            duration = MIN_VOWEL_DURATION_MS;
        }

        t.duration_ms = duration;
        t.fade_ms = fade;
        t.clamp_fade();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Convert an IPA string into the initial token sequence.
///
/// Produces an empty sequence for empty (or all-marker) input; fails when a
/// non-empty stream contains nothing the pack recognizes.
pub fn build_tokens<'p>(
    pack: &'p PackSet,
    lang_tag: &str,
    ipa: &str,
    speed: f64,
    base_pitch: f64,
    inflection: f64,
    clause_type: char,
) -> Result<Vec<Token<'p>>> {
    let normalized = normalize_ipa(ipa, lang_tag, pack);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let lexed = lex(pack, &normalized);
    let mut tokens = assemble(pack, lexed);
    if tokens.is_empty() {
        bail!("IPA conversion failed: no recognizable phonemes in {:?}", ipa);
    }

    correct_copy_adjacent(&mut tokens);
    calculate_times(&mut tokens, speed);
    intonation::calculate_pitches(&mut tokens, base_pitch, inflection, clause_type);

    Ok(tokens)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
