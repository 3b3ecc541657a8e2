//! Coarticulation pass.
//!
//! Shifts consonant second-formant targets toward the spectral pattern of
//! their nearest vowel so that, e.g., /k/ before /i/ differs acoustically
//! from /k/ before /u/.  The shift aims at a per-place F2 locus, weighted
//! by how close the nearest vowel is, with a right (anticipatory) bias on
//! ties.  Velars before an immediately-adjacent front vowel get the velar
//! pinch instead: F2 and F3 converge toward the vowel.
//!
//! Vowels and silences are never mutated; all writes land on the token
//! override layer, leaving the pack untouched.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::fields::FieldId;
use crate::pack::{LanguagePack, PhonemeDef};
use crate::token::{PassContext, Token};

// ─────────────────────────────────────────────────────────────────────────────
// Place of articulation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Place {
    Labial,
    Alveolar,
    Velar,
}

/// Fixed lookup sets keyed by the phoneme's IPA cluster.  Consonants
/// outside these sets carry no locus data and are skipped.
static PLACE_OF_ARTICULATION: Lazy<HashMap<&'static str, Place>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for key in ["p", "b", "m", "f", "v", "w", "ʍ"] {
        m.insert(key, Place::Labial);
    }
    for key in ["t", "d", "n", "s", "z", "l", "r", "ɾ", "ɹ", "ɬ", "ɮ"] {
        m.insert(key, Place::Alveolar);
    }
    for key in ["k", "g", "ŋ", "x", "ɣ"] {
        m.insert(key, Place::Velar);
    }
    m
});

fn place_of(def: &PhonemeDef) -> Option<Place> {
    let key: String = def.key.iter().collect();
    PLACE_OF_ARTICULATION.get(key.as_str()).copied()
}

// ─────────────────────────────────────────────────────────────────────────────
// Vowel search
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct VowelHit {
    idx: usize,
    /// 0 = immediately adjacent.
    consonants_away: usize,
}

fn find_nearest_vowel_left(
    tokens: &[Token],
    i: usize,
    cross_word: bool,
    max_consonants: usize,
) -> Option<VowelHit> {
    let mut cons = 0usize;
    for j in (0..i).rev() {
        let prev = &tokens[j];

        // Silence breaks coarticulation context.
        if prev.is_silence_or_missing() {
            return None;
        }
        if prev.is_vowel_like() {
            return Some(VowelHit { idx: j, consonants_away: cons });
        }

        cons += 1;
        if cons > max_consonants {
            return None;
        }
        // Reached the start of the current word: don't cross further.
        if !cross_word && prev.word_start {
            return None;
        }
    }
    None
}

fn find_nearest_vowel_right(
    tokens: &[Token],
    i: usize,
    cross_word: bool,
    max_consonants: usize,
) -> Option<VowelHit> {
    let mut cons = 0usize;
    for (j, next) in tokens.iter().enumerate().skip(i + 1) {
        if next.is_silence_or_missing() {
            return None;
        }
        // Word boundary blocks anticipatory effects entirely.
        if !cross_word && next.word_start {
            return None;
        }
        if next.is_vowel_like() {
            return Some(VowelHit { idx: j, consonants_away: cons });
        }

        cons += 1;
        if cons > max_consonants {
            return None;
        }
    }
    None
}

/// Gentle distance decay; the right-bias and monotonic-fade properties
/// depend on this exact formula.
fn hit_weight(hit: Option<&VowelHit>) -> f64 {
    match hit {
        Some(h) => 1.0 / (h.consonants_away as f64 + 1.0),
        None => 0.0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formant shifts
// ─────────────────────────────────────────────────────────────────────────────

/// Blend one formant of the consonant toward `locus`.
///
/// A consonant with no value for the formant at all (e.g. a stop that only
/// defines burst formants) starts from the adjacent vowel's value, or from
/// the locus itself when the vowel has none either.
fn apply_locus_shift(
    tok: &mut Token,
    formant: FieldId,
    locus: f64,
    strength: f64,
    adjacent_vowel_value: Option<f64>,
) {
    let mut current = tok.field(formant);
    if current <= 0.0 {
        if let Some(v) = adjacent_vowel_value {
            current = v;
        }
        if current <= 0.0 {
            current = locus;
        }
    }
    tok.set_field(formant, current + (locus - current) * strength);
}

/// Velar pinch: before front vowels, F2 and F3 converge.
fn apply_velar_pinch(tok: &mut Token, vowel_f2: f64, lang: &LanguagePack, strength: f64) {
    let strength = strength.clamp(0.0, 1.0);
    if strength <= 0.0 {
        return;
    }
    if vowel_f2 < lang.coarticulation_velar_pinch_threshold {
        // Back vowel: no pinch needed.
        return;
    }

    let pinch_f2 = vowel_f2 * lang.coarticulation_velar_pinch_f2_scale;
    let pinch_f3 = lang.coarticulation_velar_pinch_f3;

    let mut blend_toward = |id: FieldId, target: f64| {
        let mut cur = tok.field(id);
        if cur <= 0.0 {
            cur = target;
        }
        tok.set_field(id, cur + (target - cur) * strength);
    };

    blend_toward(FieldId::Cf2, pinch_f2);
    blend_toward(FieldId::Pf2, pinch_f2);
    if pinch_f3 > 0.0 {
        blend_toward(FieldId::Cf3, pinch_f3);
        blend_toward(FieldId::Pf3, pinch_f3);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pass entry point
// ─────────────────────────────────────────────────────────────────────────────

pub fn run(ctx: &PassContext, tokens: &mut [Token]) {
    let lang = &ctx.pack.lang;
    if !lang.coarticulation_enabled {
        return;
    }
    let strength = lang.coarticulation_strength.clamp(0.0, 1.0);
    if strength <= 0.0 {
        return;
    }
    let extent = lang.coarticulation_transition_extent.clamp(0.0, 1.0);
    let max_cons =
        (lang.coarticulation_adjacency_max_consonants.round() as i64).clamp(0, 6) as usize;

    for i in 0..tokens.len() {
        if tokens[i].is_silence_or_missing() || !tokens[i].is_consonant() {
            continue;
        }

        let Some(place) = tokens[i].def.and_then(place_of) else {
            continue;
        };
        let locus_f2 = match place {
            Place::Labial => lang.coarticulation_labial_f2_locus,
            Place::Alveolar => lang.coarticulation_alveolar_f2_locus,
            Place::Velar => lang.coarticulation_velar_f2_locus,
        };

        let left = find_nearest_vowel_left(tokens, i, false, max_cons);
        let right = find_nearest_vowel_right(tokens, i, false, max_cons);

        // Graduated mode scales strength by how close the nearest vowel is,
        // avoiding a hard on/off feel inside clusters.
        let mut weight = 1.0;
        if lang.coarticulation_graduated {
            weight = hit_weight(left.as_ref()).max(hit_weight(right.as_ref()));
            if weight <= 0.0 {
                continue;
            }
        }
        let eff_strength = strength * weight.clamp(0.0, 1.0);

        // Prefer the nearest vowel, biasing right (anticipatory) on ties.
        let adjacent_idx = match (left, right) {
            (l, Some(r)) if l.map_or(true, |l| r.consonants_away <= l.consonants_away) => {
                Some(r.idx)
            }
            (Some(l), _) => Some(l.idx),
            (None, Some(r)) => Some(r.idx),
            (None, None) => None,
        };

        let pinch_vowel = if place == Place::Velar && lang.coarticulation_velar_pinch_enabled {
            right.filter(|r| r.consonants_away == 0).map(|r| r.idx)
        } else {
            None
        };

        if let Some(vi) = pinch_vowel {
            let mut vowel_f2 = tokens[vi].field(FieldId::Cf2);
            if vowel_f2 <= 0.0 {
                vowel_f2 = tokens[vi].field(FieldId::Pf2);
            }
            apply_velar_pinch(&mut tokens[i], vowel_f2, lang, eff_strength);
        } else {
            // Normal locus shift, applied to both cascade and parallel F2
            // (whichever branch is active downstream).
            let adjacent =
                adjacent_idx.map(|a| (tokens[a].field(FieldId::Cf2), tokens[a].field(FieldId::Pf2)));
            apply_locus_shift(&mut tokens[i], FieldId::Cf2, locus_f2, eff_strength, adjacent.map(|a| a.0));
            apply_locus_shift(&mut tokens[i], FieldId::Pf2, locus_f2, eff_strength, adjacent.map(|a| a.1));
        }

        // Longer fade into the consonant for smoother transitions.
        if lang.coarticulation_fade_into_consonants && extent > 0.0 && tokens[i].duration_ms > 0.0
        {
            let mut min_fade = tokens[i].duration_ms * extent;
            if lang.coarticulation_graduated {
                min_fade *= weight.clamp(0.0, 1.0);
            }
            // Keep word-initial consonants crisper.
            if tokens[i].word_start {
                min_fade *= lang.coarticulation_word_initial_fade_scale;
            }
            let t = &mut tokens[i];
            t.fade_ms = t.fade_ms.max(min_fade);
            t.clamp_fade();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
