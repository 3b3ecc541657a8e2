//! Boundary smoothing pass.
//!
//! Enforces a minimum crossfade at phonetic-class transitions (vowel↔stop,
//! vowel→fricative) so that edge discontinuities between very different
//! spectra stay hidden.  The fade always belongs to the *incoming* token —
//! the one being crossfaded into.

use crate::token::{PassContext, Token};

/// Inserted micro-gaps and silences up to this long are looked through when
/// finding the preceding real phoneme; longer unmarked pauses end the
/// search, since phonemes across a prosodic pause are not adjacent.
const MAX_SKIP_SILENCE_MS: f64 = 60.0;

fn find_prev_real(tokens: &[Token], i: usize) -> Option<usize> {
    for j in (0..i).rev() {
        let t = &tokens[j];
        if !t.is_silence_or_missing() {
            return Some(j);
        }
        if t.silence {
            let micro_gap = t.pre_stop_gap || t.cluster_gap || t.vowel_hiatus_gap;
            if !micro_gap && t.duration_ms > MAX_SKIP_SILENCE_MS {
                break;
            }
        }
    }
    None
}

pub fn run(ctx: &PassContext, tokens: &mut [Token]) {
    let lang = &ctx.pack.lang;
    if !lang.boundary_smoothing_enabled || tokens.len() < 2 {
        return;
    }

    // Thresholds are ms at speed 1.0; faster speech shortens them, slower
    // speech does not stretch them.
    let sp = ctx.speed.max(1.0);
    let v2s = lang.boundary_smoothing_vowel_to_stop_fade_ms.max(0.0) / sp;
    let s2v = lang.boundary_smoothing_stop_to_vowel_fade_ms.max(0.0) / sp;
    let v2f = lang.boundary_smoothing_vowel_to_fric_fade_ms.max(0.0) / sp;

    for i in 0..tokens.len() {
        if tokens[i].is_silence_or_missing() {
            continue;
        }
        let Some(prev_idx) = find_prev_real(tokens, i) else { continue };

        let prev_vowel_like = tokens[prev_idx].is_vowel_like();
        let prev_stop_like = tokens[prev_idx].is_stop_like();
        let cur_vowel_like = tokens[i].is_vowel_like();
        let cur_stop_like = tokens[i].is_stop_like();
        let cur_fricative_like = tokens[i].is_fricative_like();

        let cur = &mut tokens[i];
        if v2s > 0.0 && prev_vowel_like && cur_stop_like {
            cur.fade_ms = cur.fade_ms.max(v2s);
            cur.clamp_fade();
        } else if s2v > 0.0 && prev_stop_like && cur_vowel_like {
            cur.fade_ms = cur.fade_ms.max(s2v);
            cur.clamp_fade();
        } else if v2f > 0.0 && prev_vowel_like && cur_fricative_like {
            cur.fade_ms = cur.fade_ms.max(v2f);
            cur.clamp_fade();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
