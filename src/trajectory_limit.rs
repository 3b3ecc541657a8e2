//! Trajectory limit pass.
//!
//! Caps how quickly tracked formants may move at token boundaries.  For
//! each adjacent pair of real phonemes, the jump in every tracked field
//! implies a minimum transition time (`|Δ| / maxSlope`); the incoming
//! token's crossfade is raised to the largest such requirement.  Runs after
//! coarticulation and boundary smoothing so their fade minima are
//! respected and only ever raised further.

use crate::fields::FieldId;
use crate::token::{PassContext, Token};

pub fn run(ctx: &PassContext, tokens: &mut [Token]) {
    let lang = &ctx.pack.lang;
    if !lang.trajectory_limit_enabled {
        return;
    }

    // Slopes are Hz per second; a non-positive slope untracks the field.
    let tracked = [
        (FieldId::Cf1, lang.trajectory_limit_slope_cf1),
        (FieldId::Cf2, lang.trajectory_limit_slope_cf2),
        (FieldId::Cf3, lang.trajectory_limit_slope_cf3),
    ];
    let sp = ctx.effective_speed();

    for i in 1..tokens.len() {
        if tokens[i].is_silence_or_missing() || tokens[i - 1].is_silence_or_missing() {
            continue;
        }

        let mut required_ms = 0.0f64;
        for (id, slope) in tracked {
            if slope <= 0.0 {
                continue;
            }
            // Only limit transitions defined on both ends.
            if !tokens[i - 1].has_field(id) || !tokens[i].has_field(id) {
                continue;
            }
            let delta = (tokens[i].field(id) - tokens[i - 1].field(id)).abs();
            required_ms = required_ms.max(delta / slope * 1000.0 / sp);
        }

        if required_ms > 0.0 {
            let cur = &mut tokens[i];
            cur.fade_ms = cur.fade_ms.max(required_ms);
            cur.clamp_fade();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldSet;
    use crate::pack::{PackSet, PhonemeDef, PhonemeFlags};

    fn vowel(cf1: f64, cf2: f64) -> PhonemeDef {
        let mut fs = FieldSet::new();
        fs.set(FieldId::Cf1, cf1);
        fs.set(FieldId::Cf2, cf2);
        PhonemeDef {
            key: vec!['a'],
            flags: PhonemeFlags { vowel: true, voiced: true, ..Default::default() },
            fields: fs,
        }
    }

    fn token(d: &PhonemeDef, duration: f64, fade: f64) -> Token<'_> {
        let mut t = Token::phoneme(d);
        t.duration_ms = duration;
        t.fade_ms = fade;
        t
    }

    fn ctx(pack: &PackSet, speed: f64) -> PassContext<'_> {
        PassContext { pack, speed, base_pitch: 100.0, inflection: 0.5, clause_type: '.' }
    }

    #[test]
    fn test_large_jump_extends_fade() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let i = vowel(300.0, 2200.0);
        let mut tokens = vec![token(&a, 80.0, 0.0), token(&i, 80.0, 5.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        // cf2 jumps 1000 Hz at 10 kHz/s → 100 ms, clamped to the duration.
        assert!((tokens[1].fade_ms - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_requirement_is_max_over_tracked_fields() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf1 = 10_000.0;
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        pack.lang.trajectory_limit_slope_cf3 = 0.0;
        let a = vowel(700.0, 1200.0);
        let b = vowel(500.0, 1600.0);
        let mut tokens = vec![token(&a, 120.0, 0.0), token(&b, 120.0, 0.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        // cf1: 200/10k = 20 ms; cf2: 400/10k = 40 ms → 40 wins.
        assert!((tokens[1].fade_ms - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_by_speed() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let b = vowel(700.0, 1600.0);
        let mut tokens = vec![token(&a, 120.0, 0.0), token(&b, 120.0, 0.0)];
        run(&ctx(&pack, 2.0), &mut tokens);
        // 400/10k = 40 ms at nominal speed → 20 ms at 2×.
        assert!((tokens[1].fade_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_existing_fade_respected() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let b = vowel(700.0, 1300.0);
        let mut tokens = vec![token(&a, 120.0, 0.0), token(&b, 120.0, 25.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        // Requirement (10 ms) is below the existing fade: only max applies.
        assert!((tokens[1].fade_ms - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_field_missing_on_one_end_ignored() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let mut no_f2 = FieldSet::new();
        no_f2.set(FieldId::Cf1, 700.0);
        let b = PhonemeDef {
            key: vec!['b'],
            flags: PhonemeFlags { voiced: true, ..Default::default() },
            fields: no_f2,
        };
        let mut tokens = vec![token(&a, 120.0, 0.0), token(&b, 120.0, 0.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        assert_eq!(tokens[1].fade_ms, 0.0);
    }

    #[test]
    fn test_silence_pairs_skipped() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let i = vowel(300.0, 2200.0);
        let mut sil = Token::silence();
        sil.duration_ms = 40.0;
        let mut tokens = vec![token(&a, 80.0, 0.0), sil, token(&i, 80.0, 0.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        assert_eq!(tokens[2].fade_ms, 0.0);
    }

    #[test]
    fn test_disabled_pass_is_noop() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_enabled = false;
        let a = vowel(700.0, 1200.0);
        let i = vowel(300.0, 2200.0);
        let mut tokens = vec![token(&a, 80.0, 0.0), token(&i, 80.0, 0.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        assert_eq!(tokens[1].fade_ms, 0.0);
    }

    #[test]
    fn test_idempotent() {
        let mut pack = PackSet::default();
        pack.lang.trajectory_limit_slope_cf2 = 10_000.0;
        let a = vowel(700.0, 1200.0);
        let i = vowel(300.0, 2200.0);
        let mut tokens = vec![token(&a, 80.0, 0.0), token(&i, 80.0, 0.0)];
        run(&ctx(&pack, 1.0), &mut tokens);
        let once = tokens.clone();
        run(&ctx(&pack, 1.0), &mut tokens);
        assert_eq!(tokens, once);
    }
}
