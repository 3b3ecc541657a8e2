//! The mutable working unit of the pipeline.
//!
//! One token per emitted phonetic segment, including inserted
//! micro-silences.  Tokens layer per-token field overrides on top of the
//! borrowed pack definition; every pipeline pass mutates tokens in place
//! and nothing downstream of the builder may create or reorder them.

use crate::fields::{FieldId, FieldSet};
use crate::pack::{PackSet, PhonemeDef};

/// Stress level of a syllable start (0 = none, 1 = primary, 2 = secondary).
pub type Stress = u8;

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'p> {
    /// Borrowed pack definition; absent for pure silences.
    pub def: Option<&'p PhonemeDef>,
    /// True when the token contributes only timing, not formants.
    pub silence: bool,
    /// Per-token overrides layered on top of `def`.
    pub fields: FieldSet,

    /// Timing in milliseconds at nominal speed; `fade_ms` is the crossfade
    /// **into** this token from the previous one.
    pub duration_ms: f64,
    pub fade_ms: f64,

    /// First non-silence token of a lexical word.
    pub word_start: bool,
    pub syllable_start: bool,
    pub stress: Stress,

    /// Tie-bar and length diacritics from the lexer.
    pub tied_to: bool,
    pub tied_from: bool,
    pub lengthened: bool,

    /// Purposeful micro-silence markers.
    pub pre_stop_gap: bool,
    pub cluster_gap: bool,
    pub vowel_hiatus_gap: bool,

    /// This token is a stop's aspiration tail.
    pub post_stop_aspiration: bool,
}

impl<'p> Token<'p> {
    pub fn phoneme(def: &'p PhonemeDef) -> Self {
        Token {
            def: Some(def),
            silence: false,
            fields: FieldSet::new(),
            duration_ms: 0.0,
            fade_ms: 0.0,
            word_start: false,
            syllable_start: false,
            stress: 0,
            tied_to: false,
            tied_from: false,
            lengthened: false,
            pre_stop_gap: false,
            cluster_gap: false,
            vowel_hiatus_gap: false,
            post_stop_aspiration: false,
        }
    }

    pub fn silence() -> Self {
        Token { silence: true, ..Token::none() }
    }

    fn none() -> Self {
        Token {
            def: None,
            silence: false,
            fields: FieldSet::new(),
            duration_ms: 0.0,
            fade_ms: 0.0,
            word_start: false,
            syllable_start: false,
            stress: 0,
            tied_to: false,
            tied_from: false,
            lengthened: false,
            pre_stop_gap: false,
            cluster_gap: false,
            vowel_hiatus_gap: false,
            post_stop_aspiration: false,
        }
    }

    // ─── Two-layer field lookup ──────────────────────────────────────────────

    /// Effective value: token override if set, else def value if set, else 0.
    pub fn field(&self, id: FieldId) -> f64 {
        if let Some(v) = self.fields.get(id) {
            return v;
        }
        if let Some(def) = self.def {
            if let Some(v) = def.fields.get(id) {
                return v;
            }
        }
        0.0
    }

    /// True when either layer defines the field.
    pub fn has_field(&self, id: FieldId) -> bool {
        self.fields.has(id) || self.def.map_or(false, |d| d.fields.has(id))
    }

    /// Write to the token layer and mark the field present there.
    /// The pack definition is never mutated.
    pub fn set_field(&mut self, id: FieldId, value: f64) {
        self.fields.set(id, value);
    }

    // ─── Classification ──────────────────────────────────────────────────────

    pub fn is_silence_or_missing(&self) -> bool {
        self.silence || self.def.is_none()
    }

    pub fn is_vowel(&self) -> bool {
        self.def.map_or(false, |d| d.flags.vowel)
    }

    pub fn is_vowel_like(&self) -> bool {
        self.def.map_or(false, |d| d.flags.vowel || d.flags.semivowel)
    }

    /// Any non-silence phoneme that is not a vowel.
    pub fn is_consonant(&self) -> bool {
        self.def.map_or(false, |d| !d.flags.vowel)
    }

    /// Stops, affricates, and aspiration tails (the tail behaves as part of
    /// the release for boundary rules).
    pub fn is_stop_like(&self) -> bool {
        if self.silence || self.def.is_none() {
            return false;
        }
        if self.post_stop_aspiration {
            return true;
        }
        let flags = self.def.unwrap().flags;
        flags.stop || flags.affricate
    }

    /// Fricative-like segments are recognized by a non-zero effective
    /// frication amplitude rather than by flag.
    pub fn is_fricative_like(&self) -> bool {
        if self.silence || self.def.is_none() {
            return false;
        }
        self.field(FieldId::FricationAmplitude) > 0.0
    }

    pub fn is_voiced(&self) -> bool {
        self.def.map_or(false, |d| d.flags.voiced)
    }

    // ─── Timing ──────────────────────────────────────────────────────────────

    /// Restore the `0 ≤ fade_ms ≤ duration_ms` invariant after a write.
    pub fn clamp_fade(&mut self) {
        if self.duration_ms < 0.0 {
            self.duration_ms = 0.0;
        }
        if self.fade_ms < 0.0 {
            self.fade_ms = 0.0;
        }
        if self.fade_ms > self.duration_ms {
            self.fade_ms = self.duration_ms;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pass context
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only call parameters carried through every pass.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'p> {
    pub pack: &'p PackSet,
    pub speed: f64,
    pub base_pitch: f64,
    pub inflection: f64,
    pub clause_type: char,
}

impl<'p> PassContext<'p> {
    /// Non-positive speeds are treated as nominal.
    pub fn effective_speed(&self) -> f64 {
        if self.speed > 0.0 {
            self.speed
        } else {
            1.0
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PhonemeFlags;

    fn def(flags: PhonemeFlags, fields: &[(FieldId, f64)]) -> PhonemeDef {
        let mut fs = FieldSet::new();
        for (id, v) in fields {
            fs.set(*id, *v);
        }
        PhonemeDef { key: vec!['x'], flags, fields: fs }
    }

    #[test]
    fn test_field_lookup_layering() {
        let d = def(
            PhonemeFlags { vowel: true, voiced: true, ..Default::default() },
            &[(FieldId::Cf1, 700.0), (FieldId::Cf2, 1200.0)],
        );
        let mut tok = Token::phoneme(&d);

        // Def layer.
        assert_eq!(tok.field(FieldId::Cf2), 1200.0);
        // Unset on both layers.
        assert_eq!(tok.field(FieldId::Cf3), 0.0);
        assert!(!tok.has_field(FieldId::Cf3));

        // Token override wins; the def stays untouched.
        tok.set_field(FieldId::Cf2, 1500.0);
        assert_eq!(tok.field(FieldId::Cf2), 1500.0);
        assert_eq!(d.fields.get(FieldId::Cf2), Some(1200.0));
    }

    #[test]
    fn test_explicit_zero_override_masks_def() {
        let d = def(PhonemeFlags::default(), &[(FieldId::FricationAmplitude, 0.8)]);
        let mut tok = Token::phoneme(&d);
        assert!(tok.is_fricative_like());

        tok.set_field(FieldId::FricationAmplitude, 0.0);
        assert_eq!(tok.field(FieldId::FricationAmplitude), 0.0);
        assert!(!tok.is_fricative_like());
    }

    #[test]
    fn test_silence_classification() {
        let tok = Token::silence();
        assert!(tok.is_silence_or_missing());
        assert!(!tok.is_vowel_like());
        assert!(!tok.is_stop_like());
        assert!(!tok.is_fricative_like());
        assert_eq!(tok.field(FieldId::Cf1), 0.0);
    }

    #[test]
    fn test_aspiration_tail_is_stop_like() {
        let h = def(PhonemeFlags { copy_adjacent: true, ..Default::default() }, &[]);
        let mut tok = Token::phoneme(&h);
        assert!(!tok.is_stop_like());
        tok.post_stop_aspiration = true;
        assert!(tok.is_stop_like());
    }

    #[test]
    fn test_clamp_fade() {
        let mut tok = Token::silence();
        tok.duration_ms = 30.0;
        tok.fade_ms = 45.0;
        tok.clamp_fade();
        assert_eq!(tok.fade_ms, 30.0);

        tok.fade_ms = -2.0;
        tok.clamp_fade();
        assert_eq!(tok.fade_ms, 0.0);
    }

    #[test]
    fn test_effective_speed_clamps_non_positive() {
        let pack = PackSet::default();
        let mut ctx = PassContext {
            pack: &pack,
            speed: 0.0,
            base_pitch: 100.0,
            inflection: 0.5,
            clause_type: '.',
        };
        assert_eq!(ctx.effective_speed(), 1.0);
        ctx.speed = -3.0;
        assert_eq!(ctx.effective_speed(), 1.0);
        ctx.speed = 2.0;
        assert_eq!(ctx.effective_speed(), 2.0);
    }
}
