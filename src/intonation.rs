//! Clause intonation — pitch contours over the token sequence.
//!
//! The utterance splits into pre-head (everything before the first
//! primary-stressed syllable), head (first stress up to the nucleus),
//! nucleus (last primary-stressed syllable) and tail.  Each region gets a
//! linear pitch path; within the head, each stressed syllable steps down a
//! declination pattern and unstressed runs sit slightly below the
//! preceding stress.
//!
//! Pitch percentages are mapped exponentially around the base pitch:
//! `pitch = base · 2^(((percent − 50) / 50) · inflection)`, so an
//! inflection of 0 flattens every contour to the base pitch.

use std::ops::Range;

use crate::fields::FieldId;
use crate::token::Token;

/// Pitch-contour parameters for one clause type.
#[derive(Debug, Clone)]
pub struct ClauseIntonation {
    pub pre_head_start: f64,
    pub pre_head_end: f64,
    pub head_extend_from: usize,
    pub head_start: f64,
    pub head_end: f64,
    pub head_steps: &'static [f64],
    pub head_stress_end_delta: f64,
    pub head_unstressed_run_start_delta: f64,
    pub head_unstressed_run_end_delta: f64,
    /// Nucleus path when the clause has no tail.
    pub nucleus0_start: f64,
    pub nucleus0_end: f64,
    pub nucleus_start: f64,
    pub nucleus_end: f64,
    pub tail_start: f64,
    pub tail_end: f64,
}

static FULL_STOP: ClauseIntonation = ClauseIntonation {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 4,
    head_start: 80.0,
    head_end: 50.0,
    head_steps: &[100.0, 75.0, 50.0, 25.0, 0.0, 63.0, 38.0, 13.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -8.0,
    head_unstressed_run_end_delta: -5.0,
    nucleus0_start: 64.0,
    nucleus0_end: 8.0,
    nucleus_start: 70.0,
    nucleus_end: 18.0,
    tail_start: 24.0,
    tail_end: 8.0,
};

static COMMA: ClauseIntonation = ClauseIntonation {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 4,
    head_start: 80.0,
    head_end: 60.0,
    head_steps: &[100.0, 75.0, 50.0, 25.0, 0.0, 63.0, 38.0, 13.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -8.0,
    head_unstressed_run_end_delta: -5.0,
    nucleus0_start: 34.0,
    nucleus0_end: 52.0,
    nucleus_start: 78.0,
    nucleus_end: 34.0,
    tail_start: 34.0,
    tail_end: 52.0,
};

static QUESTION: ClauseIntonation = ClauseIntonation {
    pre_head_start: 45.0,
    pre_head_end: 56.0,
    head_extend_from: 3,
    head_start: 75.0,
    head_end: 43.0,
    head_steps: &[100.0, 75.0, 50.0, 20.0, 60.0, 35.0, 11.0, 0.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -7.0,
    head_unstressed_run_end_delta: 0.0,
    nucleus0_start: 34.0,
    nucleus0_end: 68.0,
    nucleus_start: 86.0,
    nucleus_end: 21.0,
    tail_start: 34.0,
    tail_end: 68.0,
};

static EXCLAMATION: ClauseIntonation = ClauseIntonation {
    pre_head_start: 46.0,
    pre_head_end: 57.0,
    head_extend_from: 3,
    head_start: 90.0,
    head_end: 50.0,
    head_steps: &[100.0, 75.0, 50.0, 16.0, 82.0, 50.0, 32.0, 16.0],
    head_stress_end_delta: -16.0,
    head_unstressed_run_start_delta: -9.0,
    head_unstressed_run_end_delta: 0.0,
    nucleus0_start: 92.0,
    nucleus0_end: 4.0,
    nucleus_start: 92.0,
    nucleus_end: 80.0,
    tail_start: 76.0,
    tail_end: 4.0,
};

/// Parameters for a clause-type character; unknown types read as `.`.
pub fn clause_intonation(clause_type: char) -> &'static ClauseIntonation {
    match clause_type {
        ',' => &COMMA,
        '?' => &QUESTION,
        '!' => &EXCLAMATION,
        _ => &FULL_STOP,
    }
}

fn pitch_from_percent(base_pitch: f64, inflection: f64, percent: f64) -> f64 {
    base_pitch * 2f64.powf(((percent - 50.0) / 50.0) * inflection)
}

/// Write a linear pitch path over `range`, interpolated across the voiced
/// duration only, into `voicePitch`/`endVoicePitch` of every token.
pub fn apply_pitch_path(
    tokens: &mut [Token],
    range: Range<usize>,
    base_pitch: f64,
    inflection: f64,
    start_percent: f64,
    end_percent: f64,
) {
    let start_pitch = pitch_from_percent(base_pitch, inflection, start_percent);
    let end_pitch = pitch_from_percent(base_pitch, inflection, end_percent);

    let voiced_duration: f64 = tokens[range.clone()]
        .iter()
        .filter(|t| t.is_voiced())
        .map(|t| t.duration_ms)
        .sum();

    let pitch_delta = end_pitch - start_pitch;
    let mut cur_duration = 0.0;
    let mut cur_pitch = start_pitch;
    for t in &mut tokens[range] {
        t.set_field(FieldId::VoicePitch, cur_pitch);
        if t.is_voiced() && voiced_duration > 0.0 {
            cur_duration += t.duration_ms;
            cur_pitch = start_pitch + pitch_delta * (cur_duration / voiced_duration);
        }
        t.set_field(FieldId::EndVoicePitch, cur_pitch);
    }
}

/// Declination step sequence for head stresses: the listed steps first,
/// then cycling the suffix starting at `extend_from`.
struct StepSequence {
    steps: &'static [f64],
    extend_from: usize,
    i: usize,
}

impl StepSequence {
    fn next(&mut self) -> f64 {
        let v = if self.i < self.steps.len() {
            self.steps[self.i]
        } else {
            let cycle = &self.steps[self.extend_from..];
            cycle[(self.i - self.steps.len()) % cycle.len()]
        };
        self.i += 1;
        v
    }
}

/// Compute and write the full clause contour.
pub fn calculate_pitches(
    tokens: &mut [Token],
    base_pitch: f64,
    inflection: f64,
    clause_type: char,
) {
    let params = clause_intonation(clause_type);
    let n = tokens.len();

    // Pre-head: up to the first primary-stressed syllable.
    let mut pre_head_end = n;
    for (i, t) in tokens.iter().enumerate() {
        if t.syllable_start && t.stress == 1 {
            pre_head_end = i;
            break;
        }
    }
    if pre_head_end > 0 {
        apply_pitch_path(
            tokens,
            0..pre_head_end,
            base_pitch,
            inflection,
            params.pre_head_start,
            params.pre_head_end,
        );
    }

    // Nucleus: the last primary-stressed syllable; everything after its
    // following unstressed syllable start is the tail.
    let mut nucleus_start = n;
    let mut nucleus_end = n;
    let mut tail_start = n;
    let tail_end = n;
    let mut idx = n as isize - 1;
    while idx >= pre_head_end as isize {
        let t = &tokens[idx as usize];
        if t.syllable_start {
            if t.stress == 1 {
                nucleus_start = idx as usize;
                break;
            }
            nucleus_end = idx as usize;
            tail_start = idx as usize;
        }
        idx -= 1;
    }

    let has_tail = tail_end > tail_start;
    if has_tail {
        apply_pitch_path(
            tokens,
            tail_start..tail_end,
            base_pitch,
            inflection,
            params.tail_start,
            params.tail_end,
        );
    }
    if nucleus_end > nucleus_start {
        let (s, e) = if has_tail {
            (params.nucleus_start, params.nucleus_end)
        } else {
            (params.nucleus0_start, params.nucleus0_end)
        };
        apply_pitch_path(tokens, nucleus_start..nucleus_end, base_pitch, inflection, s, e);
    }

    // Head: stressed syllables step down the declination pattern; each
    // unstressed run hangs off the preceding stress's end pitch.
    if pre_head_end < nucleus_start {
        let mut steps =
            StepSequence { steps: params.head_steps, extend_from: params.head_extend_from, i: 0 };
        let mut last_stress_start: Option<usize> = None;
        let mut last_unstressed_run_start: Option<usize> = None;
        let mut stress_end_pitch = params.head_end;

        for index in pre_head_end..=nucleus_start {
            if !tokens[index].syllable_start {
                continue;
            }
            let is_stressed = tokens[index].stress == 1;

            if let Some(start) = last_stress_start.take() {
                let stress_start =
                    params.head_end + ((params.head_start - params.head_end) / 100.0) * steps.next();
                stress_end_pitch = stress_start + params.head_stress_end_delta;
                apply_pitch_path(
                    tokens,
                    start..index,
                    base_pitch,
                    inflection,
                    stress_start,
                    stress_end_pitch,
                );
            }
            if is_stressed {
                if let Some(start) = last_unstressed_run_start.take() {
                    apply_pitch_path(
                        tokens,
                        start..index,
                        base_pitch,
                        inflection,
                        stress_end_pitch + params.head_unstressed_run_start_delta,
                        stress_end_pitch + params.head_unstressed_run_end_delta,
                    );
                }
                last_stress_start = Some(index);
            } else if last_unstressed_run_start.is_none() {
                last_unstressed_run_start = Some(index);
            }
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
    use crate::pack::{PhonemeDef, PhonemeFlags};

    fn vowel_def() -> PhonemeDef {
        PhonemeDef {
            key: vec!['a'],
            flags: PhonemeFlags { vowel: true, voiced: true, ..Default::default() },
            fields: FieldSet::new(),
        }
    }

    fn voiced_token(def: &PhonemeDef, duration: f64) -> Token<'_> {
        let mut t = Token::phoneme(def);
        t.duration_ms = duration;
        t
    }

    #[test]
    fn test_pitch_from_percent_midpoint_is_base() {
        assert!((pitch_from_percent(100.0, 0.5, 50.0) - 100.0).abs() < 1e-9);
        // Full inflection, top of range: one octave up.
        assert!((pitch_from_percent(100.0, 1.0, 100.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_inflection_is_flat() {
        let def = vowel_def();
        let mut tokens = vec![voiced_token(&def, 50.0), voiced_token(&def, 50.0)];
        apply_pitch_path(&mut tokens, 0..2, 120.0, 0.0, 90.0, 10.0);
        for t in &tokens {
            assert!((t.field(FieldId::VoicePitch) - 120.0).abs() < 1e-9);
            assert!((t.field(FieldId::EndVoicePitch) - 120.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_path_interpolates_over_voiced_duration() {
        let def = vowel_def();
        let mut tokens = vec![voiced_token(&def, 30.0), voiced_token(&def, 30.0)];
        apply_pitch_path(&mut tokens, 0..2, 100.0, 1.0, 100.0, 0.0);

        let top = pitch_from_percent(100.0, 1.0, 100.0);
        let bottom = pitch_from_percent(100.0, 1.0, 0.0);
        // Interpolation is linear in Hz over the voiced duration.
        let mid = top + (bottom - top) * 0.5;
        assert!((tokens[0].field(FieldId::VoicePitch) - top).abs() < 1e-9);
        assert!((tokens[0].field(FieldId::EndVoicePitch) - mid).abs() < 1e-6);
        assert!((tokens[1].field(FieldId::VoicePitch) - mid).abs() < 1e-6);
        assert!((tokens[1].field(FieldId::EndVoicePitch) - bottom).abs() < 1e-9);
    }

    #[test]
    fn test_voiceless_stretch_keeps_flat_pitch() {
        let voiceless = PhonemeDef {
            key: vec!['s'],
            flags: PhonemeFlags { fricative: true, ..Default::default() },
            fields: FieldSet::new(),
        };
        let mut tokens = vec![voiced_token(&voiceless, 40.0)];
        apply_pitch_path(&mut tokens, 0..1, 100.0, 1.0, 100.0, 0.0);
        // No voiced duration at all: the start pitch carries through.
        let top = pitch_from_percent(100.0, 1.0, 100.0);
        assert!((tokens[0].field(FieldId::EndVoicePitch) - top).abs() < 1e-9);
    }

    #[test]
    fn test_step_sequence_cycles_suffix() {
        let mut s = StepSequence { steps: &[100.0, 75.0, 50.0, 25.0], extend_from: 2, i: 0 };
        let got: Vec<f64> = (0..8).map(|_| s.next()).collect();
        assert_eq!(got, vec![100.0, 75.0, 50.0, 25.0, 50.0, 25.0, 50.0, 25.0]);
    }

    #[test]
    fn test_every_token_gets_a_pitch() {
        let def = vowel_def();
        let mut tokens: Vec<Token> = (0..5).map(|_| voiced_token(&def, 40.0)).collect();
        tokens[0].syllable_start = true;
        tokens[0].stress = 1;
        tokens[2].syllable_start = true;
        tokens[4].syllable_start = true;
        tokens[4].stress = 1;
        calculate_pitches(&mut tokens, 100.0, 0.5, '.');
        for t in &tokens {
            assert!(t.fields.has(FieldId::VoicePitch));
            assert!(t.fields.has(FieldId::EndVoicePitch));
        }
    }

    #[test]
    fn test_question_nucleus_rises_without_tail() {
        // Single stressed syllable at the end: nucleus0 path applies.
        let def = vowel_def();
        let mut tokens: Vec<Token> = (0..2).map(|_| voiced_token(&def, 40.0)).collect();
        tokens[1].syllable_start = true;
        tokens[1].stress = 1;
        calculate_pitches(&mut tokens, 100.0, 1.0, '?');
        let q = clause_intonation('?');
        let expected_start = pitch_from_percent(100.0, 1.0, q.nucleus0_start);
        assert!((tokens[1].field(FieldId::VoicePitch) - expected_start).abs() < 1e-9);
        // Rising terminal: end above start.
        assert!(tokens[1].field(FieldId::EndVoicePitch) > tokens[1].field(FieldId::VoicePitch));
    }

    #[test]
    fn test_unknown_clause_type_reads_as_full_stop() {
        let a = clause_intonation('x') as *const ClauseIntonation;
        let b = clause_intonation('.') as *const ClauseIntonation;
        assert_eq!(a, b);
    }
}
