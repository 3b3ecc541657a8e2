//! Articulatory parameter identifiers and the dense field vector.
//!
//! Every entity that carries articulatory data (a phoneme definition, a
//! token, an emitted frame) stores the same fixed-size `f64` vector indexed
//! by [`FieldId`].  Definitions and tokens additionally carry a presence
//! bitmask so that "explicitly set to 0.0" and "absent" stay distinct — an
//! absent entry falls through to the next layer (token → def → zero).
//!
//! The field order is the wire order the downstream waveform engine
//! consumes; [`Frame`](crate::emit::Frame) relies on it, so never reorder
//! the variants.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Index into the dense articulatory parameter vector.
///
/// `cf*`/`cb*` are the cascade-branch formant frequencies and bandwidths,
/// `pf*`/`pb*`/`pa*` the parallel-branch frequencies, bandwidths, and
/// amplitudes.  `cfN0`/`cfNP` are the nasal zero / nasal pole pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum FieldId {
    VoicePitch,
    VibratoPitchOffset,
    VibratoSpeed,
    VoiceTurbulenceAmplitude,
    GlottalOpenQuotient,
    VoiceAmplitude,
    AspirationAmplitude,
    Cf1,
    Cf2,
    Cf3,
    Cf4,
    Cf5,
    Cf6,
    CfN0,
    CfNP,
    Cb1,
    Cb2,
    Cb3,
    Cb4,
    Cb5,
    Cb6,
    CbN0,
    CbNP,
    CaNP,
    FricationAmplitude,
    Pf1,
    Pf2,
    Pf3,
    Pf4,
    Pf5,
    Pf6,
    Pb1,
    Pb2,
    Pb3,
    Pb4,
    Pb5,
    Pb6,
    Pa1,
    Pa2,
    Pa3,
    Pa4,
    Pa5,
    Pa6,
    ParallelBypass,
    PreFormantGain,
    OutputGain,
    EndVoicePitch,
}

impl FieldId {
    /// Number of articulatory parameters.
    pub const COUNT: usize = 47;

    /// Every field, in wire order.
    pub const ALL: [FieldId; FieldId::COUNT] = [
        FieldId::VoicePitch,
        FieldId::VibratoPitchOffset,
        FieldId::VibratoSpeed,
        FieldId::VoiceTurbulenceAmplitude,
        FieldId::GlottalOpenQuotient,
        FieldId::VoiceAmplitude,
        FieldId::AspirationAmplitude,
        FieldId::Cf1,
        FieldId::Cf2,
        FieldId::Cf3,
        FieldId::Cf4,
        FieldId::Cf5,
        FieldId::Cf6,
        FieldId::CfN0,
        FieldId::CfNP,
        FieldId::Cb1,
        FieldId::Cb2,
        FieldId::Cb3,
        FieldId::Cb4,
        FieldId::Cb5,
        FieldId::Cb6,
        FieldId::CbN0,
        FieldId::CbNP,
        FieldId::CaNP,
        FieldId::FricationAmplitude,
        FieldId::Pf1,
        FieldId::Pf2,
        FieldId::Pf3,
        FieldId::Pf4,
        FieldId::Pf5,
        FieldId::Pf6,
        FieldId::Pb1,
        FieldId::Pb2,
        FieldId::Pb3,
        FieldId::Pb4,
        FieldId::Pb5,
        FieldId::Pb6,
        FieldId::Pa1,
        FieldId::Pa2,
        FieldId::Pa3,
        FieldId::Pa4,
        FieldId::Pa5,
        FieldId::Pa6,
        FieldId::ParallelBypass,
        FieldId::PreFormantGain,
        FieldId::OutputGain,
        FieldId::EndVoicePitch,
    ];

    /// Position in the dense vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire name, as used in language-pack YAML and by the downstream engine.
    pub fn name(self) -> &'static str {
        match self {
            FieldId::VoicePitch => "voicePitch",
            FieldId::VibratoPitchOffset => "vibratoPitchOffset",
            FieldId::VibratoSpeed => "vibratoSpeed",
            FieldId::VoiceTurbulenceAmplitude => "voiceTurbulenceAmplitude",
            FieldId::GlottalOpenQuotient => "glottalOpenQuotient",
            FieldId::VoiceAmplitude => "voiceAmplitude",
            FieldId::AspirationAmplitude => "aspirationAmplitude",
            FieldId::Cf1 => "cf1",
            FieldId::Cf2 => "cf2",
            FieldId::Cf3 => "cf3",
            FieldId::Cf4 => "cf4",
            FieldId::Cf5 => "cf5",
            FieldId::Cf6 => "cf6",
            FieldId::CfN0 => "cfN0",
            FieldId::CfNP => "cfNP",
            FieldId::Cb1 => "cb1",
            FieldId::Cb2 => "cb2",
            FieldId::Cb3 => "cb3",
            FieldId::Cb4 => "cb4",
            FieldId::Cb5 => "cb5",
            FieldId::Cb6 => "cb6",
            FieldId::CbN0 => "cbN0",
            FieldId::CbNP => "cbNP",
            FieldId::CaNP => "caNP",
            FieldId::FricationAmplitude => "fricationAmplitude",
            FieldId::Pf1 => "pf1",
            FieldId::Pf2 => "pf2",
            FieldId::Pf3 => "pf3",
            FieldId::Pf4 => "pf4",
            FieldId::Pf5 => "pf5",
            FieldId::Pf6 => "pf6",
            FieldId::Pb1 => "pb1",
            FieldId::Pb2 => "pb2",
            FieldId::Pb3 => "pb3",
            FieldId::Pb4 => "pb4",
            FieldId::Pb5 => "pb5",
            FieldId::Pb6 => "pb6",
            FieldId::Pa1 => "pa1",
            FieldId::Pa2 => "pa2",
            FieldId::Pa3 => "pa3",
            FieldId::Pa4 => "pa4",
            FieldId::Pa5 => "pa5",
            FieldId::Pa6 => "pa6",
            FieldId::ParallelBypass => "parallelBypass",
            FieldId::PreFormantGain => "preFormantGain",
            FieldId::OutputGain => "outputGain",
            FieldId::EndVoicePitch => "endVoicePitch",
        }
    }

    /// Reverse lookup from a wire name (pack YAML key).
    pub fn from_name(name: &str) -> Option<FieldId> {
        static BY_NAME: Lazy<HashMap<&'static str, FieldId>> =
            Lazy::new(|| FieldId::ALL.iter().map(|&id| (id.name(), id)).collect());
        BY_NAME.get(name).copied()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FieldSet
// ─────────────────────────────────────────────────────────────────────────────

/// Dense field vector plus a presence bitmask.
///
/// `get` distinguishes absent from zero; readers that want layered fallback
/// use [`Token::field`](crate::token::Token::field) instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSet {
    values: [f64; FieldId::COUNT],
    mask: u64,
}

impl Default for FieldSet {
    fn default() -> Self {
        FieldSet { values: [0.0; FieldId::COUNT], mask: 0 }
    }
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the field has been explicitly set on this layer.
    pub fn has(&self, id: FieldId) -> bool {
        self.mask & (1u64 << id.index()) != 0
    }

    /// The value if explicitly set, `None` otherwise.
    pub fn get(&self, id: FieldId) -> Option<f64> {
        if self.has(id) { Some(self.values[id.index()]) } else { None }
    }

    /// Set the value and mark it present.
    pub fn set(&mut self, id: FieldId, value: f64) {
        self.values[id.index()] = value;
        self.mask |= 1u64 << id.index();
    }

    /// Iterate over the explicitly-set entries, in wire order.
    pub fn iter_set(&self) -> impl Iterator<Item = (FieldId, f64)> + '_ {
        FieldId::ALL
            .iter()
            .filter(|id| self.has(**id))
            .map(|&id| (id, self.values[id.index()]))
    }

    /// Number of explicitly-set entries.
    pub fn len(&self) -> usize {
        self.mask.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
