//! Language packs — immutable per-language reference data.
//!
//! A pack directory holds one YAML file per language tag under `lang/`:
//!
//! ```yaml
//! settings:
//!   coarticulationEnabled: true
//!   coarticulationStrength: 0.5
//! phonemes:
//!   a:
//!     flags: [vowel, voiced]
//!     fields: { cf1: 780, cf2: 1320, cf3: 2500 }
//! ```
//!
//! Tags inherit along their prefix chain: loading `en-us-nyc` merges
//! `default.yaml`, `en.yaml`, `en-us.yaml`, `en-us-nyc.yaml` in that order.
//! Later layers override individual settings keys and whole phoneme
//! entries.  Missing layer files are skipped; a tag whose entire chain is
//! missing is a load error.
//!
//! All fade and gap settings are milliseconds at nominal speed 1.0 and are
//! divided by the call's effective speed at use time.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::fields::{FieldId, FieldSet};

// ─────────────────────────────────────────────────────────────────────────────
// Phoneme definitions
// ─────────────────────────────────────────────────────────────────────────────

/// Classification flags of a phoneme definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhonemeFlags {
    pub vowel: bool,
    pub semivowel: bool,
    pub stop: bool,
    pub affricate: bool,
    pub nasal: bool,
    pub liquid: bool,
    pub fricative: bool,
    pub voiced: bool,
    pub tap: bool,
    pub trill: bool,
    /// Token copies missing fields from its nearest real neighbor (used by
    /// /h/ and inserted aspiration tails, whose formants mirror the
    /// adjacent vowel).
    pub copy_adjacent: bool,
}

impl PhonemeFlags {
    fn set_by_name(&mut self, name: &str) -> Result<()> {
        match name {
            "vowel" => self.vowel = true,
            "semivowel" => self.semivowel = true,
            "stop" => self.stop = true,
            "affricate" => self.affricate = true,
            "nasal" => self.nasal = true,
            "liquid" => self.liquid = true,
            "fricative" => self.fricative = true,
            "voiced" => self.voiced = true,
            "tap" => self.tap = true,
            "trill" => self.trill = true,
            "copyAdjacent" => self.copy_adjacent = true,
            other => bail!("unknown phoneme flag '{}'", other),
        }
        Ok(())
    }
}

/// Immutable pack-resident data for one IPA cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeDef {
    /// The IPA cluster as Unicode scalars (used for place-of-articulation
    /// classification).
    pub key: Vec<char>,
    pub flags: PhonemeFlags,
    /// Default articulatory values.
    pub fields: FieldSet,
}

// ─────────────────────────────────────────────────────────────────────────────
// Language tuning knobs
// ─────────────────────────────────────────────────────────────────────────────

/// Scalar tuning knobs of a language pack (the `settings:` mapping).
///
/// Field names map 1:1 onto the YAML keys via camelCase renaming.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LanguagePack {
    /// Silent gap prepended between consecutive `queue_ipa` calls.
    pub segment_boundary_gap_ms: f64,
    pub segment_boundary_fade_ms: f64,

    pub boundary_smoothing_enabled: bool,
    pub boundary_smoothing_vowel_to_stop_fade_ms: f64,
    pub boundary_smoothing_stop_to_vowel_fade_ms: f64,
    pub boundary_smoothing_vowel_to_fric_fade_ms: f64,

    pub coarticulation_enabled: bool,
    pub coarticulation_strength: f64,
    pub coarticulation_transition_extent: f64,
    pub coarticulation_graduated: bool,
    pub coarticulation_adjacency_max_consonants: f64,
    pub coarticulation_fade_into_consonants: bool,
    pub coarticulation_word_initial_fade_scale: f64,

    pub coarticulation_labial_f2_locus: f64,
    pub coarticulation_alveolar_f2_locus: f64,
    pub coarticulation_velar_f2_locus: f64,

    pub coarticulation_velar_pinch_enabled: bool,
    pub coarticulation_velar_pinch_threshold: f64,
    pub coarticulation_velar_pinch_f2_scale: f64,
    pub coarticulation_velar_pinch_f3: f64,

    pub trajectory_limit_enabled: bool,
    /// Maximum formant slope in Hz per second; ≤ 0 untracks the field.
    pub trajectory_limit_slope_cf1: f64,
    pub trajectory_limit_slope_cf2: f64,
    pub trajectory_limit_slope_cf3: f64,
}

impl Default for LanguagePack {
    fn default() -> Self {
        LanguagePack {
            segment_boundary_gap_ms: 25.0,
            segment_boundary_fade_ms: 5.0,
            boundary_smoothing_enabled: true,
            boundary_smoothing_vowel_to_stop_fade_ms: 15.0,
            boundary_smoothing_stop_to_vowel_fade_ms: 25.0,
            boundary_smoothing_vowel_to_fric_fade_ms: 12.0,
            coarticulation_enabled: true,
            coarticulation_strength: 0.5,
            coarticulation_transition_extent: 0.4,
            coarticulation_graduated: true,
            coarticulation_adjacency_max_consonants: 2.0,
            coarticulation_fade_into_consonants: true,
            coarticulation_word_initial_fade_scale: 0.5,
            coarticulation_labial_f2_locus: 900.0,
            coarticulation_alveolar_f2_locus: 1700.0,
            coarticulation_velar_f2_locus: 1300.0,
            coarticulation_velar_pinch_enabled: true,
            coarticulation_velar_pinch_threshold: 1500.0,
            coarticulation_velar_pinch_f2_scale: 0.9,
            coarticulation_velar_pinch_f3: 2700.0,
            trajectory_limit_enabled: true,
            trajectory_limit_slope_cf1: 9000.0,
            trajectory_limit_slope_cf2: 16000.0,
            trajectory_limit_slope_cf3: 20000.0,
        }
    }
}

/// YAML keys the settings mapping recognizes; anything else is logged and
/// ignored so that newer packs keep loading on older frontends.
const KNOWN_SETTINGS: &[&str] = &[
    "segmentBoundaryGapMs",
    "segmentBoundaryFadeMs",
    "boundarySmoothingEnabled",
    "boundarySmoothingVowelToStopFadeMs",
    "boundarySmoothingStopToVowelFadeMs",
    "boundarySmoothingVowelToFricFadeMs",
    "coarticulationEnabled",
    "coarticulationStrength",
    "coarticulationTransitionExtent",
    "coarticulationGraduated",
    "coarticulationAdjacencyMaxConsonants",
    "coarticulationFadeIntoConsonants",
    "coarticulationWordInitialFadeScale",
    "coarticulationLabialF2Locus",
    "coarticulationAlveolarF2Locus",
    "coarticulationVelarF2Locus",
    "coarticulationVelarPinchEnabled",
    "coarticulationVelarPinchThreshold",
    "coarticulationVelarPinchF2Scale",
    "coarticulationVelarPinchF3",
    "trajectoryLimitEnabled",
    "trajectoryLimitSlopeCf1",
    "trajectoryLimitSlopeCf2",
    "trajectoryLimitSlopeCf3",
];

// ─────────────────────────────────────────────────────────────────────────────
// Pack set
// ─────────────────────────────────────────────────────────────────────────────

/// The loaded, immutable reference data for one language: tuning knobs plus
/// phoneme definitions keyed by IPA cluster.
///
/// Referentially stable for the lifetime of a session; swapping a pack is a
/// session reset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackSet {
    pub lang: LanguagePack,
    pub phonemes: HashMap<String, PhonemeDef>,
}

impl PackSet {
    pub fn phoneme(&self, key: &str) -> Option<&PhonemeDef> {
        self.phonemes.get(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Language tags
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize a language tag to the form used by pack filenames: lowercase,
/// hyphen-separated; empty means `default`.
pub fn normalize_lang_tag(tag: &str) -> String {
    let tag = tag.trim();
    if tag.is_empty() {
        return "default".to_string();
    }
    tag.replace('_', "-").to_ascii_lowercase()
}

/// The inheritance chain for a tag, most generic first:
/// `en-us-nyc` → `["default", "en", "en-us", "en-us-nyc"]`.
pub fn lang_tag_chain(tag: &str) -> Vec<String> {
    let tag = normalize_lang_tag(tag);
    let mut chain = vec!["default".to_string()];
    if tag == "default" {
        return chain;
    }
    let parts: Vec<&str> = tag.split('-').collect();
    for i in 1..=parts.len() {
        chain.push(parts[..i].join("-"));
    }
    chain
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PackFile {
    #[serde(default)]
    settings: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    phonemes: BTreeMap<String, PhonemeEntry>,
}

#[derive(Debug, Deserialize)]
struct PhonemeEntry {
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    fields: BTreeMap<String, f64>,
}

fn build_phoneme(key: &str, entry: &PhonemeEntry) -> Result<PhonemeDef> {
    let mut flags = PhonemeFlags::default();
    for name in &entry.flags {
        flags
            .set_by_name(name)
            .with_context(|| format!("phoneme '{}'", key))?;
    }

    let mut fields = FieldSet::new();
    for (name, value) in &entry.fields {
        let id = FieldId::from_name(name)
            .with_context(|| format!("phoneme '{}': unknown field '{}'", key, name))?;
        fields.set(id, *value);
    }

    Ok(PhonemeDef { key: key.chars().collect(), flags, fields })
}

fn read_pack_file(path: &Path) -> Result<PackFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read pack file: {}", path.display()))?;
    // Some editors write a UTF-8 BOM.
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    serde_yaml::from_str(text).with_context(|| format!("cannot parse pack file: {}", path.display()))
}

/// Load the effective pack for `tag` from `<dir>/lang/`, merging the tag's
/// inheritance chain.  Fails when no layer file of the chain exists.
pub fn load_pack_set(dir: &Path, tag: &str) -> Result<PackSet> {
    let lang_dir = dir.join("lang");

    let mut settings: BTreeMap<String, serde_yaml::Value> = BTreeMap::new();
    let mut raw_phonemes: BTreeMap<String, PhonemeEntry> = BTreeMap::new();
    let mut layers_found = 0usize;

    for layer in lang_tag_chain(tag) {
        let path = lang_dir.join(format!("{}.yaml", layer));
        if !path.is_file() {
            continue;
        }
        let file = read_pack_file(&path)?;
        layers_found += 1;
        debug!(
            "pack layer '{}': {} settings, {} phonemes",
            layer,
            file.settings.len(),
            file.phonemes.len()
        );
        settings.extend(file.settings);
        raw_phonemes.extend(file.phonemes);
    }

    if layers_found == 0 {
        bail!(
            "no pack files for language '{}' under {}",
            normalize_lang_tag(tag),
            lang_dir.display()
        );
    }

    for key in settings.keys() {
        if !KNOWN_SETTINGS.contains(&key.as_str()) {
            warn!("ignoring unknown pack setting '{}'", key);
        }
    }

    let mut mapping = serde_yaml::Mapping::new();
    for (k, v) in &settings {
        if KNOWN_SETTINGS.contains(&k.as_str()) {
            mapping.insert(serde_yaml::Value::String(k.clone()), v.clone());
        }
    }
    let lang: LanguagePack = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
        .with_context(|| format!("invalid settings for language '{}'", normalize_lang_tag(tag)))?;

    let mut phonemes = HashMap::new();
    for (key, entry) in &raw_phonemes {
        phonemes.insert(key.clone(), build_phoneme(key, entry)?);
    }

    Ok(PackSet { lang, phonemes })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
