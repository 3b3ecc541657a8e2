//! # formant-frontend
//!
//! Phonetic frontend for a formant speech synthesizer: IPA text annotated
//! with prosody goes in, a stream of time-stamped articulatory frames
//! (formant frequencies, amplitudes, fades) comes out, ready to drive a
//! downstream waveform engine.
//!
//! ## Quick start
//!
//! ```no_run
//! use formant_frontend::Session;
//!
//! let session = Session::new("packs");
//! session.set_language("en-US").unwrap();
//!
//! let mut sink = |frame: Option<&formant_frontend::Frame>,
//!                 duration_ms: f64,
//!                 fade_ms: f64,
//!                 index: i32| {
//!     match frame {
//!         Some(f) => println!("#{index}: {duration_ms} ms, fade {fade_ms} ms, \
//!                              cf2 {}", f.get(formant_frontend::FieldId::Cf2)),
//!         None => println!("#{index}: silence, {duration_ms} ms"),
//!     }
//! };
//! session.queue_ipa("həˈloʊ", 1.0, 100.0, 0.5, Some('.'), 0, &mut sink).unwrap();
//! ```
//!
//! ## Pipeline
//!
//! 1. **Normalization** — eSpeak mnemonics and symbol variants are mapped
//!    onto the pack's IPA inventory.
//! 2. **Token building** — the IPA stream is lexed against the pack,
//!    micro-silences and aspiration tails are inserted, durations and the
//!    clause intonation contour are assigned.
//! 3. **Coarticulation** — consonant F2 targets shift toward neighboring
//!    vowels (with the velar-pinch special case).
//! 4. **Boundary smoothing** — minimum crossfades at vowel↔stop and
//!    vowel→fricative transitions.
//! 5. **Trajectory limiting** — crossfades are extended wherever tracked
//!    formants would otherwise move too fast.
//! 6. **Emission** — one sink call per token, synchronously, in order.
//!
//! Language packs are YAML files (one per language tag, merged along the
//! tag's prefix chain) holding phoneme definitions and tuning knobs; see
//! the `packs/` directory for the shipped set.
//!
//! A C ABI over an opaque session handle lives in [`ffi`].

pub mod boundary_smoothing;
pub mod builder;
pub mod coarticulation;
pub mod emit;
pub mod ffi;
pub mod fields;
pub mod intonation;
pub mod normalize;
pub mod pack;
pub mod session;
pub mod token;
pub mod trajectory_limit;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use emit::{Frame, FrameSink, ENGINE_GAP_INDEX};
pub use fields::{FieldId, FieldSet};
pub use pack::{load_pack_set, LanguagePack, PackSet, PhonemeDef, PhonemeFlags};
pub use session::Session;
pub use token::{PassContext, Token};
