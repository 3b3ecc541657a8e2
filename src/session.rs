//! Session — the stateful wrapper around the pipeline.
//!
//! A session owns a pack directory, the active pack (if any), the
//! last-error string, and a has-spoken flag used to insert a small silent
//! gap between consecutive `queue_ipa` calls (UI speech often arrives as
//! separate chunks — label, role, value — that would otherwise transition
//! abruptly).
//!
//! All operations on one session are serialized by a single internal lock
//! and run synchronously on the calling thread; the frame sink is invoked
//! inline before the call returns.  Distinct sessions are independent.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use log::debug;

use crate::boundary_smoothing;
use crate::builder::build_tokens;
use crate::coarticulation;
use crate::emit::{emit_frames, FrameSink, ENGINE_GAP_INDEX};
use crate::pack::{load_pack_set, normalize_lang_tag, PackSet};
use crate::token::PassContext;
use crate::trajectory_limit;

struct SessionState {
    pack_dir: PathBuf,
    pack: Option<Arc<PackSet>>,
    lang_tag: String,
    last_error: String,
    /// True once a call has emitted a non-empty token sequence; cleared by
    /// every language change.
    stream_has_speech: bool,
}

pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(pack_dir: impl Into<PathBuf>) -> Self {
        Session {
            state: Mutex::new(SessionState {
                pack_dir: pack_dir.into(),
                pack: None,
                lang_tag: String::new(),
                last_error: String::new(),
                stream_has_speech: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load and activate the pack for `tag`.
    ///
    /// On success the pack is swapped atomically and prosodic continuity is
    /// broken (the next call emits no boundary gap) — even when the same
    /// tag is re-requested.  On failure the active pack is unchanged.
    pub fn set_language(&self, tag: &str) -> Result<()> {
        let mut st = self.lock();
        st.last_error.clear();
        match load_pack_set(&st.pack_dir, tag) {
            Ok(pack) => {
                st.pack = Some(Arc::new(pack));
                st.lang_tag = normalize_lang_tag(tag);
                st.stream_has_speech = false;
                debug!("language set to '{}'", st.lang_tag);
                Ok(())
            }
            Err(e) => {
                st.last_error = format!("{e:#}");
                Err(e)
            }
        }
    }

    /// Run the full pipeline over `ipa` and drive the frame sink.
    ///
    /// When no language has been set the `"default"` pack is loaded
    /// lazily; that load failing fails the call.  On any failure no frames
    /// at all are emitted and the last-error string is set.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_ipa(
        &self,
        ipa: &str,
        speed: f64,
        base_pitch: f64,
        inflection: f64,
        clause_type: Option<char>,
        user_index_base: i32,
        sink: &mut dyn FrameSink,
    ) -> Result<()> {
        let mut st = self.lock();
        st.last_error.clear();

        if st.pack.is_none() {
            match load_pack_set(&st.pack_dir, "default")
                .context("no language loaded and the default pack failed to load")
            {
                Ok(pack) => {
                    st.pack = Some(Arc::new(pack));
                    st.lang_tag = "default".to_string();
                }
                Err(e) => {
                    st.last_error = format!("{e:#}");
                    return Err(e);
                }
            }
        }

        let pack_ref = Arc::clone(st.pack.as_ref().expect("pack loaded above"));
        let pack: &PackSet = &pack_ref;
        let lang_tag = st.lang_tag.clone();
        let clause_type = clause_type.unwrap_or('.');

        let mut tokens = match build_tokens(
            pack, &lang_tag, ipa, speed, base_pitch, inflection, clause_type,
        ) {
            Ok(tokens) => tokens,
            Err(e) => {
                st.last_error = format!("{e:#}");
                return Err(e);
            }
        };

        let ctx = PassContext { pack, speed, base_pitch, inflection, clause_type };
        coarticulation::run(&ctx, &mut tokens);
        boundary_smoothing::run(&ctx, &mut tokens);
        trajectory_limit::run(&ctx, &mut tokens);

        // Tiny silence between consecutive calls, once the stream has
        // spoken.  Suppressed when this call yields nothing.
        let eff_speed = ctx.effective_speed();
        if st.stream_has_speech && !tokens.is_empty() {
            let gap = pack.lang.segment_boundary_gap_ms;
            let fade = pack.lang.segment_boundary_fade_ms;
            if gap > 0.0 {
                let fade = if fade > 0.0 { fade / eff_speed } else { 0.0 };
                sink.frame(None, gap / eff_speed, fade, ENGINE_GAP_INDEX);
            }
        }

        emit_frames(&tokens, user_index_base, sink);
        if !tokens.is_empty() {
            st.stream_has_speech = true;
        }
        Ok(())
    }

    /// The most recent error message, or the empty string.
    pub fn last_error(&self) -> String {
        self.lock().last_error.clone()
    }

    /// The active (normalized) language tag, or `None` before any load.
    pub fn language_tag(&self) -> Option<String> {
        let st = self.lock();
        if st.pack.is_some() { Some(st.lang_tag.clone()) } else { None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::Frame;
    use std::fs;
    use std::path::Path;

    const DEFAULT_PACK: &str = "\
settings:
  segmentBoundaryGapMs: 30
  segmentBoundaryFadeMs: 5
phonemes:
  a:
    flags: [vowel, voiced]
    fields: { cf1: 780, cf2: 1320, voiceAmplitude: 1 }
  i:
    flags: [vowel, voiced]
    fields: { cf1: 290, cf2: 2300, voiceAmplitude: 1 }
  s:
    flags: [fricative]
    fields: { fricationAmplitude: 0.8, pf2: 1780 }
";

    fn write_pack(dir: &Path, tag: &str, body: &str) {
        let lang_dir = dir.join("lang");
        fs::create_dir_all(&lang_dir).unwrap();
        fs::write(lang_dir.join(format!("{}.yaml", tag)), body).unwrap();
    }

    #[derive(Default)]
    struct Capture {
        calls: Vec<(bool, f64, f64, i32)>,
    }

    impl FrameSink for Capture {
        fn frame(&mut self, frame: Option<&Frame>, duration_ms: f64, fade_ms: f64, index: i32) {
            self.calls.push((frame.is_some(), duration_ms, fade_ms, index));
        }
    }

    #[test]
    fn test_queue_without_language_loads_default() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());

        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert!(!sink.calls.is_empty());
        assert_eq!(session.language_tag().as_deref(), Some("default"));
        assert_eq!(session.last_error(), "");
    }

    #[test]
    fn test_queue_without_any_pack_fails_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::new(tmp.path());

        let mut sink = Capture::default();
        let err = session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap_err();
        assert!(format!("{err:#}").contains("default pack failed to load"));
        assert!(!session.last_error().is_empty());
        assert!(sink.calls.is_empty(), "no frames may be emitted on failure");
    }

    #[test]
    fn test_set_language_failure_keeps_active_pack() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());
        session.set_language("default").unwrap();

        // The pack dir has no chain for a bogus dir-less tag only when the
        // whole directory is empty, so point at a second, empty dir.
        let empty = tempfile::tempdir().unwrap();
        let broken = Session::new(empty.path());
        assert!(broken.set_language("en").is_err());
        assert!(broken.language_tag().is_none());
        assert!(!broken.last_error().is_empty());

        // The healthy session still speaks.
        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert!(!sink.calls.is_empty());
    }

    #[test]
    fn test_boundary_gap_between_calls() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());
        session.set_language("default").unwrap();

        let mut first = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut first).unwrap();
        // First call: no synthesized lead gap, indices start at the base.
        assert!(first.calls.iter().all(|c| c.3 != ENGINE_GAP_INDEX));
        assert_eq!(first.calls[0].3, 0);

        let mut second = Capture::default();
        session.queue_ipa("i", 1.0, 100.0, 0.5, None, 10, &mut second).unwrap();
        // Second call: exactly one gap frame, def-less, before everything.
        let gaps: Vec<_> = second.calls.iter().filter(|c| c.3 == ENGINE_GAP_INDEX).collect();
        assert_eq!(gaps.len(), 1);
        assert_eq!(second.calls[0].3, ENGINE_GAP_INDEX);
        assert!(!second.calls[0].0);
        assert_eq!(second.calls[0].1, 30.0);
        assert_eq!(second.calls[0].2, 5.0);
        assert_eq!(second.calls[1].3, 10);
    }

    #[test]
    fn test_boundary_gap_scaled_by_speed() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());

        let mut sink = Capture::default();
        session.queue_ipa("a", 2.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        let mut sink = Capture::default();
        session.queue_ipa("a", 2.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert_eq!(sink.calls[0].1, 15.0);
        assert_eq!(sink.calls[0].2, 2.5);
    }

    #[test]
    fn test_empty_call_suppresses_gap_and_keeps_flag() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());

        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();

        // An empty utterance emits nothing, not even the gap.
        let mut sink = Capture::default();
        session.queue_ipa("", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert!(sink.calls.is_empty());

        // The stream still counts as having spoken.
        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert_eq!(sink.calls[0].3, ENGINE_GAP_INDEX);
    }

    #[test]
    fn test_language_change_resets_continuity() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());
        session.set_language("default").unwrap();

        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();

        // Re-selecting the same language still breaks continuity.
        session.set_language("default").unwrap();
        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert!(sink.calls.iter().all(|c| c.3 != ENGINE_GAP_INDEX));
    }

    #[test]
    fn test_failed_call_emits_nothing_and_sets_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());
        session.set_language("default").unwrap();

        let mut sink = Capture::default();
        let err = session.queue_ipa("ʘʘ", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap_err();
        assert!(format!("{err:#}").contains("IPA conversion failed"));
        assert!(sink.calls.is_empty());
        assert!(session.last_error().contains("IPA conversion failed"));

        // The next successful operation clears the error.
        let mut sink = Capture::default();
        session.queue_ipa("a", 1.0, 100.0, 0.5, None, 0, &mut sink).unwrap();
        assert_eq!(session.last_error(), "");
    }

    #[test]
    fn test_frames_concatenate_across_calls() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(tmp.path(), "default", DEFAULT_PACK);
        let session = Session::new(tmp.path());

        let mut sink = Capture::default();
        session.queue_ipa("as", 1.0, 100.0, 0.5, None, 100, &mut sink).unwrap();
        let n = sink.calls.len();
        assert!(n >= 2);
        // Indices are consecutive from the base, one per token.
        for (offset, call) in sink.calls.iter().enumerate() {
            assert_eq!(call.3, 100 + offset as i32);
        }
    }
}
