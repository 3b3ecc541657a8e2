//! C FFI — bridges [`Session`] to host processes (screen readers, other
//! runtimes) through an opaque handle.
//!
//! Functions are `#[no_mangle] extern "C"` so C/C++ hosts can call them
//! through a plain header without any wrapper layer.
//!
//! ## Memory contract
//!
//! | Function                            | Ownership                           |
//! |-------------------------------------|-------------------------------------|
//! | [`formant_frontend_create`]         | Caller frees with [`formant_frontend_destroy`] |
//! | [`formant_frontend_get_last_error`] | Borrowed from the handle until its next call |
//!
//! Return codes: `1` success, `0` failure; after a failure, read
//! [`formant_frontend_get_last_error`] before the next call if the message
//! is to be preserved.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

use crate::emit::{Frame, FrameSink};
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────

/// Opaque handle to one session.
pub struct FrontendHandle {
    session: Session,
    /// Backing storage for the pointer returned by `get_last_error`.
    last_error: CString,
}

/// Per-frame callback: `frame` is null for silences (a timed gap only);
/// `index` counts the caller's tokens up from `user_index_base`, with `-1`
/// for engine-synthesized boundary gaps.
pub type FrameCallback = Option<
    unsafe extern "C" fn(
        user_data: *mut c_void,
        frame: *const Frame,
        duration_ms: f64,
        fade_ms: f64,
        index: c_int,
    ),
>;

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Convert a non-null `*const c_char` to an owned `String`.
/// Returns `None` if `ptr` is null; invalid UTF-8 is replaced lossily.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Adapts the C callback to the internal sink trait.
struct CallbackSink {
    callback: unsafe extern "C" fn(*mut c_void, *const Frame, f64, f64, c_int),
    user_data: *mut c_void,
}

impl FrameSink for CallbackSink {
    fn frame(&mut self, frame: Option<&Frame>, duration_ms: f64, fade_ms: f64, index: i32) {
        let ptr = frame.map_or(std::ptr::null(), |f| f as *const Frame);
        unsafe { (self.callback)(self.user_data, ptr, duration_ms, fade_ms, index) }
    }
}

/// Sink for callers that pass a null callback: the pipeline still runs (and
/// updates session state) but nothing is delivered.
struct NullSink;

impl FrameSink for NullSink {
    fn frame(&mut self, _frame: Option<&Frame>, _duration_ms: f64, _fade_ms: f64, _index: i32) {}
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Create a session over a pack directory.
///
/// @param pack_dir  UTF-8 path to the directory holding `lang/<tag>.yaml`
///                  packs.  May be null (every load will then fail).
/// @return          Opaque handle; free with [`formant_frontend_destroy`].
#[no_mangle]
pub unsafe extern "C" fn formant_frontend_create(pack_dir: *const c_char) -> *mut FrontendHandle {
    let dir = unsafe { cstr_to_string(pack_dir) }.unwrap_or_default();
    Box::into_raw(Box::new(FrontendHandle {
        session: Session::new(dir),
        last_error: CString::default(),
    }))
}

/// Destroy a session handle and release all resources.
#[no_mangle]
pub unsafe extern "C" fn formant_frontend_destroy(handle: *mut FrontendHandle) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

/// Load and activate the pack for a language tag (e.g. `"en-US"`).
///
/// @return  `1` on success, `0` on failure (active pack unchanged).
#[no_mangle]
pub unsafe extern "C" fn formant_frontend_set_language(
    handle: *mut FrontendHandle,
    lang_tag: *const c_char,
) -> c_int {
    let Some(h) = (unsafe { handle.as_mut() }) else {
        return 0;
    };
    let tag = unsafe { cstr_to_string(lang_tag) }.unwrap_or_default();
    match h.session.set_language(&tag) {
        Ok(()) => 1,
        Err(_) => 0,
    }
}

/// Queue an IPA utterance: runs the full pipeline and invokes `callback`
/// once per frame, synchronously, before returning.
///
/// @param ipa             UTF-8 IPA text (eSpeak mnemonics accepted).
/// @param speed           Speed multiplier; non-positive reads as 1.0.
/// @param base_pitch      Base pitch in Hz.
/// @param inflection      Pitch-range scale (0 = monotone).
/// @param clause_type     Single character (`"."`, `"?"`, …); null or empty
///                        reads as `"."`.
/// @param user_index_base First frame index reported back via `callback`.
/// @return                `1` on success, `0` on failure (no frames emitted).
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn formant_frontend_queue_ipa(
    handle: *mut FrontendHandle,
    ipa: *const c_char,
    speed: f64,
    base_pitch: f64,
    inflection: f64,
    clause_type: *const c_char,
    user_index_base: c_int,
    callback: FrameCallback,
    user_data: *mut c_void,
) -> c_int {
    let Some(h) = (unsafe { handle.as_mut() }) else {
        return 0;
    };
    let ipa = unsafe { cstr_to_string(ipa) }.unwrap_or_default();
    let clause = unsafe { cstr_to_string(clause_type) }.and_then(|s| s.chars().next());

    let result = match callback {
        Some(callback) => {
            let mut sink = CallbackSink { callback, user_data };
            h.session
                .queue_ipa(&ipa, speed, base_pitch, inflection, clause, user_index_base, &mut sink)
        }
        None => {
            let mut sink = NullSink;
            h.session
                .queue_ipa(&ipa, speed, base_pitch, inflection, clause, user_index_base, &mut sink)
        }
    };

    match result {
        Ok(()) => 1,
        Err(_) => 0,
    }
}

/// The most recent error message, or the empty string.
///
/// @return  Pointer owned by the handle; valid until its next operation.
///          `"invalid handle"` when `handle` is null.
#[no_mangle]
pub unsafe extern "C" fn formant_frontend_get_last_error(
    handle: *mut FrontendHandle,
) -> *const c_char {
    static INVALID_HANDLE: &[u8] = b"invalid handle\0";
    let Some(h) = (unsafe { handle.as_mut() }) else {
        return INVALID_HANDLE.as_ptr() as *const c_char;
    };
    // Interior nuls cannot cross the boundary; fall back to empty.
    h.last_error = CString::new(h.session.last_error()).unwrap_or_default();
    h.last_error.as_ptr()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PACK: &str = "\
phonemes:
  a:
    flags: [vowel, voiced]
    fields: { cf1: 780, cf2: 1320, voiceAmplitude: 1 }
";

    fn pack_dir() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let lang = tmp.path().join("lang");
        fs::create_dir_all(&lang).unwrap();
        fs::write(lang.join("default.yaml"), PACK).unwrap();
        tmp
    }

    fn c_string(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe extern "C" fn counting_callback(
        user_data: *mut c_void,
        _frame: *const Frame,
        _duration_ms: f64,
        _fade_ms: f64,
        _index: c_int,
    ) {
        let count = unsafe { &mut *(user_data as *mut usize) };
        *count += 1;
    }

    #[test]
    fn test_create_queue_destroy() {
        let tmp = pack_dir();
        let dir = c_string(tmp.path().to_str().unwrap());
        let ipa = c_string("a");
        let clause = c_string(".");

        unsafe {
            let h = formant_frontend_create(dir.as_ptr());
            assert!(!h.is_null());

            let mut count = 0usize;
            let rc = formant_frontend_queue_ipa(
                h,
                ipa.as_ptr(),
                1.0,
                100.0,
                0.5,
                clause.as_ptr(),
                0,
                Some(counting_callback),
                &mut count as *mut usize as *mut c_void,
            );
            assert_eq!(rc, 1);
            assert!(count > 0);

            formant_frontend_destroy(h);
        }
    }

    #[test]
    fn test_error_reporting_through_handle() {
        let empty = tempfile::tempdir().unwrap();
        let dir = c_string(empty.path().to_str().unwrap());
        let tag = c_string("en");

        unsafe {
            let h = formant_frontend_create(dir.as_ptr());
            assert_eq!(formant_frontend_set_language(h, tag.as_ptr()), 0);

            let msg = CStr::from_ptr(formant_frontend_get_last_error(h));
            assert!(!msg.to_bytes().is_empty());

            formant_frontend_destroy(h);
        }
    }

    #[test]
    fn test_null_arguments() {
        unsafe {
            assert_eq!(formant_frontend_set_language(std::ptr::null_mut(), std::ptr::null()), 0);
            let msg = CStr::from_ptr(formant_frontend_get_last_error(std::ptr::null_mut()));
            assert_eq!(msg.to_str().unwrap(), "invalid handle");
            // Destroying null is a no-op, not a crash.
            formant_frontend_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_null_callback_still_succeeds() {
        let tmp = pack_dir();
        let dir = c_string(tmp.path().to_str().unwrap());
        let ipa = c_string("a");

        unsafe {
            let h = formant_frontend_create(dir.as_ptr());
            let rc = formant_frontend_queue_ipa(
                h,
                ipa.as_ptr(),
                1.0,
                100.0,
                0.5,
                std::ptr::null(),
                0,
                None,
                std::ptr::null_mut(),
            );
            assert_eq!(rc, 1);
            formant_frontend_destroy(h);
        }
    }
}
