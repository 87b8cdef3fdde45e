//! C ABI for default output volume control.
//!
//! Exports the flat operation table consumed by foreign runtimes (the
//! reference consumer is Python via ctypes): `init`, `deinit`,
//! `isInitialized`, `getVolume`, `setVolume`, `getMute`, `setMute`,
//! `mute`, `unmute`, plus `defaultOutputDeviceID` and `deviceInfo`
//! accessors. Symbol names keep the camelCase the table was published
//! with.
//!
//! Failures are reported through boolean/sentinel returns and a
//! thread-local last-error slot; every export is wrapped in
//! `panic::catch_unwind` so the library never aborts the caller.

// Export names match the published table, which predates this crate.
#![allow(non_snake_case)]

use std::ffi::{c_char, c_int, CString};
use std::panic;
use std::ptr;
use std::sync::Once;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;
use volctl_rs::{AudioError, VolumeControl};

/// Process-wide control context, created lazily by `init`.
static CONTROL: Mutex<Option<VolumeControl>> = Mutex::new(None);

static LOG_INIT: Once = Once::new();

fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes reported by `lastErrorCode`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NotInitialized = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    OperationFailed = -4,
    Unsupported = -5,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::NotInitialized => ErrorCode::NotInitialized,
            AudioError::DeviceNotFound => ErrorCode::DeviceNotFound,
            AudioError::InvalidVolume(_) => ErrorCode::InvalidArgument,
            AudioError::Unsupported(_) => ErrorCode::Unsupported,
            _ => ErrorCode::OperationFailed,
        }
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<(ErrorCode, String)>> =
        const { std::cell::RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some((code, message.into()));
    });
}

fn set_audio_error(err: &AudioError) {
    error!(%err, "audio operation failed");
    set_last_error(ErrorCode::from(err), err.to_string());
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Helpers
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with freeString.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // Interior null byte; return an empty string instead.
        Err(_) => CString::default().into_raw(),
    }
}

/// Run a device-affecting operation against the process-wide context.
fn with_control<T>(f: impl FnOnce(&VolumeControl) -> Result<T, AudioError>) -> Result<T, AudioError> {
    let guard = CONTROL.lock();
    match guard.as_ref() {
        Some(control) => f(control),
        None => Err(AudioError::NotInitialized),
    }
}

/// catch_unwind wrapper returning `fallback` when the closure panics.
fn guarded<T, F: FnOnce() -> T + panic::UnwindSafe>(name: &str, fallback: T, f: F) -> T {
    match panic::catch_unwind(f) {
        Ok(value) => value,
        Err(_) => {
            set_last_error(ErrorCode::Panic, format!("panic during {name}"));
            fallback
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Resolve and cache the default output device.
///
/// Must be called before any device-affecting operation. Idempotent:
/// calling it again while initialized succeeds without re-resolving.
/// Returns false on failure; see lastErrorCode / lastErrorMessage.
#[no_mangle]
pub extern "C" fn init() -> bool {
    guarded("init", false, || {
        init_logging();
        clear_last_error();

        let mut guard = CONTROL.lock();
        if guard.is_none() {
            match VolumeControl::new() {
                Ok(control) => *guard = Some(control),
                Err(e) => {
                    set_audio_error(&e);
                    return false;
                }
            }
        }
        let Some(control) = guard.as_ref() else {
            return false;
        };
        match control.init() {
            Ok(()) => true,
            Err(e) => {
                set_audio_error(&e);
                false
            }
        }
    })
}

/// Release the cached device handle. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn deinit() {
    guarded("deinit", (), || {
        clear_last_error();
        if let Some(control) = CONTROL.lock().as_ref() {
            control.deinit();
        }
    })
}

/// Whether init has succeeded and deinit has not been called since.
#[no_mangle]
pub extern "C" fn isInitialized() -> bool {
    guarded("isInitialized", false, || {
        CONTROL
            .lock()
            .as_ref()
            .map(|control| control.is_initialized())
            .unwrap_or(false)
    })
}

// ============================================================================
// Volume
// ============================================================================

/// Current volume as a percentage 0-100, or -1 on failure.
#[no_mangle]
pub extern "C" fn getVolume() -> c_int {
    guarded("getVolume", -1, || {
        clear_last_error();
        match with_control(|control| control.volume()) {
            Ok(percent) => percent as c_int,
            Err(e) => {
                set_audio_error(&e);
                -1
            }
        }
    })
}

/// Set the volume percentage. Values outside 0-100 are rejected.
#[no_mangle]
pub extern "C" fn setVolume(volume_in_percent: c_int) -> bool {
    guarded("setVolume", false, || {
        clear_last_error();
        if !(0..=100).contains(&volume_in_percent) {
            set_last_error(
                ErrorCode::InvalidArgument,
                format!("volume must be within 0-100, got {volume_in_percent}"),
            );
            return false;
        }
        match with_control(|control| control.set_volume(volume_in_percent as u8)) {
            Ok(()) => true,
            Err(e) => {
                set_audio_error(&e);
                false
            }
        }
    })
}

// ============================================================================
// Mute
// ============================================================================

/// Current mute state: 1 muted, 0 unmuted, -1 on failure.
#[no_mangle]
pub extern "C" fn getMute() -> c_int {
    guarded("getMute", -1, || {
        clear_last_error();
        match with_control(|control| control.is_muted()) {
            Ok(muted) => muted as c_int,
            Err(e) => {
                set_audio_error(&e);
                -1
            }
        }
    })
}

/// Set the mute state.
#[no_mangle]
pub extern "C" fn setMute(state: bool) -> bool {
    guarded("setMute", false, || {
        clear_last_error();
        match with_control(|control| control.set_muted(state)) {
            Ok(()) => true,
            Err(e) => {
                set_audio_error(&e);
                false
            }
        }
    })
}

/// Mute the default output device. Alias for setMute(true).
#[no_mangle]
pub extern "C" fn mute() -> bool {
    setMute(true)
}

/// Unmute the default output device. Alias for setMute(false).
#[no_mangle]
pub extern "C" fn unmute() -> bool {
    setMute(false)
}

// ============================================================================
// Device info
// ============================================================================

/// Identifier of the cached default output device.
///
/// Returns null before init / after deinit. Caller must free the string
/// with freeString.
#[no_mangle]
pub extern "C" fn defaultOutputDeviceID() -> *mut c_char {
    guarded("defaultOutputDeviceID", ptr::null_mut(), || {
        clear_last_error();
        match with_control(|control| control.device_id()) {
            Ok(id) => alloc_c_string(&id),
            Err(e) => {
                set_audio_error(&e);
                ptr::null_mut()
            }
        }
    })
}

#[derive(Serialize)]
struct DeviceInfoDto {
    id: String,
    name: String,
    channels: u32,
}

/// JSON snapshot of the cached default output device
/// (`{"id", "name", "channels"}`).
///
/// Returns null before init / after deinit. Caller must free the string
/// with freeString.
#[no_mangle]
pub extern "C" fn deviceInfo() -> *mut c_char {
    guarded("deviceInfo", ptr::null_mut(), || {
        clear_last_error();
        let device = match with_control(|control| {
            control.device().ok_or(AudioError::NotInitialized)
        }) {
            Ok(device) => device,
            Err(e) => {
                set_audio_error(&e);
                return ptr::null_mut();
            }
        };
        let dto = DeviceInfoDto {
            id: device.id,
            name: device.name,
            channels: device.channels,
        };
        match serde_json::to_string(&dto) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::OperationFailed, e.to_string());
                ptr::null_mut()
            }
        }
    })
}

// ============================================================================
// Memory management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of this library's exports
/// and must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn freeString(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// Error reporting
// ============================================================================

/// Error code from the last failed operation on this thread, 0 if none.
#[no_mangle]
pub extern "C" fn lastErrorCode() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(code, _)| *code as i32)
            .unwrap_or(0)
    })
}

/// Message for the last failed operation on this thread.
///
/// Returns null if no error. Caller must free with freeString.
#[no_mangle]
pub extern "C" fn lastErrorMessage() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(_, msg)| alloc_c_string(msg))
            .unwrap_or(ptr::null_mut())
    })
}

/// Library version string. Caller must free with freeString.
#[no_mangle]
pub extern "C" fn version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

// These run on any platform: none of them call init(), so the process-wide
// context stays empty and every device-affecting export must report
// NotInitialized without touching the OS.
#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn error_code_conversion() {
        assert_eq!(
            ErrorCode::from(&AudioError::NotInitialized),
            ErrorCode::NotInitialized
        );
        assert_eq!(
            ErrorCode::from(&AudioError::DeviceNotFound),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(
            ErrorCode::from(&AudioError::InvalidVolume(150)),
            ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn uninitialized_reads_return_sentinels() {
        assert!(!isInitialized());
        assert_eq!(getVolume(), -1);
        assert_eq!(lastErrorCode(), ErrorCode::NotInitialized as i32);
        assert_eq!(getMute(), -1);
        let id = defaultOutputDeviceID();
        assert!(id.is_null());
        let info = deviceInfo();
        assert!(info.is_null());
    }

    #[test]
    fn uninitialized_writes_fail() {
        assert!(!setVolume(40));
        assert_eq!(lastErrorCode(), ErrorCode::NotInitialized as i32);
        assert!(!setMute(true));
        assert!(!mute());
        assert!(!unmute());
    }

    #[test]
    fn out_of_range_volume_is_invalid_argument() {
        for v in [-1, 101, 1000] {
            assert!(!setVolume(v));
            assert_eq!(lastErrorCode(), ErrorCode::InvalidArgument as i32);
        }
    }

    #[test]
    fn deinit_is_safe_when_uninitialized() {
        deinit();
        deinit();
        assert!(!isInitialized());
    }

    #[test]
    fn last_error_message_follows_failures() {
        assert_eq!(getVolume(), -1);
        let msg = lastErrorMessage();
        assert!(!msg.is_null());
        unsafe {
            let s = CStr::from_ptr(msg).to_str().unwrap();
            assert!(!s.is_empty());
            freeString(msg);
        }
    }

    #[test]
    fn version_is_exposed() {
        let v = version();
        assert!(!v.is_null());
        unsafe {
            let s = CStr::from_ptr(v).to_str().unwrap();
            assert_eq!(s, env!("CARGO_PKG_VERSION"));
            freeString(v);
        }
    }
}
