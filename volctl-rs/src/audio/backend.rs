//! Audio backend abstraction.
//!
//! The trait isolates every OS call behind a platform-neutral seam.
//! Implementations must not leak platform types through the interface;
//! all platform-specific code lives in the backend modules.

use crate::audio::device::{AudioError, OutputDevice};

/// Platform audio backend.
///
/// Backends are stateless accessors: reads always reflect the device's
/// current state, so out-of-band changes (hardware mute keys, other
/// mixers) are visible on the next call. Volume is exchanged as the
/// device's native scalar, normalized to 0.0–1.0.
pub trait AudioBackend: Send {
    /// Backend name (e.g. "WASAPI", "CoreAudio").
    fn name(&self) -> &'static str;

    /// Resolve the system's current default output device.
    ///
    /// Synchronous, bounded by the OS call itself. Fails with
    /// [`AudioError::DeviceNotFound`] when no output device is configured.
    fn resolve_default_output(&mut self) -> Result<OutputDevice, AudioError>;

    /// Read the device's volume as a normalized scalar.
    fn volume_scalar(&mut self, device: &OutputDevice) -> Result<f32, AudioError>;

    /// Write the device's volume as a normalized scalar in 0.0–1.0.
    fn set_volume_scalar(&mut self, device: &OutputDevice, level: f32) -> Result<(), AudioError>;

    /// Read the device's mute flag.
    fn is_muted(&mut self, device: &OutputDevice) -> Result<bool, AudioError>;

    /// Write the device's mute flag.
    fn set_muted(&mut self, device: &OutputDevice, muted: bool) -> Result<(), AudioError>;
}

/// Create the backend for the current platform.
pub fn create_backend() -> Result<Box<dyn AudioBackend>, AudioError> {
    #[cfg(windows)]
    {
        Ok(Box::new(crate::audio::wasapi::WasapiBackend::new()))
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(crate::audio::coreaudio::CoreAudioBackend::new()))
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    {
        Err(AudioError::Unsupported(
            "volume control requires WASAPI or CoreAudio",
        ))
    }
}
