//! Audio device data model and error types.

use thiserror::Error;

/// The resolved default output device.
///
/// Valid only between `init` and `deinit` of the owning
/// [`VolumeControl`](crate::VolumeControl); the id is the string form of
/// the platform identifier (`AudioObjectID` on macOS, the MMDevice
/// endpoint id on Windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDevice {
    /// Platform device identifier, opaque to callers.
    pub id: String,

    /// Human-readable device name.
    pub name: String,

    /// Number of addressable volume channels.
    pub channels: u32,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (id {})", self.name, self.id)
    }
}

/// Audio control error types.
///
/// Non-exhaustive: platform backends contribute their own variants.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AudioError {
    #[error("volume control is not initialized")]
    NotInitialized,

    #[error("no default output device available")]
    DeviceNotFound,

    #[error("volume must be within 0-100, got {0}")]
    InvalidVolume(i32),

    #[error("no audio backend for this platform: {0}")]
    Unsupported(&'static str),

    #[error("audio operation failed: {0}")]
    OperationFailed(String),

    #[cfg(windows)]
    #[error("COM initialization failed: {0}")]
    ComInitFailed(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("Windows audio API error: {0}")]
    WindowsError(#[source] windows::core::Error),

    #[cfg(target_os = "macos")]
    #[error("CoreAudio call failed with status {0}")]
    CoreAudio(i32),
}
