//! Volume control for the system default audio output device.
//!
//! The entry point is [`VolumeControl`]: resolve and cache the default
//! output device with `init`, then read or write its volume (integer
//! percentage 0–100) and mute flag until `deinit` releases the handle.
//!
//! OS access goes through the [`AudioBackend`] trait. WASAPI (Windows)
//! and CoreAudio HAL (macOS) backends are provided; other platforms can
//! still compile the crate and supply their own backend.

pub mod audio;

pub use audio::{AudioBackend, AudioError, OutputDevice, VolumeControl};
