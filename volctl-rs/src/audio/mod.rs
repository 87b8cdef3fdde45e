//! Audio device control.
//!
//! `device` holds the data model and error type, `backend` the OS
//! abstraction, `control` the lifecycle and volume/mute operations.

pub mod backend;
pub mod control;
pub mod device;

#[cfg(target_os = "macos")]
pub mod coreaudio;
#[cfg(windows)]
pub mod wasapi;

pub use backend::{create_backend, AudioBackend};
pub use control::VolumeControl;
pub use device::{AudioError, OutputDevice};
