//! Lifecycle and volume/mute operations for the default output device.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::backend::{create_backend, AudioBackend};
use crate::audio::device::{AudioError, OutputDevice};

struct ControlState {
    backend: Box<dyn AudioBackend>,
    device: Option<OutputDevice>,
}

/// Volume and mute control for the system default output device.
///
/// The context owns the cached device handle: `init` resolves and caches
/// the default output device, every device-affecting call requires that
/// cache, and `deinit` releases it. The control is a stateless accessor
/// of volume and mute; nothing is cached beyond the device handle, so
/// reads reflect changes made by other processes.
///
/// A single internal lock serializes `init`/`deinit` against each other
/// and against in-flight volume/mute calls; OS calls are assumed to
/// return promptly and are made with the lock held.
pub struct VolumeControl {
    inner: Mutex<ControlState>,
}

impl VolumeControl {
    /// Create a control backed by the platform backend.
    ///
    /// Fails on platforms without a WASAPI or CoreAudio backend.
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self::with_backend(create_backend()?))
    }

    /// Create a control over an explicit backend.
    pub fn with_backend(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            inner: Mutex::new(ControlState {
                backend,
                device: None,
            }),
        }
    }

    /// Resolve and cache the default output device.
    ///
    /// Idempotent: calling `init` while already initialized succeeds
    /// without re-resolving the device.
    pub fn init(&self) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        if let Some(device) = &state.device {
            debug!(%device, "init called while already initialized");
            return Ok(());
        }

        let device = state.backend.resolve_default_output()?;
        info!(backend = state.backend.name(), %device, "resolved default output device");
        state.device = Some(device);
        Ok(())
    }

    /// Release the cached device handle.
    ///
    /// No-op when not initialized; safe to call repeatedly.
    pub fn deinit(&self) {
        let mut state = self.inner.lock();
        if let Some(device) = state.device.take() {
            info!(%device, "released default output device");
        }
    }

    /// Whether a device handle is currently cached.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().device.is_some()
    }

    /// The cached default output device, if initialized.
    pub fn device(&self) -> Option<OutputDevice> {
        self.inner.lock().device.clone()
    }

    /// Identifier of the cached default output device.
    pub fn device_id(&self) -> Result<String, AudioError> {
        self.inner
            .lock()
            .device
            .as_ref()
            .map(|d| d.id.clone())
            .ok_or(AudioError::NotInitialized)
    }

    /// Current volume as an integer percentage 0–100.
    pub fn volume(&self) -> Result<u8, AudioError> {
        let mut state = self.inner.lock();
        let device = state.device.clone().ok_or(AudioError::NotInitialized)?;
        let scalar = state.backend.volume_scalar(&device)?;
        let percent = (scalar.clamp(0.0, 1.0) * 100.0).round() as u8;
        debug!(scalar, percent, "read volume");
        Ok(percent)
    }

    /// Set the volume as an integer percentage.
    ///
    /// Values above 100 are rejected with [`AudioError::InvalidVolume`],
    /// never clamped.
    pub fn set_volume(&self, percent: u8) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        let device = state.device.clone().ok_or(AudioError::NotInitialized)?;
        if percent > 100 {
            warn!(percent, "rejected out-of-range volume");
            return Err(AudioError::InvalidVolume(percent as i32));
        }
        let scalar = percent as f32 / 100.0;
        state.backend.set_volume_scalar(&device, scalar)?;
        debug!(percent, scalar, "set volume");
        Ok(())
    }

    /// Current mute flag, read from the OS on every call.
    pub fn is_muted(&self) -> Result<bool, AudioError> {
        let mut state = self.inner.lock();
        let device = state.device.clone().ok_or(AudioError::NotInitialized)?;
        state.backend.is_muted(&device)
    }

    /// Set the mute flag. Mute is independent of the stored volume.
    pub fn set_muted(&self, muted: bool) -> Result<(), AudioError> {
        let mut state = self.inner.lock();
        let device = state.device.clone().ok_or(AudioError::NotInitialized)?;
        state.backend.set_muted(&device, muted)?;
        debug!(muted, "set mute");
        Ok(())
    }

    /// Mute the device. Delegates to [`set_muted`](Self::set_muted).
    pub fn mute(&self) -> Result<(), AudioError> {
        self.set_muted(true)
    }

    /// Unmute the device. Delegates to [`set_muted`](Self::set_muted).
    pub fn unmute(&self) -> Result<(), AudioError> {
        self.set_muted(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct MockState {
        volume: f32,
        muted: bool,
        resolve_fails: bool,
        calls: u32,
    }

    /// Backend over an in-memory device, counting OS-level calls.
    struct MockBackend {
        state: Arc<Mutex<MockState>>,
    }

    impl AudioBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resolve_default_output(&mut self) -> Result<OutputDevice, AudioError> {
            let mut state = self.state.lock();
            state.calls += 1;
            if state.resolve_fails {
                return Err(AudioError::DeviceNotFound);
            }
            Ok(OutputDevice {
                id: "73".to_string(),
                name: "Mock Speakers".to_string(),
                channels: 2,
            })
        }

        fn volume_scalar(&mut self, _device: &OutputDevice) -> Result<f32, AudioError> {
            let mut state = self.state.lock();
            state.calls += 1;
            Ok(state.volume)
        }

        fn set_volume_scalar(
            &mut self,
            _device: &OutputDevice,
            level: f32,
        ) -> Result<(), AudioError> {
            let mut state = self.state.lock();
            state.calls += 1;
            state.volume = level;
            Ok(())
        }

        fn is_muted(&mut self, _device: &OutputDevice) -> Result<bool, AudioError> {
            let mut state = self.state.lock();
            state.calls += 1;
            Ok(state.muted)
        }

        fn set_muted(&mut self, _device: &OutputDevice, muted: bool) -> Result<(), AudioError> {
            let mut state = self.state.lock();
            state.calls += 1;
            state.muted = muted;
            Ok(())
        }
    }

    fn mock_control() -> (VolumeControl, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState {
            volume: 0.5,
            ..MockState::default()
        }));
        let backend = MockBackend {
            state: state.clone(),
        };
        (VolumeControl::with_backend(Box::new(backend)), state)
    }

    #[test]
    fn init_caches_default_device() {
        let (control, _state) = mock_control();
        assert!(!control.is_initialized());
        control.init().unwrap();
        assert!(control.is_initialized());
        assert_eq!(control.device_id().unwrap(), "73");
        let device = control.device().unwrap();
        assert_eq!(device.name, "Mock Speakers");
        assert_eq!(device.channels, 2);
    }

    #[test]
    fn init_is_idempotent() {
        let (control, state) = mock_control();
        control.init().unwrap();
        let calls = state.lock().calls;
        control.init().unwrap();
        assert!(control.is_initialized());
        // Second init must not re-resolve.
        assert_eq!(state.lock().calls, calls);
    }

    #[test]
    fn failed_init_leaves_state_uninitialized() {
        let (control, state) = mock_control();
        state.lock().resolve_fails = true;
        assert!(matches!(control.init(), Err(AudioError::DeviceNotFound)));
        assert!(!control.is_initialized());
    }

    #[test]
    fn deinit_is_idempotent() {
        let (control, _state) = mock_control();
        control.deinit();
        control.init().unwrap();
        control.deinit();
        assert!(!control.is_initialized());
        control.deinit();
        assert!(!control.is_initialized());
    }

    #[test]
    fn operations_before_init_fail_without_touching_backend() {
        let (control, state) = mock_control();
        assert!(matches!(control.volume(), Err(AudioError::NotInitialized)));
        assert!(matches!(
            control.set_volume(40),
            Err(AudioError::NotInitialized)
        ));
        assert!(matches!(control.is_muted(), Err(AudioError::NotInitialized)));
        assert!(matches!(control.mute(), Err(AudioError::NotInitialized)));
        assert!(matches!(control.unmute(), Err(AudioError::NotInitialized)));
        assert_eq!(state.lock().calls, 0);
    }

    #[test]
    fn operations_after_deinit_fail() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        control.deinit();
        assert!(matches!(control.volume(), Err(AudioError::NotInitialized)));
        assert!(matches!(
            control.set_volume(10),
            Err(AudioError::NotInitialized)
        ));
    }

    #[test]
    fn volume_round_trips_every_percent() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        for v in 0..=100u8 {
            control.set_volume(v).unwrap();
            assert_eq!(control.volume().unwrap(), v);
        }
    }

    #[test]
    fn out_of_range_volume_is_rejected_not_clamped() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        control.set_volume(60).unwrap();
        for v in [101u8, 150, 255] {
            match control.set_volume(v) {
                Err(AudioError::InvalidVolume(got)) => assert_eq!(got, v as i32),
                other => panic!("expected InvalidVolume, got {other:?}"),
            }
        }
        // Device volume untouched by the rejected writes.
        assert_eq!(control.volume().unwrap(), 60);
    }

    #[test]
    fn mute_and_unmute_round_trip() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        control.mute().unwrap();
        assert!(control.is_muted().unwrap());
        control.unmute().unwrap();
        assert!(!control.is_muted().unwrap());
        control.set_muted(true).unwrap();
        assert!(control.is_muted().unwrap());
    }

    #[test]
    fn muting_does_not_change_volume() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        control.set_volume(70).unwrap();
        control.mute().unwrap();
        assert_eq!(control.volume().unwrap(), 70);
        control.unmute().unwrap();
        assert_eq!(control.volume().unwrap(), 70);
    }

    #[test]
    fn reads_reflect_out_of_band_changes() {
        let (control, state) = mock_control();
        control.init().unwrap();
        {
            let mut state = state.lock();
            state.volume = 0.25;
            state.muted = true;
        }
        assert_eq!(control.volume().unwrap(), 25);
        assert!(control.is_muted().unwrap());
    }

    #[test]
    fn full_session_scenario() {
        let (control, _state) = mock_control();
        control.init().unwrap();
        let v0 = control.volume().unwrap();
        assert!(v0 <= 100);
        control.set_volume(v0 / 2).unwrap();
        assert_eq!(control.volume().unwrap(), v0 / 2);
        control.set_volume(v0).unwrap();
        assert_eq!(control.volume().unwrap(), v0);
        control.deinit();
        control.deinit();
        assert!(!control.is_initialized());
    }
}
