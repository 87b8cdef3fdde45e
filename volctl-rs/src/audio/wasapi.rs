//! WASAPI backend using the Windows MMDevice API.
//!
//! The default render endpoint is resolved through `IMMDeviceEnumerator`
//! and volume/mute go through `IAudioEndpointVolume`. COM objects are
//! created per call rather than cached, so the backend stays usable from
//! any thread.

use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Devices::Properties::DEVPKEY_Device_FriendlyName;
use windows::Win32::Media::Audio::{
    eConsole, eRender, Endpoints::IAudioEndpointVolume, IMMDevice, IMMDeviceEnumerator,
    MMDeviceEnumerator,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

use crate::audio::backend::AudioBackend;
use crate::audio::device::{AudioError, OutputDevice};

/// Backend over the Windows audio endpoint APIs.
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WasapiBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a closure with COM initialized for the current thread.
fn with_com<T, F: FnOnce() -> Result<T, AudioError>>(f: F) -> Result<T, AudioError> {
    unsafe {
        CoInitializeEx(None, COINIT_APARTMENTTHREADED)
            .ok()
            .map_err(AudioError::ComInitFailed)?;
    }

    let result = f();

    unsafe {
        CoUninitialize();
    }

    result
}

fn enumerator() -> Result<IMMDeviceEnumerator, AudioError> {
    unsafe {
        CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(AudioError::WindowsError)
    }
}

/// Open the endpoint by its MMDevice id string.
fn open_device(device_id: &str) -> Result<IMMDevice, AudioError> {
    unsafe {
        let id_wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
        enumerator()?
            .GetDevice(PCWSTR::from_raw(id_wide.as_ptr()))
            .map_err(|_| AudioError::DeviceNotFound)
    }
}

fn endpoint_volume(device: &IMMDevice) -> Result<IAudioEndpointVolume, AudioError> {
    unsafe {
        device
            .Activate(CLSCTX_ALL, None)
            .map_err(AudioError::WindowsError)
    }
}

/// Friendly name from the endpoint's property store.
fn device_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let props: IPropertyStore = device.OpenPropertyStore(STGM(0)).ok()?;
        let key = PROPERTYKEY {
            fmtid: DEVPKEY_Device_FriendlyName.fmtid,
            pid: DEVPKEY_Device_FriendlyName.pid,
        };
        let prop = props.GetValue(&key).ok()?;
        let name = prop.to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl AudioBackend for WasapiBackend {
    fn name(&self) -> &'static str {
        "WASAPI"
    }

    fn resolve_default_output(&mut self) -> Result<OutputDevice, AudioError> {
        with_com(|| unsafe {
            let device = enumerator()?
                .GetDefaultAudioEndpoint(eRender, eConsole)
                .map_err(|_| AudioError::DeviceNotFound)?;

            let id = device
                .GetId()
                .map_err(AudioError::WindowsError)?
                .to_string()
                .map_err(|e| AudioError::OperationFailed(e.to_string()))?;
            let name = device_name(&device).unwrap_or_else(|| "Unknown".to_string());
            let channels = endpoint_volume(&device)?
                .GetChannelCount()
                .unwrap_or_default();

            debug!(%id, %name, channels, "resolved default render endpoint");
            Ok(OutputDevice { id, name, channels })
        })
    }

    fn volume_scalar(&mut self, device: &OutputDevice) -> Result<f32, AudioError> {
        with_com(|| unsafe {
            endpoint_volume(&open_device(&device.id)?)?
                .GetMasterVolumeLevelScalar()
                .map_err(AudioError::WindowsError)
        })
    }

    fn set_volume_scalar(&mut self, device: &OutputDevice, level: f32) -> Result<(), AudioError> {
        with_com(|| unsafe {
            endpoint_volume(&open_device(&device.id)?)?
                .SetMasterVolumeLevelScalar(level, std::ptr::null())
                .map_err(AudioError::WindowsError)
        })
    }

    fn is_muted(&mut self, device: &OutputDevice) -> Result<bool, AudioError> {
        with_com(|| unsafe {
            let muted = endpoint_volume(&open_device(&device.id)?)?
                .GetMute()
                .map_err(AudioError::WindowsError)?;
            Ok(muted.as_bool())
        })
    }

    fn set_muted(&mut self, device: &OutputDevice, muted: bool) -> Result<(), AudioError> {
        with_com(|| unsafe {
            endpoint_volume(&open_device(&device.id)?)?
                .SetMute(muted, std::ptr::null())
                .map_err(AudioError::WindowsError)
        })
    }
}
