//! CoreAudio HAL backend for macOS.
//!
//! Talks to the HAL through `coreaudio-sys`: the default output device
//! comes from `kAudioHardwarePropertyDefaultOutputDevice`, volume from
//! `kAudioDevicePropertyVolumeScalar` and mute from
//! `kAudioDevicePropertyMute`, all in the output scope.
//!
//! Volume on CoreAudio is per element (channel). At resolve time the
//! backend scans elements for a volume property, giving up after three
//! misses; reads average across the valid elements and writes apply to
//! every one of them. Some devices only accept mute on element 0, so
//! mute operations fall back to it when the per-element path fails.

use std::ffi::c_void;

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::*;
use tracing::debug;

use crate::audio::backend::AudioBackend;
use crate::audio::device::{AudioError, OutputDevice};

/// Elements without a volume property tolerated before the scan stops.
const MAX_SCAN_MISSES: u32 = 3;

/// Backend over the CoreAudio HAL.
pub struct CoreAudioBackend {
    /// Elements carrying a volume property, captured at resolve time.
    volume_elements: Vec<u32>,
}

impl CoreAudioBackend {
    pub fn new() -> Self {
        Self {
            volume_elements: Vec::new(),
        }
    }
}

impl Default for CoreAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn output_address(selector: u32, element: u32) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioDevicePropertyScopeOutput,
        mElement: element,
    }
}

fn get_property<T: Copy + Default>(
    device: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> Result<T, AudioError> {
    unsafe {
        let mut data = T::default();
        let mut size = std::mem::size_of::<T>() as u32;
        let status = AudioObjectGetPropertyData(
            device,
            address,
            0,
            std::ptr::null(),
            &mut size,
            &mut data as *mut T as *mut c_void,
        );
        if status != 0 {
            return Err(AudioError::CoreAudio(status));
        }
        Ok(data)
    }
}

fn set_property<T: Copy>(
    device: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    data: T,
) -> Result<(), AudioError> {
    unsafe {
        let status = AudioObjectSetPropertyData(
            device,
            address,
            0,
            std::ptr::null(),
            std::mem::size_of::<T>() as u32,
            &data as *const T as *const c_void,
        );
        if status != 0 {
            return Err(AudioError::CoreAudio(status));
        }
        Ok(())
    }
}

fn default_output_device() -> Result<AudioObjectID, AudioError> {
    let address = AudioObjectPropertyAddress {
        mSelector: kAudioHardwarePropertyDefaultOutputDevice,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };
    let device: AudioObjectID =
        get_property(kAudioObjectSystemObject, &address).map_err(|_| AudioError::DeviceNotFound)?;
    if device == kAudioObjectUnknown {
        return Err(AudioError::DeviceNotFound);
    }
    Ok(device)
}

fn device_name(device: AudioObjectID) -> Option<String> {
    unsafe {
        let address = AudioObjectPropertyAddress {
            mSelector: kAudioObjectPropertyName,
            mScope: kAudioObjectPropertyScopeGlobal,
            mElement: kAudioObjectPropertyElementMain,
        };
        let mut cf_name: CFStringRef = std::ptr::null();
        let mut size = std::mem::size_of::<CFStringRef>() as u32;
        let status = AudioObjectGetPropertyData(
            device,
            &address,
            0,
            std::ptr::null(),
            &mut size,
            &mut cf_name as *mut CFStringRef as *mut c_void,
        );
        if status != 0 || cf_name.is_null() {
            return None;
        }
        Some(CFString::wrap_under_create_rule(cf_name).to_string())
    }
}

/// Scan elements for a volume property, stopping after
/// [`MAX_SCAN_MISSES`] elements without one.
fn scan_volume_elements(device: AudioObjectID) -> Vec<u32> {
    let mut elements = Vec::new();
    let mut element = 0u32;
    let mut misses = 0u32;
    while misses < MAX_SCAN_MISSES {
        let address = output_address(kAudioDevicePropertyVolumeScalar, element);
        if unsafe { AudioObjectHasProperty(device, &address) } != 0 {
            elements.push(element);
        } else {
            misses += 1;
        }
        element += 1;
    }
    elements
}

fn parse_device_id(device: &OutputDevice) -> Result<AudioObjectID, AudioError> {
    device
        .id
        .parse::<AudioObjectID>()
        .map_err(|_| AudioError::OperationFailed(format!("bad CoreAudio device id {}", device.id)))
}

impl CoreAudioBackend {
    fn elements_for(&mut self, device: AudioObjectID) -> Vec<u32> {
        if self.volume_elements.is_empty() {
            self.volume_elements = scan_volume_elements(device);
        }
        self.volume_elements.clone()
    }
}

impl AudioBackend for CoreAudioBackend {
    fn name(&self) -> &'static str {
        "CoreAudio"
    }

    fn resolve_default_output(&mut self) -> Result<OutputDevice, AudioError> {
        let device = default_output_device()?;
        let elements = scan_volume_elements(device);
        if elements.is_empty() {
            // A device without any volume-capable element is not controllable.
            return Err(AudioError::DeviceNotFound);
        }
        let name = device_name(device).unwrap_or_else(|| "Unknown".to_string());
        debug!(device, %name, elements = elements.len(), "resolved default output device");
        self.volume_elements = elements.clone();
        Ok(OutputDevice {
            id: device.to_string(),
            name,
            channels: elements.len() as u32,
        })
    }

    fn volume_scalar(&mut self, device: &OutputDevice) -> Result<f32, AudioError> {
        let id = parse_device_id(device)?;
        let elements = self.elements_for(id);
        let mut levels = Vec::with_capacity(elements.len());
        for element in elements {
            let address = output_address(kAudioDevicePropertyVolumeScalar, element);
            levels.push(get_property::<f32>(id, &address)?);
        }
        if levels.is_empty() {
            return Err(AudioError::OperationFailed(
                "no volume-capable elements".to_string(),
            ));
        }
        // Channels may sit at different levels; report the average.
        Ok(levels.iter().sum::<f32>() / levels.len() as f32)
    }

    fn set_volume_scalar(&mut self, device: &OutputDevice, level: f32) -> Result<(), AudioError> {
        let id = parse_device_id(device)?;
        for element in self.elements_for(id) {
            let address = output_address(kAudioDevicePropertyVolumeScalar, element);
            set_property(id, &address, level)?;
        }
        Ok(())
    }

    fn is_muted(&mut self, device: &OutputDevice) -> Result<bool, AudioError> {
        let id = parse_device_id(device)?;
        let elements = self.elements_for(id);
        let mut states = Vec::with_capacity(elements.len());
        for element in &elements {
            let address = output_address(kAudioDevicePropertyMute, *element);
            match get_property::<u32>(id, &address) {
                Ok(state) => states.push(state != 0),
                Err(_) => {
                    // Some devices only expose mute on element 0.
                    let address = output_address(kAudioDevicePropertyMute, 0);
                    return Ok(get_property::<u32>(id, &address)? != 0);
                }
            }
        }
        Ok(!states.is_empty() && states.iter().all(|&muted| muted))
    }

    fn set_muted(&mut self, device: &OutputDevice, muted: bool) -> Result<(), AudioError> {
        let id = parse_device_id(device)?;
        let state = muted as u32;
        for element in self.elements_for(id) {
            let address = output_address(kAudioDevicePropertyMute, element);
            if set_property(id, &address, state).is_err() {
                // Same element-0 fallback as reads.
                let address = output_address(kAudioDevicePropertyMute, 0);
                return set_property(id, &address, state);
            }
        }
        Ok(())
    }
}
