//! `IMMDevice` behind the core [`Device`] trait.

use windows::core::{Interface, PWSTR};
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use audio_stream_core::models::port::{DeviceProperties, DeviceState, Flow};
use audio_stream_core::models::status::StatusCode;
use audio_stream_core::traits::audio_client::AudioClient;
use audio_stream_core::traits::backend::Device;

use crate::audio_client::WasapiClient;
use crate::com::{ensure_apartment, IntoStatus};

/// A WASAPI endpoint.
pub struct WasapiDevice {
    device: IMMDevice,
}

// SAFETY: MMDevice API objects live in the multithreaded apartment and are
// free-threaded; the wrapper holds no other state.
unsafe impl Send for WasapiDevice {}
unsafe impl Sync for WasapiDevice {}

impl WasapiDevice {
    pub(crate) fn new(device: IMMDevice) -> Self {
        Self { device }
    }
}

pub(crate) fn flow_from_data_flow(data_flow: EDataFlow) -> Option<Flow> {
    match data_flow {
        f if f == eRender => Some(Flow::Out),
        f if f == eCapture => Some(Flow::In),
        _ => None,
    }
}

pub(crate) fn data_flow(flow: Flow) -> EDataFlow {
    match flow {
        Flow::Out => eRender,
        Flow::In => eCapture,
    }
}

pub(crate) fn device_state(state: DEVICE_STATE) -> DeviceState {
    match state {
        DEVICE_STATE_ACTIVE => DeviceState::Active,
        DEVICE_STATE_DISABLED => DeviceState::Disabled,
        DEVICE_STATE_UNPLUGGED => DeviceState::Unplugged,
        _ => DeviceState::NotPresent,
    }
}

/// Copy a `CoTaskMemAlloc`ed wide string and free it.
pub(crate) unsafe fn take_pwstr(value: PWSTR) -> Result<String, StatusCode> {
    let text = value.to_string().map_err(|_| StatusCode::E_UNEXPECTED);
    CoTaskMemFree(Some(value.0 as *const _));
    text
}

/// Read one string property; missing or non-string values read as `None`.
fn string_property(store: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    unsafe {
        let value = store.GetValue(key).ok()?;
        let text = value.to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl Device for WasapiDevice {
    fn id(&self) -> Result<String, StatusCode> {
        unsafe {
            let id = self.device.GetId().status()?;
            take_pwstr(id)
        }
    }

    fn flow(&self) -> Result<Flow, StatusCode> {
        unsafe {
            let endpoint: IMMEndpoint = self.device.cast().status()?;
            let data_flow = endpoint.GetDataFlow().status()?;
            flow_from_data_flow(data_flow).ok_or(StatusCode::E_UNEXPECTED)
        }
    }

    fn state(&self) -> Result<DeviceState, StatusCode> {
        let state = unsafe { self.device.GetState().status()? };
        Ok(device_state(state))
    }

    fn properties(&self) -> Result<DeviceProperties, StatusCode> {
        let store = unsafe { self.device.OpenPropertyStore(STGM_READ).status()? };
        Ok(DeviceProperties {
            name: string_property(&store, &PKEY_Device_FriendlyName),
            vendor: string_property(&store, &PKEY_Device_Manufacturer),
            version: string_property(&store, &PKEY_Device_DriverVersion),
            description: string_property(&store, &PKEY_Device_DeviceDesc),
        })
    }

    fn activate(&self) -> Result<Box<dyn AudioClient>, StatusCode> {
        ensure_apartment()?;
        let client: IAudioClient = unsafe { self.device.Activate(CLSCTX_ALL, None).status()? };
        Ok(Box::new(WasapiClient::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flows_map_both_ways() {
        assert_eq!(flow_from_data_flow(data_flow(Flow::Out)), Some(Flow::Out));
        assert_eq!(flow_from_data_flow(data_flow(Flow::In)), Some(Flow::In));
        assert_eq!(flow_from_data_flow(eAll), None);
    }

    #[test]
    fn states_map_to_core_states() {
        assert_eq!(device_state(DEVICE_STATE_ACTIVE), DeviceState::Active);
        assert_eq!(device_state(DEVICE_STATE_DISABLED), DeviceState::Disabled);
        assert_eq!(device_state(DEVICE_STATE_UNPLUGGED), DeviceState::Unplugged);
        assert_eq!(device_state(DEVICE_STATE_NOTPRESENT), DeviceState::NotPresent);
    }
}
