//! `IMMNotificationClient` forwarding to a core listener.

use std::sync::Arc;

use windows::core::{implement, GUID, PCWSTR};
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::*;

use audio_stream_core::models::port::DeviceRole;
use audio_stream_core::traits::notification::{DeviceNotificationListener, DeviceProperty};

use crate::device::{device_state, flow_from_data_flow};

const PKEY_AUDIO_ENGINE_DEVICE_FORMAT: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0xf19f064d_082c_4e27_bc73_6882a1bb8e4c),
    pid: 0,
};

const PKEY_DEVICE_INTERFACE_ENABLED: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0x026e516e_b814_414b_83cd_856d6fef4822),
    pid: 3,
};

/// COM object registered with `IMMDeviceEnumerator`.
///
/// Callbacks arrive on an MMDevice worker thread. They translate and forward,
/// and always report success so the platform keeps delivering.
#[implement(IMMNotificationClient)]
pub(crate) struct NotificationClient {
    listener: Arc<dyn DeviceNotificationListener>,
}

impl NotificationClient {
    pub(crate) fn new(listener: Arc<dyn DeviceNotificationListener>) -> Self {
        Self { listener }
    }
}

fn device_id(id: &PCWSTR) -> Option<String> {
    if id.is_null() {
        return None;
    }
    unsafe { id.to_string().ok() }
}

pub(crate) fn device_property(key: &PROPERTYKEY) -> DeviceProperty {
    if *key == PKEY_AUDIO_ENGINE_DEVICE_FORMAT {
        DeviceProperty::DeviceFormat
    } else if *key == PKEY_DEVICE_INTERFACE_ENABLED {
        DeviceProperty::InterfaceEnabled
    } else {
        DeviceProperty::Other
    }
}

fn device_role(role: ERole) -> DeviceRole {
    match role {
        r if r == eMultimedia => DeviceRole::Multimedia,
        r if r == eCommunications => DeviceRole::Communications,
        _ => DeviceRole::Console,
    }
}

impl IMMNotificationClient_Impl for NotificationClient_Impl {
    fn OnDeviceStateChanged(&self, pwstrdeviceid: &PCWSTR, dwnewstate: DEVICE_STATE) -> windows::core::Result<()> {
        if let Some(id) = device_id(pwstrdeviceid) {
            self.listener.on_device_state_changed(&id, device_state(dwnewstate));
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(id) = device_id(pwstrdeviceid) {
            self.listener.on_device_added(&id);
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        if let Some(id) = device_id(pwstrdeviceid) {
            self.listener.on_device_removed(&id);
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        // eAll never reaches here for a default change.
        if let Some(flow) = flow_from_data_flow(flow) {
            let id = device_id(pwstrdefaultdeviceid);
            self.listener
                .on_default_device_changed(flow, device_role(role), id.as_deref());
        }
        Ok(())
    }

    fn OnPropertyValueChanged(&self, pwstrdeviceid: &PCWSTR, key: &PROPERTYKEY) -> windows::core::Result<()> {
        if let Some(id) = device_id(pwstrdeviceid) {
            self.listener.on_property_value_changed(&id, device_property(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidating_properties_are_recognized() {
        assert_eq!(device_property(&PKEY_AUDIO_ENGINE_DEVICE_FORMAT), DeviceProperty::DeviceFormat);
        assert_eq!(device_property(&PKEY_DEVICE_INTERFACE_ENABLED), DeviceProperty::InterfaceEnabled);
        let volume = PROPERTYKEY {
            fmtid: PKEY_AUDIO_ENGINE_DEVICE_FORMAT.fmtid,
            pid: 1,
        };
        assert_eq!(device_property(&volume), DeviceProperty::Other);
    }
}
