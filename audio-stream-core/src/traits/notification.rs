use crate::models::port::{DeviceRole, DeviceState, Flow};

/// Device properties whose change invalidates an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProperty {
    /// The audio engine's device format.
    DeviceFormat,
    /// The device interface enabled flag.
    InterfaceEnabled,
    Other,
}

/// Receiver of platform topology notifications.
///
/// Called on a platform-managed thread at any time between registration and
/// unregistration. Implementations must not block.
pub trait DeviceNotificationListener: Send + Sync {
    fn on_device_state_changed(&self, device_id: &str, state: DeviceState);

    fn on_device_added(&self, device_id: &str);

    fn on_device_removed(&self, device_id: &str);

    fn on_default_device_changed(&self, flow: Flow, role: DeviceRole, device_id: Option<&str>);

    fn on_property_value_changed(&self, device_id: &str, property: DeviceProperty);
}
