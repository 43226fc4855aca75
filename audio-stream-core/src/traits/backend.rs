use std::sync::Arc;

use crate::models::audio_format::AudioFormat;
use crate::models::port::{DeviceProperties, DeviceState, Flow};
use crate::models::status::StatusCode;
use crate::traits::audio_client::AudioClient;
use crate::traits::notification::DeviceNotificationListener;

/// Identifies one notification registration on a [`DeviceEnumerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Entry point of a platform audio API.
///
/// Implemented by:
/// - `WasapiBackend` (Windows, `audio-stream-windows`)
/// - `SimulatedBackend` (deterministic, in-process; tests and headless CI)
pub trait AudioBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn name(&self) -> &str;

    /// Create a fresh device enumerator.
    fn create_enumerator(&self) -> Result<Box<dyn DeviceEnumerator>, StatusCode>;
}

/// Enumerates endpoints and delivers topology notifications.
pub trait DeviceEnumerator: Send + Sync {
    /// Active endpoints for a flow, in platform enumeration order.
    fn endpoints(&self, flow: Flow) -> Result<Vec<Box<dyn Device>>, StatusCode>;

    /// The platform default endpoint, or `None` when there is none.
    fn default_endpoint(&self, flow: Flow) -> Result<Option<Box<dyn Device>>, StatusCode>;

    /// Resolve a device id to a live device.
    fn device(&self, id: &str) -> Result<Box<dyn Device>, StatusCode>;

    /// Start delivering topology notifications to `listener` on a platform thread.
    fn register_notifications(
        &self,
        listener: Arc<dyn DeviceNotificationListener>,
    ) -> Result<SubscriptionId, StatusCode>;

    /// Stop delivering notifications. No callback runs after this returns.
    fn unregister_notifications(&self, id: SubscriptionId) -> Result<(), StatusCode>;
}

/// A physical endpoint.
pub trait Device: Send + Sync {
    fn id(&self) -> Result<String, StatusCode>;

    fn flow(&self) -> Result<Flow, StatusCode>;

    fn state(&self) -> Result<DeviceState, StatusCode>;

    /// Descriptive metadata. Fails when the property store cannot be opened.
    fn properties(&self) -> Result<DeviceProperties, StatusCode>;

    /// The device's preferred shared-mode format.
    fn mix_format(&self) -> Result<AudioFormat, StatusCode> {
        self.activate()?.mix_format()
    }

    /// Activate a fresh audio client on this device.
    fn activate(&self) -> Result<Box<dyn AudioClient>, StatusCode>;
}
