//! Windows audio device enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list endpoints per flow, resolve device
//! ids, and route endpoint notifications to core listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use windows::core::HSTRING;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use audio_stream_core::models::port::Flow;
use audio_stream_core::models::status::StatusCode;
use audio_stream_core::traits::backend::{AudioBackend, Device, DeviceEnumerator, SubscriptionId};
use audio_stream_core::traits::notification::DeviceNotificationListener;

use crate::com::{ensure_apartment, status_of, IntoStatus};
use crate::device::{data_flow, WasapiDevice};
use crate::notification_client::NotificationClient;

/// The WASAPI [`AudioBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiBackend;

impl WasapiBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for WasapiBackend {
    fn name(&self) -> &str {
        "wasapi"
    }

    fn create_enumerator(&self) -> Result<Box<dyn DeviceEnumerator>, StatusCode> {
        Ok(Box::new(WasapiEnumerator::new()?))
    }
}

/// `IMMDeviceEnumerator` plus the notification clients registered on it.
pub struct WasapiEnumerator {
    enumerator: IMMDeviceEnumerator,
    registrations: Mutex<HashMap<SubscriptionId, IMMNotificationClient>>,
    next_id: AtomicU64,
}

// SAFETY: the enumerator and notification clients are MTA objects; the
// registration map is guarded by a mutex.
unsafe impl Send for WasapiEnumerator {}
unsafe impl Sync for WasapiEnumerator {}

impl WasapiEnumerator {
    /// Create an enumerator, joining the multithreaded apartment if needed.
    pub fn new() -> Result<Self, StatusCode> {
        ensure_apartment()?;
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).status()? };
        Ok(Self {
            enumerator,
            registrations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }
}

impl DeviceEnumerator for WasapiEnumerator {
    fn endpoints(&self, flow: Flow) -> Result<Vec<Box<dyn Device>>, StatusCode> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow(flow), DEVICE_STATE_ACTIVE)
                .status()?;
            let count = collection.GetCount().status()?;

            let mut devices: Vec<Box<dyn Device>> = Vec::new();
            devices
                .try_reserve(count as usize)
                .map_err(|_| StatusCode::E_OUTOFMEMORY)?;
            for i in 0..count {
                match collection.Item(i) {
                    Ok(device) => devices.push(Box::new(WasapiDevice::new(device))),
                    Err(e) => log::warn!("skipping endpoint {i} of {flow}: {e}"),
                }
            }
            Ok(devices)
        }
    }

    fn default_endpoint(&self, flow: Flow) -> Result<Option<Box<dyn Device>>, StatusCode> {
        match unsafe { self.enumerator.GetDefaultAudioEndpoint(data_flow(flow), eConsole) } {
            Ok(device) => Ok(Some(Box::new(WasapiDevice::new(device)))),
            Err(e) if status_of(&e) == StatusCode::E_NOTFOUND => Ok(None),
            Err(e) => Err(status_of(&e)),
        }
    }

    fn device(&self, id: &str) -> Result<Box<dyn Device>, StatusCode> {
        let wide_id = HSTRING::from(id);
        let device = unsafe { self.enumerator.GetDevice(&wide_id).status()? };
        Ok(Box::new(WasapiDevice::new(device)))
    }

    fn register_notifications(
        &self,
        listener: Arc<dyn DeviceNotificationListener>,
    ) -> Result<SubscriptionId, StatusCode> {
        let client: IMMNotificationClient = NotificationClient::new(listener).into();
        unsafe {
            self.enumerator
                .RegisterEndpointNotificationCallback(&client)
                .status()?;
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registrations.lock().insert(id, client);
        Ok(id)
    }

    fn unregister_notifications(&self, id: SubscriptionId) -> Result<(), StatusCode> {
        let client = self
            .registrations
            .lock()
            .remove(&id)
            .ok_or(StatusCode::E_INVALIDARG)?;
        // Blocks until in-flight callbacks return.
        unsafe {
            self.enumerator
                .UnregisterEndpointNotificationCallback(&client)
                .status()
        }
    }
}

impl Drop for WasapiEnumerator {
    fn drop(&mut self) {
        for (id, client) in self.registrations.get_mut().drain() {
            log::warn!("notification subscription {} outlived its session", id.0);
            unsafe {
                let _ = self.enumerator.UnregisterEndpointNotificationCallback(&client);
            }
        }
    }
}
