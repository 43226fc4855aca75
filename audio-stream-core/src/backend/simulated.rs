//! Deterministic in-process backend.
//!
//! Endpoints, device state and topology notifications are driven from the
//! outside (tests, headless CI); streams are advanced by explicit calls such
//! as [`SimStream::consume`] and [`SimStream::push_capture`].
//!
//! [`SimStream::consume`]: super::simulated_client::SimStream::consume
//! [`SimStream::push_capture`]: super::simulated_client::SimStream::push_capture

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_format::AudioFormat;
use crate::models::port::{DeviceProperties, DeviceRole, DeviceState, Flow};
use crate::models::status::StatusCode;
use crate::traits::audio_client::{AudioClient, DevicePeriod};
use crate::traits::backend::{AudioBackend, Device, DeviceEnumerator, SubscriptionId};
use crate::traits::notification::{DeviceNotificationListener, DeviceProperty};

use super::simulated_client::{SimClient, SimStream};

/// Platform call that can be made to fail on a simulated endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Activate,
    Initialize,
    RenderClient,
    CaptureClient,
    Clock,
    EventSignals,
    BufferSize,
    Padding,
    GetBuffer,
    ReleaseBuffer,
    Start,
}

/// Static description of a simulated endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub id: String,
    pub flow: Flow,
    pub state: DeviceState,
    pub properties: DeviceProperties,
    /// Shared-mode format; also the closest match proposed for anything unsupported.
    pub mix_format: AudioFormat,
    /// Formats accepted besides the mix format.
    pub supported_formats: Vec<AudioFormat>,
    pub period: DevicePeriod,
    pub latency: Duration,
}

impl EndpointConfig {
    fn new(id: &str, flow: Flow, mix_format: AudioFormat) -> Self {
        Self {
            id: id.to_string(),
            flow,
            state: DeviceState::Active,
            properties: DeviceProperties {
                name: Some(format!("Simulated {flow} {id}")),
                vendor: Some("Simulated".into()),
                version: None,
                description: None,
            },
            mix_format,
            supported_formats: Vec::new(),
            period: DevicePeriod {
                default: Duration::from_millis(10),
                minimum: Duration::from_millis(3),
            },
            latency: Duration::ZERO,
        }
    }

    pub fn render(id: &str, mix_format: AudioFormat) -> Self {
        Self::new(id, Flow::Out, mix_format)
    }

    pub fn capture(id: &str, mix_format: AudioFormat) -> Self {
        Self::new(id, Flow::In, mix_format)
    }

    pub fn with_supported_format(mut self, format: AudioFormat) -> Self {
        self.supported_formats.push(format);
        self
    }

    pub fn with_properties(mut self, properties: DeviceProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    pub fn with_period(mut self, default: Duration, minimum: Duration) -> Self {
        self.period = DevicePeriod { default, minimum };
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Order in which simulated platform objects were released.
#[derive(Debug, Default)]
pub struct ReleaseLog {
    entries: Mutex<Vec<&'static str>>,
}

impl ReleaseLog {
    pub(crate) fn record(&self, what: &'static str) {
        self.entries.lock().push(what);
    }

    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.entries.lock())
    }
}

type StopResetHook = Box<dyn FnOnce() + Send>;

/// A simulated physical endpoint, shared by every handle to it.
pub struct SimEndpoint {
    config: EndpointConfig,
    state: Mutex<DeviceState>,
    latency: Mutex<Duration>,
    property_store_fails: AtomicBool,
    short_regions: AtomicBool,
    stop_reset_hook: Mutex<Option<StopResetHook>>,
    failures: Mutex<HashMap<FailurePoint, StatusCode>>,
    stream: Mutex<Option<Arc<SimStream>>>,
}

impl SimEndpoint {
    fn new(config: EndpointConfig) -> Self {
        Self {
            state: Mutex::new(config.state),
            latency: Mutex::new(config.latency),
            config,
            property_store_fails: AtomicBool::new(false),
            short_regions: AtomicBool::new(false),
            stop_reset_hook: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            stream: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn flow(&self) -> Flow {
        self.config.flow
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    /// Make property store reads fail (as for a half-removed device).
    pub fn fail_property_store(&self, fail: bool) {
        self.property_store_fails.store(fail, Ordering::Release);
    }

    /// Hand out render regions one frame shorter than requested.
    pub fn shorten_render_regions(&self, short: bool) {
        self.short_regions.store(short, Ordering::Release);
    }

    pub(crate) fn short_regions(&self) -> bool {
        self.short_regions.load(Ordering::Acquire)
    }

    /// Run `hook` once, the next time a stream's stop-requested signal is
    /// reset, immediately before the reset takes effect.
    pub fn before_next_stop_reset(&self, hook: impl FnOnce() + Send + 'static) {
        *self.stop_reset_hook.lock() = Some(Box::new(hook));
    }

    pub(crate) fn take_stop_reset_hook(&self) -> Option<StopResetHook> {
        self.stop_reset_hook.lock().take()
    }

    /// Make `point` fail with `status` until cleared with `None`.
    pub fn inject_failure(&self, point: FailurePoint, status: Option<StatusCode>) {
        let mut failures = self.failures.lock();
        match status {
            Some(status) => failures.insert(point, status),
            None => failures.remove(&point),
        };
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn latency(&self) -> Duration {
        *self.latency.lock()
    }

    /// The most recently initialized stream on this endpoint.
    pub fn stream(&self) -> Option<Arc<SimStream>> {
        self.stream.lock().clone()
    }

    pub(crate) fn set_stream(&self, stream: Arc<SimStream>) {
        *self.stream.lock() = Some(stream);
    }

    pub(crate) fn check(&self, point: FailurePoint) -> Result<(), StatusCode> {
        match self.failures.lock().get(&point) {
            Some(status) => Err(*status),
            None => Ok(()),
        }
    }

    /// Calls on a device that has gone away report invalidation.
    pub(crate) fn check_alive(&self) -> Result<(), StatusCode> {
        if self.state().is_gone() {
            Err(StatusCode::AUDCLNT_E_DEVICE_INVALIDATED)
        } else {
            Ok(())
        }
    }

    pub(crate) fn accepts(&self, format: &AudioFormat) -> bool {
        *format == self.config.mix_format || self.config.supported_formats.contains(format)
    }
}

struct Shared {
    endpoints: Mutex<Vec<Arc<SimEndpoint>>>,
    defaults: Mutex<HashMap<Flow, String>>,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn DeviceNotificationListener>)>>,
    next_subscription: AtomicU64,
    enumerator_failure: Mutex<Option<StatusCode>>,
    registration_failure: Mutex<Option<StatusCode>>,
    releases: Arc<ReleaseLog>,
}

impl Shared {
    fn find(&self, id: &str) -> Option<Arc<SimEndpoint>> {
        self.endpoints.lock().iter().find(|e| e.id() == id).cloned()
    }

    fn notify(&self, deliver: impl Fn(&dyn DeviceNotificationListener)) {
        // callbacks run without the registry lock held
        let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            deliver(listener.as_ref());
        }
    }
}

/// Backend handle. Clones share the same simulated machine.
#[derive(Clone)]
pub struct SimulatedBackend {
    shared: Arc<Shared>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoints: Mutex::new(Vec::new()),
                defaults: Mutex::new(HashMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                enumerator_failure: Mutex::new(None),
                registration_failure: Mutex::new(None),
                releases: Arc::new(ReleaseLog::default()),
            }),
        }
    }

    /// Plug in an endpoint and announce it to registered listeners.
    pub fn add_endpoint(&self, config: EndpointConfig) -> Arc<SimEndpoint> {
        let endpoint = Arc::new(SimEndpoint::new(config));
        self.shared.endpoints.lock().push(Arc::clone(&endpoint));
        self.shared.notify(|l| l.on_device_added(endpoint.id()));
        endpoint
    }

    pub fn endpoint(&self, id: &str) -> Option<Arc<SimEndpoint>> {
        self.shared.find(id)
    }

    /// Change a device's state and deliver the notification.
    pub fn set_device_state(&self, id: &str, state: DeviceState) {
        if let Some(endpoint) = self.shared.find(id) {
            *endpoint.state.lock() = state;
            self.shared.notify(|l| l.on_device_state_changed(id, state));
        }
    }

    /// Unplug a device: listeners hear about the removal before the device
    /// reports itself gone.
    pub fn remove_device(&self, id: &str) {
        if let Some(endpoint) = self.shared.find(id) {
            self.shared.notify(|l| l.on_device_removed(id));
            *endpoint.state.lock() = DeviceState::NotPresent;
        }
    }

    pub fn set_default(&self, flow: Flow, id: &str) {
        self.shared.defaults.lock().insert(flow, id.to_string());
        self.shared
            .notify(|l| l.on_default_device_changed(flow, DeviceRole::Console, Some(id)));
    }

    pub fn change_property(&self, id: &str, property: DeviceProperty) {
        self.shared.notify(|l| l.on_property_value_changed(id, property));
    }

    /// Make enumerator creation fail until cleared with `None`.
    pub fn fail_enumerator(&self, status: Option<StatusCode>) {
        *self.shared.enumerator_failure.lock() = status;
    }

    /// Make notification registration fail until cleared with `None`.
    pub fn fail_registration(&self, status: Option<StatusCode>) {
        *self.shared.registration_failure.lock() = status;
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    pub fn releases(&self) -> &ReleaseLog {
        &self.shared.releases
    }
}

impl AudioBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create_enumerator(&self) -> Result<Box<dyn DeviceEnumerator>, StatusCode> {
        if let Some(status) = *self.shared.enumerator_failure.lock() {
            return Err(status);
        }
        Ok(Box::new(SimEnumerator {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct SimEnumerator {
    shared: Arc<Shared>,
}

impl SimEnumerator {
    fn handle(&self, endpoint: Arc<SimEndpoint>) -> Box<dyn Device> {
        Box::new(SimDevice {
            endpoint,
            releases: Arc::clone(&self.shared.releases),
        })
    }
}

impl DeviceEnumerator for SimEnumerator {
    fn endpoints(&self, flow: Flow) -> Result<Vec<Box<dyn Device>>, StatusCode> {
        let endpoints: Vec<_> = self
            .shared
            .endpoints
            .lock()
            .iter()
            .filter(|e| e.flow() == flow && e.state().is_active())
            .cloned()
            .collect();
        Ok(endpoints.into_iter().map(|e| self.handle(e)).collect())
    }

    fn default_endpoint(&self, flow: Flow) -> Result<Option<Box<dyn Device>>, StatusCode> {
        let id = self.shared.defaults.lock().get(&flow).cloned();
        Ok(id
            .and_then(|id| self.shared.find(&id))
            .filter(|e| e.state().is_active())
            .map(|e| self.handle(e)))
    }

    fn device(&self, id: &str) -> Result<Box<dyn Device>, StatusCode> {
        self.shared
            .find(id)
            .map(|e| self.handle(e))
            .ok_or(StatusCode::E_NOTFOUND)
    }

    fn register_notifications(
        &self,
        listener: Arc<dyn DeviceNotificationListener>,
    ) -> Result<SubscriptionId, StatusCode> {
        if let Some(status) = *self.shared.registration_failure.lock() {
            return Err(status);
        }
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.lock().push((id, listener));
        Ok(id)
    }

    fn unregister_notifications(&self, id: SubscriptionId) -> Result<(), StatusCode> {
        let mut listeners = self.shared.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        if listeners.len() == before {
            return Err(StatusCode::E_INVALIDARG);
        }
        self.shared.releases.record("unregister");
        Ok(())
    }
}

impl Drop for SimEnumerator {
    fn drop(&mut self) {
        self.shared.releases.record("enumerator");
    }
}

struct SimDevice {
    endpoint: Arc<SimEndpoint>,
    releases: Arc<ReleaseLog>,
}

impl Device for SimDevice {
    fn id(&self) -> Result<String, StatusCode> {
        Ok(self.endpoint.id().to_string())
    }

    fn flow(&self) -> Result<Flow, StatusCode> {
        Ok(self.endpoint.flow())
    }

    fn state(&self) -> Result<DeviceState, StatusCode> {
        Ok(self.endpoint.state())
    }

    fn properties(&self) -> Result<DeviceProperties, StatusCode> {
        if self.endpoint.property_store_fails.load(Ordering::Acquire) {
            return Err(StatusCode::E_FAIL);
        }
        Ok(self.endpoint.config.properties.clone())
    }

    fn activate(&self) -> Result<Box<dyn AudioClient>, StatusCode> {
        self.endpoint.check_alive()?;
        self.endpoint.check(FailurePoint::Activate)?;
        Ok(Box::new(SimClient::new(
            Arc::clone(&self.endpoint),
            Arc::clone(&self.releases),
        )))
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.releases.record("device");
    }
}
