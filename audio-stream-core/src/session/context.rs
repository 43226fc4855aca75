//! Per-stream resource ownership shared by output and input sessions.
//!
//! Resources are acquired in open order and held in a single struct whose
//! field order is the release order, so both an explicit close and a failed
//! open unwind them the same way.

use std::sync::{Arc, Weak};
use std::time::Duration;

use uuid::Uuid;

use crate::catalog::format_negotiator::FormatNegotiator;
use crate::catalog::port_catalog::{port_from_device, PortCatalog};
use crate::models::audio_format::AudioFormat;
use crate::models::config::StreamConfiguration;
use crate::models::error::EngineError;
use crate::models::notice::DeviceNotice;
use crate::models::port::{Flow, Port};
use crate::models::state::{MonitorState, SessionState};
use crate::models::status::StatusCode;
use crate::processing::timing::TimingStrategy;
use crate::session::monitor::{DeviceChangeMonitor, NotificationQueue};
use crate::traits::audio_client::{AudioClient, AudioClock};
use crate::traits::backend::{AudioBackend, Device, DeviceEnumerator, SubscriptionId};
use crate::traits::notification::DeviceNotificationListener;
use crate::traits::signals::{EventSignals, WaitOutcome};

/// Topology registration owned by a session.
///
/// Unregisters before its enumerator is released.
struct Subscription {
    id: SubscriptionId,
    monitor: Arc<DeviceChangeMonitor>,
    enumerator: Box<dyn DeviceEnumerator>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(status) = self.enumerator.unregister_notifications(self.id) {
            log::warn!("failed to unregister device notifications: {status}");
        }
        self.monitor.unsubscribe();
    }
}

/// OS resources of an open session. Field order is release order.
pub(crate) struct SessionResources<S> {
    subscription: Option<Subscription>,
    pub(crate) clock: Box<dyn AudioClock>,
    pub(crate) service: S,
    pub(crate) client: Box<dyn AudioClient>,
    pub(crate) device: Box<dyn Device>,
    pub(crate) signals: Arc<dyn EventSignals>,
}

/// Raises a session's stop-requested signal from any thread.
///
/// Holds no ownership: once the session is closed, `interrupt` does nothing.
#[derive(Clone)]
pub struct InterruptHandle {
    signals: Weak<dyn EventSignals>,
}

impl InterruptHandle {
    /// Request a clean stop of any in-flight write, read or drain.
    /// Returns `false` when the session no longer exists.
    pub fn interrupt(&self) -> bool {
        match self.signals.upgrade() {
            Some(signals) => {
                signals.raise_stop();
                true
            }
            None => false,
        }
    }
}

/// State and resources of one open stream.
///
/// `S` is the direction-specific service: a render client for output, a
/// capture client for input.
pub struct SessionContext<S> {
    id: Uuid,
    flow: Flow,
    port: Port,
    format: AudioFormat,
    timing: TimingStrategy,
    buffer_frames: u32,
    pub(crate) pending_frames: u64,
    pub(crate) state: SessionState,
    monitor: Arc<DeviceChangeMonitor>,
    notices: Arc<NotificationQueue>,
    pub(crate) resources: Option<SessionResources<S>>,
}

impl<S> SessionContext<S> {
    /// Acquire every resource of a new session.
    ///
    /// `acquire_service` obtains the render or capture interface from the
    /// initialized client. Any failure releases what was acquired so far,
    /// in reverse order, before the error is returned.
    pub(crate) fn open(
        backend: &dyn AudioBackend,
        catalog: &PortCatalog,
        port: &Port,
        flow: Flow,
        config: &StreamConfiguration,
        acquire_service: impl FnOnce(&mut dyn AudioClient) -> Result<S, StatusCode>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let id = Uuid::new_v4();
        log::debug!("[{id}] opening {flow} stream on {} ({})", port.name, port.handle);

        let device = catalog.resolve(&port.handle)?;
        let mut client = device
            .activate()
            .map_err(|status| EngineError::from_status("activate audio client", status))?;

        let mode = config.timing_mode;
        let format = FormatNegotiator::negotiate(client.as_ref(), &config.format, mode)?;
        let period = client
            .device_period()
            .map_err(|status| EngineError::from_status("get device period", status))?;
        let timing = TimingStrategy::new(mode, period, config);

        let requested_frames = format.frames_for_bytes(config.buffer_size_bytes as usize);
        let duration = timing.buffer_duration(requested_frames, format.sample_rate);
        client
            .initialize(mode, duration, timing.periodicity(), &format)
            .map_err(|status| EngineError::from_status("initialize audio client", status))?;

        let service = acquire_service(client.as_mut())
            .map_err(|status| EngineError::from_status("get stream service", status))?;
        let clock = client
            .clock()
            .map_err(|status| EngineError::from_status("get audio clock", status))?;
        let signals = client
            .event_signals()
            .map_err(|status| EngineError::from_status("bind buffer event", status))?;
        let buffer_frames = client
            .buffer_size()
            .map_err(|status| EngineError::from_status("get buffer size", status))?;

        let notices = Arc::new(NotificationQueue::new());
        let monitor = Arc::new(DeviceChangeMonitor::new(
            flow,
            port.handle.as_str(),
            &signals,
            Arc::clone(&notices),
        ));
        let subscription = match Self::subscribe(backend, &monitor) {
            Ok(subscription) => Some(subscription),
            Err(status) => {
                log::warn!("[{id}] device change notifications unavailable, stream will not self-interrupt: {status}");
                monitor.unsubscribe();
                None
            }
        };

        log::info!(
            "[{id}] opened {flow} stream: {format}, {buffer_frames} frames ({:?}, requested {requested_frames})",
            mode
        );

        Ok(Self {
            id,
            flow,
            port: port.clone(),
            format,
            timing,
            buffer_frames,
            pending_frames: 0,
            state: SessionState::Open,
            monitor,
            notices,
            resources: Some(SessionResources {
                subscription,
                clock,
                service,
                client,
                device,
                signals,
            }),
        })
    }

    fn subscribe(backend: &dyn AudioBackend, monitor: &Arc<DeviceChangeMonitor>) -> Result<Subscription, StatusCode> {
        let enumerator = backend.create_enumerator()?;
        let listener: Arc<dyn DeviceNotificationListener> = Arc::<DeviceChangeMonitor>::clone(monitor);
        let id = enumerator.register_notifications(listener)?;
        Ok(Subscription {
            id,
            monitor: Arc::clone(monitor),
            enumerator,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// The negotiated format (never the request when the device proposed another).
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frame_size(&self) -> usize {
        self.format.frame_size() as usize
    }

    pub fn timing(&self) -> &TimingStrategy {
        &self.timing
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.resources.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// Frames committed since the last flush.
    pub fn pending_frames(&self) -> u64 {
        self.pending_frames
    }

    pub fn interrupt_handle(&self) -> Result<InterruptHandle, EngineError> {
        let resources = self.resources("interrupt handle")?;
        Ok(InterruptHandle {
            signals: Arc::downgrade(&resources.signals),
        })
    }

    pub(crate) fn resources(&self, op: &'static str) -> Result<&SessionResources<S>, EngineError> {
        self.resources.as_ref().ok_or(EngineError::SessionClosed { op })
    }

    pub(crate) fn resources_mut(&mut self, op: &'static str) -> Result<&mut SessionResources<S>, EngineError> {
        self.resources.as_mut().ok_or(EngineError::SessionClosed { op })
    }

    /// Take queued topology notices and emit them on this thread.
    pub fn drain_notifications(&self) -> Vec<DeviceNotice> {
        let notices = self.notices.drain();
        for notice in &notices {
            log::debug!("[{}] {} {}", self.id, notice.received_at.to_rfc3339(), notice.message);
        }
        notices
    }

    /// Fail unless the bound device is active.
    ///
    /// An inactive device is `DeviceInvalidated` once the monitor has seen
    /// the topology change behind it, `DeviceInactive` otherwise.
    pub(crate) fn ensure_device_active(&self, op: &'static str) -> Result<(), EngineError> {
        let resources = self.resources(op)?;
        let state = resources.device.state();
        match state {
            Ok(state) if state.is_active() => Ok(()),
            Ok(state) => {
                self.drain_notifications();
                log::error!("[{}] {op}: device is {state:?}", self.id);
                if self.monitor.is_interrupted() {
                    Err(EngineError::DeviceInvalidated { op })
                } else {
                    Err(EngineError::DeviceInactive { op })
                }
            }
            Err(status) => {
                self.drain_notifications();
                Err(EngineError::from_status(op, status))
            }
        }
    }

    /// Classify a failed platform call made during I/O.
    pub(crate) fn io_error(&self, op: &'static str, status: StatusCode) -> EngineError {
        self.drain_notifications();
        let err = EngineError::from_status(op, status);
        log::error!("[{}] {err}", self.id);
        err
    }

    pub(crate) fn current_padding(&self, op: &'static str) -> Result<u32, EngineError> {
        self.resources(op)?
            .client
            .current_padding()
            .map_err(|status| self.io_error(op, status))
    }

    /// Block on the signal pair.
    pub(crate) fn wait(&self, op: &'static str, timeout: Option<Duration>) -> Result<WaitOutcome, EngineError> {
        self.resources(op)?
            .signals
            .wait(timeout)
            .map_err(|status| self.io_error(op, status))
    }

    /// Outcome of an I/O call that observed the stop-requested signal.
    ///
    /// A stop raised by the device change monitor is a device invalidation;
    /// any other stop is a clean interruption returning `partial`.
    pub(crate) fn stopped<T>(&self, op: &'static str, partial: T) -> Result<T, EngineError> {
        if self.monitor.is_interrupted() {
            self.drain_notifications();
            log::error!("[{}] {op}: device invalidated by a topology change", self.id);
            return Err(EngineError::DeviceInvalidated { op });
        }
        log::trace!("[{}] {op} interrupted by stop request", self.id);
        Ok(partial)
    }

    /// Start the device stream.
    ///
    /// Clears a previous clean stop request; a monitor interruption is
    /// permanent for the session.
    pub fn start(&mut self) -> Result<(), EngineError> {
        const OP: &str = "start";
        self.drain_notifications();
        let id = self.id;
        self.resources(OP)?.signals.reset_stop();
        // checked after the reset: an interruption that landed before it
        // must leave stop-requested raised
        if self.monitor.is_interrupted() {
            self.resources(OP)?.signals.raise_stop();
            self.drain_notifications();
            log::error!("[{id}] {OP}: device was invalidated");
            return Err(EngineError::DeviceInvalidated { op: OP });
        }
        let resources = self.resources_mut(OP)?;
        resources
            .client
            .start()
            .map_err(|status| EngineError::from_status(OP, status))?;
        self.state = SessionState::Running;
        log::debug!("[{id}] started");
        Ok(())
    }

    /// Raise stop-requested, then stop the device stream.
    pub(crate) fn halt(&mut self) -> Result<(), EngineError> {
        const OP: &str = "stop";
        self.drain_notifications();
        let resources = self.resources_mut(OP)?;
        resources.signals.raise_stop();
        let stopped = resources.client.stop();
        self.state = SessionState::Stopped;
        stopped.map_err(|status| self.io_error(OP, status))
    }

    /// Hardware buffer size in frames, as reported by the device.
    pub fn buffer_size(&self) -> Result<u32, EngineError> {
        self.resources("buffer size")?;
        Ok(self.buffer_frames)
    }

    /// Monotonic stream position in frames.
    pub fn frame_position(&self) -> Result<u64, EngineError> {
        const OP: &str = "frame position";
        self.resources(OP)?
            .clock
            .position()
            .map_err(|status| self.io_error(OP, status))
    }

    /// Stream latency in microseconds.
    ///
    /// Falls back to the buffer duration when the platform reports zero.
    pub fn microsecond_latency(&self) -> Result<u64, EngineError> {
        const OP: &str = "stream latency";
        let latency = self
            .resources(OP)?
            .client
            .stream_latency()
            .map_err(|status| self.io_error(OP, status))?;
        if latency > Duration::ZERO {
            return Ok(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
        }
        Ok(u64::from(self.buffer_frames) * 1_000_000 / u64::from(self.format.sample_rate))
    }

    /// Re-derive the port descriptor from the live device.
    pub fn current_port(&self) -> Result<Port, EngineError> {
        const OP: &str = "describe current port";
        let resources = self.resources(OP)?;
        port_from_device(resources.device.as_ref()).map_err(|status| self.io_error(OP, status))
    }

    /// The port this session was opened on.
    pub fn port(&self) -> &Port {
        &self.port
    }

    /// Release every resource. Calling it again is a no-op.
    pub fn close(&mut self) {
        let Some(mut resources) = self.resources.take() else {
            return;
        };
        if self.state.is_running() {
            resources.signals.raise_stop();
            if let Err(status) = resources.client.stop() {
                log::warn!("[{}] failed to stop stream during close: {status}", self.id);
            }
        }
        self.monitor.unsubscribe();
        drop(resources);
        self.state = SessionState::Closed;
        self.drain_notifications();
        log::info!("[{}] closed {} stream", self.id, self.flow);
    }
}

impl<S> Drop for SessionContext<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert a frame count to the signed `available()` result; overflow is `-1`.
pub(crate) fn frames_to_available(frames: u64) -> i32 {
    i32::try_from(frames).unwrap_or(-1)
}

/// Clamp `offset..offset + length` to `len`.
pub(crate) fn clamp_range(len: usize, offset: usize, length: usize) -> std::ops::Range<usize> {
    let start = offset.min(len);
    let end = start.saturating_add(length).min(len);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_range_stays_in_bounds() {
        assert_eq!(clamp_range(10, 2, 4), 2..6);
        assert_eq!(clamp_range(10, 8, 4), 8..10);
        assert_eq!(clamp_range(10, 12, 4), 10..10);
        assert_eq!(clamp_range(10, 0, usize::MAX), 0..10);
    }

    #[test]
    fn available_overflow_is_negative() {
        assert_eq!(frames_to_available(480), 480);
        assert_eq!(frames_to_available(u64::from(u32::MAX)), -1);
    }
}
