use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::models::notice::DeviceNotice;
use crate::models::port::{DeviceRole, DeviceState, Flow};
use crate::models::state::MonitorState;
use crate::traits::notification::{DeviceNotificationListener, DeviceProperty};
use crate::traits::signals::EventSignals;

/// Topology notices recorded on the notification thread, drained by the
/// session's owner thread.
///
/// Guarded by its own lock; nothing else in a session shares it.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    notices: Mutex<VecDeque<DeviceNotice>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: impl Into<String>) {
        self.notices.lock().push_back(DeviceNotice::now(message));
    }

    /// Take every queued notice, oldest first.
    pub fn drain(&self) -> Vec<DeviceNotice> {
        self.notices.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().is_empty()
    }
}

/// Topology listener bound to one session.
///
/// Holds a non-owning reference to the session's signals: once the session
/// is gone, an interruption has nothing left to wake.
pub struct DeviceChangeMonitor {
    flow: Flow,
    device_id: String,
    signals: Weak<dyn EventSignals>,
    queue: Arc<NotificationQueue>,
    state: AtomicU8,
}

impl DeviceChangeMonitor {
    pub fn new(
        flow: Flow,
        device_id: impl Into<String>,
        signals: &Arc<dyn EventSignals>,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            flow,
            device_id: device_id.into(),
            signals: Arc::downgrade(signals),
            queue,
            state: AtomicU8::new(MonitorState::Subscribed as u8),
        }
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_interrupted(&self) -> bool {
        self.state().is_interrupted()
    }

    /// Raise the session's stop signal and move to `Interrupted`.
    ///
    /// Only the first interruption raises the signal; an unsubscribed monitor
    /// ignores the call.
    pub fn interrupt(&self, reason: &str) {
        let transitioned = self
            .state
            .compare_exchange(
                MonitorState::Subscribed as u8,
                MonitorState::Interrupted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return;
        }
        self.queue.push(format!("stream on {} interrupted: {reason}", self.device_id));
        if let Some(signals) = self.signals.upgrade() {
            signals.raise_stop();
        }
    }

    /// Move to the terminal state. Returns `false` if already unsubscribed.
    pub fn unsubscribe(&self) -> bool {
        self.state.swap(MonitorState::Unsubscribed as u8, Ordering::AcqRel)
            != MonitorState::Unsubscribed as u8
    }

    fn is_listening(&self) -> bool {
        self.state() != MonitorState::Unsubscribed
    }

    fn note(&self, message: String) {
        if self.is_listening() {
            self.queue.push(message);
        }
    }
}

impl DeviceNotificationListener for DeviceChangeMonitor {
    fn on_device_state_changed(&self, device_id: &str, state: DeviceState) {
        self.note(format!("device {device_id} changed state to {state:?}"));
        if state.is_gone() {
            self.interrupt("device state changed");
        }
    }

    fn on_device_added(&self, device_id: &str) {
        self.note(format!("device {device_id} added"));
    }

    fn on_device_removed(&self, device_id: &str) {
        self.note(format!("device {device_id} removed"));
        self.interrupt("device removed");
    }

    fn on_default_device_changed(&self, flow: Flow, role: DeviceRole, device_id: Option<&str>) {
        self.note(format!(
            "default {flow} device for {role:?} changed to {}",
            device_id.unwrap_or("none")
        ));
        if flow == self.flow {
            self.interrupt("default device changed");
        }
    }

    fn on_property_value_changed(&self, device_id: &str, property: DeviceProperty) {
        match property {
            DeviceProperty::DeviceFormat | DeviceProperty::InterfaceEnabled => {
                self.note(format!("device {device_id} property {property:?} changed"));
                self.interrupt("device property changed");
            }
            DeviceProperty::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::signals::ConditionSignals;

    fn monitor(flow: Flow) -> (DeviceChangeMonitor, Arc<dyn EventSignals>, Arc<NotificationQueue>) {
        let signals: Arc<dyn EventSignals> = Arc::new(ConditionSignals::new());
        let queue = Arc::new(NotificationQueue::new());
        let monitor = DeviceChangeMonitor::new(flow, "{render-1}", &signals, Arc::clone(&queue));
        (monitor, signals, queue)
    }

    #[test]
    fn removal_raises_stop_and_interrupts() {
        let (monitor, signals, queue) = monitor(Flow::Out);
        monitor.on_device_removed("{render-1}");

        assert_eq!(monitor.state(), MonitorState::Interrupted);
        assert!(signals.is_stop_raised());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn unplug_of_any_device_interrupts() {
        let (monitor, signals, _) = monitor(Flow::Out);
        monitor.on_device_state_changed("{other}", DeviceState::Disabled);
        assert!(!signals.is_stop_raised());

        monitor.on_device_state_changed("{other}", DeviceState::Unplugged);
        assert!(signals.is_stop_raised());
    }

    #[test]
    fn default_change_only_for_own_flow() {
        let (monitor, signals, queue) = monitor(Flow::In);
        monitor.on_default_device_changed(Flow::Out, DeviceRole::Console, Some("{render-2}"));
        assert_eq!(monitor.state(), MonitorState::Subscribed);
        assert!(!signals.is_stop_raised());
        assert_eq!(queue.len(), 1);

        monitor.on_default_device_changed(Flow::In, DeviceRole::Communications, None);
        assert!(monitor.is_interrupted());
    }

    #[test]
    fn only_format_and_enablement_properties_interrupt() {
        let (monitor, signals, _) = monitor(Flow::Out);
        monitor.on_property_value_changed("{render-1}", DeviceProperty::Other);
        assert!(!signals.is_stop_raised());

        monitor.on_property_value_changed("{render-1}", DeviceProperty::DeviceFormat);
        assert!(signals.is_stop_raised());
    }

    #[test]
    fn unsubscribed_monitor_ignores_callbacks() {
        let (monitor, signals, queue) = monitor(Flow::Out);
        assert!(monitor.unsubscribe());
        assert!(!monitor.unsubscribe());

        monitor.on_device_removed("{render-1}");
        assert_eq!(monitor.state(), MonitorState::Unsubscribed);
        assert!(!signals.is_stop_raised());
        assert!(queue.is_empty());
    }

    #[test]
    fn interrupt_after_session_dropped_is_harmless() {
        let (monitor, signals, _) = monitor(Flow::Out);
        drop(signals);
        monitor.interrupt("late callback");
        assert!(monitor.is_interrupted());
    }

    #[test]
    fn queue_drains_in_order() {
        let queue = NotificationQueue::new();
        queue.push("first");
        queue.push("second");
        let drained: Vec<String> = queue.drain().into_iter().map(|n| n.message).collect();
        assert_eq!(drained, vec!["first", "second"]);
        assert!(queue.is_empty());
    }
}
