use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::status::StatusCode;
use crate::traits::signals::{EventSignals, WaitOutcome};

#[derive(Debug, Default)]
struct SignalState {
    buffer_ready: bool,
    stop: bool,
}

/// Portable [`EventSignals`] built on `parking_lot::{Mutex, Condvar}`.
///
/// Used by backends without native waitable events (and by the simulated
/// backend). Stop is manual-reset, buffer-ready is auto-reset.
#[derive(Debug, Default)]
pub struct ConditionSignals {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl ConditionSignals {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSignals for ConditionSignals {
    fn raise_buffer_ready(&self) {
        self.state.lock().buffer_ready = true;
        self.condvar.notify_all();
    }

    fn raise_stop(&self) {
        self.state.lock().stop = true;
        self.condvar.notify_all();
    }

    fn reset_stop(&self) {
        self.state.lock().stop = false;
    }

    fn is_stop_raised(&self) -> bool {
        self.state.lock().stop
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, StatusCode> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if state.stop {
                return Ok(WaitOutcome::StopRequested);
            }
            if state.buffer_ready {
                state.buffer_ready = false;
                return Ok(WaitOutcome::BufferReady);
            }
            match deadline {
                None => self.condvar.wait(&mut state),
                Some(deadline) => {
                    if self.condvar.wait_until(&mut state, deadline).timed_out() {
                        if state.stop {
                            return Ok(WaitOutcome::StopRequested);
                        }
                        if state.buffer_ready {
                            state.buffer_ready = false;
                            return Ok(WaitOutcome::BufferReady);
                        }
                        return Ok(WaitOutcome::TimedOut);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn times_out_without_signal() {
        let signals = ConditionSignals::new();
        let outcome = signals.wait(Some(Duration::from_millis(5))).unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn buffer_ready_is_auto_reset() {
        let signals = ConditionSignals::new();
        signals.raise_buffer_ready();
        assert_eq!(signals.wait(None).unwrap(), WaitOutcome::BufferReady);
        assert_eq!(
            signals.wait(Some(Duration::from_millis(5))).unwrap(),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn stop_is_level_triggered() {
        let signals = ConditionSignals::new();
        signals.raise_stop();
        assert!(signals.is_stop_raised());
        assert_eq!(signals.wait(None).unwrap(), WaitOutcome::StopRequested);
        // a late waiter still observes it immediately
        assert_eq!(signals.wait(None).unwrap(), WaitOutcome::StopRequested);

        signals.reset_stop();
        assert!(!signals.is_stop_raised());
    }

    #[test]
    fn stop_wins_over_buffer_ready() {
        let signals = ConditionSignals::new();
        signals.raise_buffer_ready();
        signals.raise_stop();
        assert_eq!(signals.wait(None).unwrap(), WaitOutcome::StopRequested);
    }

    #[test]
    fn stop_from_another_thread_wakes_waiter() {
        let signals = Arc::new(ConditionSignals::new());
        let raiser = Arc::clone(&signals);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            raiser.raise_stop();
        });
        assert_eq!(signals.wait(None).unwrap(), WaitOutcome::StopRequested);
        handle.join().unwrap();
    }
}
