use std::time::Duration;

use crate::models::status::StatusCode;

/// Which signal ended a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    BufferReady,
    StopRequested,
    TimedOut,
}

/// The per-session pair of wait signals: buffer-ready and stop-requested.
///
/// Stop-requested is level-triggered: once raised it stays raised until
/// [`EventSignals::reset_stop`], so a waiter that arrives late still sees it.
/// Buffer-ready is consumed by the wait that observes it. When both are
/// raised, a wait reports [`WaitOutcome::StopRequested`].
pub trait EventSignals: Send + Sync {
    fn raise_buffer_ready(&self);

    fn raise_stop(&self);

    fn reset_stop(&self);

    fn is_stop_raised(&self) -> bool;

    /// Block until a signal is raised or `timeout` elapses (`None` waits forever).
    fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, StatusCode>;
}
