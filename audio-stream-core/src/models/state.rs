/// Stream session state machine.
///
/// State transitions:
/// ```text
/// open → running ⇄ stopped
///   ↓       ↓         ↓
///   └──── closed ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Resources acquired, device stream not started.
    Open,
    Running,
    Stopped,
    /// Terminal; every resource has been released.
    Closed,
}

impl SessionState {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Device change monitor state machine.
///
/// ```text
/// subscribed → interrupted
///      ↓            ↓
///      └─ unsubscribed ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    Subscribed = 0,
    /// A topology change raised the session's stop signal.
    Interrupted = 1,
    /// Terminal; no further callbacks are acted on.
    Unsubscribed = 2,
}

impl MonitorState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Subscribed,
            1 => Self::Interrupted,
            _ => Self::Unsubscribed,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_predicates() {
        assert!(SessionState::Open.is_open());
        assert!(SessionState::Running.is_running());
        assert!(SessionState::Stopped.is_open());
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Closed.is_open());
    }

    #[test]
    fn monitor_state_round_trips_through_u8() {
        for state in [MonitorState::Subscribed, MonitorState::Interrupted, MonitorState::Unsubscribed] {
            assert_eq!(MonitorState::from_u8(state as u8), state);
        }
    }
}
