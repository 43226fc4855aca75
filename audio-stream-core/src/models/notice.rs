use chrono::{DateTime, Utc};

/// A topology notification recorded by the notification thread.
///
/// Notices are queued and emitted later by the session's owner thread, so the
/// platform callback never re-enters the logging boundary itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNotice {
    pub received_at: DateTime<Utc>,
    pub message: String,
}

impl DeviceNotice {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            received_at: Utc::now(),
            message: message.into(),
        }
    }
}
