use thiserror::Error;

use super::status::StatusCode;

/// Errors raised by the streaming engine.
///
/// Every variant names the operation that failed; backend failures carry the
/// platform status so it can be rendered as `NAME (0xXXXXXXXX)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{op}: unsupported audio format: {reason}")]
    UnsupportedFormat { op: &'static str, reason: String },

    #[error("{op}: unsupported audio encoding: {reason}")]
    UnsupportedEncoding { op: &'static str, reason: String },

    #[error("{op}: audio device is not active")]
    DeviceInactive { op: &'static str },

    #[error("{op}: audio device invalidated")]
    DeviceInvalidated { op: &'static str },

    #[error("{op} failed: {status}")]
    Backend { op: &'static str, status: StatusCode },

    #[error("{op}: resource exhausted: {reason}")]
    ResourceExhausted { op: &'static str, reason: String },

    #[error("{op}: session is closed")]
    SessionClosed { op: &'static str },

    #[error("{op}: invalid configuration: {reason}")]
    InvalidConfiguration { op: &'static str, reason: String },
}

impl EngineError {
    /// Classify a platform status returned while a session is open.
    ///
    /// Invalidation statuses become `DeviceInvalidated`; everything else is a
    /// generic `Backend` failure.
    pub fn from_status(op: &'static str, status: StatusCode) -> Self {
        if status.is_device_invalidated() {
            Self::DeviceInvalidated { op }
        } else {
            Self::Backend { op, status }
        }
    }

    /// Wrap a status as a plain backend failure, without invalidation checks.
    pub fn backend(op: &'static str, status: StatusCode) -> Self {
        Self::Backend { op, status }
    }

    /// The operation that raised this error.
    pub fn op(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { op, .. }
            | Self::UnsupportedEncoding { op, .. }
            | Self::DeviceInactive { op }
            | Self::DeviceInvalidated { op }
            | Self::Backend { op, .. }
            | Self::ResourceExhausted { op, .. }
            | Self::SessionClosed { op }
            | Self::InvalidConfiguration { op, .. } => op,
        }
    }

    /// Re-attribute a format or configuration error to the calling operation.
    pub fn during(self, op: &'static str) -> Self {
        match self {
            Self::UnsupportedFormat { reason, .. } => Self::UnsupportedFormat { op, reason },
            Self::UnsupportedEncoding { reason, .. } => Self::UnsupportedEncoding { op, reason },
            Self::InvalidConfiguration { reason, .. } => Self::InvalidConfiguration { op, reason },
            other => other,
        }
    }

    /// The platform status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the session that raised this error must be closed and reopened.
    pub fn is_terminal_for_session(&self) -> bool {
        matches!(self, Self::DeviceInvalidated { .. } | Self::SessionClosed { .. })
    }
}
