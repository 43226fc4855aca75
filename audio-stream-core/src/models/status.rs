use std::fmt;

use serde::{Deserialize, Serialize};

/// A raw 32-bit platform status code (an `HRESULT` on Windows).
///
/// Backends hand these to the core unchanged; the core decides at each call
/// site whether a status means "device invalidated" or a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: Self = Self(0);
    pub const FALSE: Self = Self(1);
    pub const E_NOTIMPL: Self = Self(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: Self = Self(0x8000_4002_u32 as i32);
    pub const E_POINTER: Self = Self(0x8000_4003_u32 as i32);
    pub const E_ABORT: Self = Self(0x8000_4004_u32 as i32);
    pub const E_FAIL: Self = Self(0x8000_4005_u32 as i32);
    pub const E_UNEXPECTED: Self = Self(0x8000_FFFF_u32 as i32);
    pub const E_ACCESSDENIED: Self = Self(0x8007_0005_u32 as i32);
    pub const E_HANDLE: Self = Self(0x8007_0006_u32 as i32);
    pub const E_OUTOFMEMORY: Self = Self(0x8007_000E_u32 as i32);
    pub const E_INVALIDARG: Self = Self(0x8007_0057_u32 as i32);
    pub const E_NOTFOUND: Self = Self(0x8007_0490_u32 as i32);

    pub const AUDCLNT_E_NOT_INITIALIZED: Self = Self::audclnt(0x001);
    pub const AUDCLNT_E_ALREADY_INITIALIZED: Self = Self::audclnt(0x002);
    pub const AUDCLNT_E_WRONG_ENDPOINT_TYPE: Self = Self::audclnt(0x003);
    pub const AUDCLNT_E_DEVICE_INVALIDATED: Self = Self::audclnt(0x004);
    pub const AUDCLNT_E_NOT_STOPPED: Self = Self::audclnt(0x005);
    pub const AUDCLNT_E_BUFFER_TOO_LARGE: Self = Self::audclnt(0x006);
    pub const AUDCLNT_E_OUT_OF_ORDER: Self = Self::audclnt(0x007);
    pub const AUDCLNT_E_UNSUPPORTED_FORMAT: Self = Self::audclnt(0x008);
    pub const AUDCLNT_E_INVALID_SIZE: Self = Self::audclnt(0x009);
    pub const AUDCLNT_E_DEVICE_IN_USE: Self = Self::audclnt(0x00A);
    pub const AUDCLNT_E_BUFFER_OPERATION_PENDING: Self = Self::audclnt(0x00B);
    pub const AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED: Self = Self::audclnt(0x00E);
    pub const AUDCLNT_E_ENDPOINT_CREATE_FAILED: Self = Self::audclnt(0x00F);
    pub const AUDCLNT_E_SERVICE_NOT_RUNNING: Self = Self::audclnt(0x010);
    pub const AUDCLNT_E_EVENTHANDLE_NOT_EXPECTED: Self = Self::audclnt(0x011);
    pub const AUDCLNT_E_EXCLUSIVE_MODE_ONLY: Self = Self::audclnt(0x012);
    pub const AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL: Self = Self::audclnt(0x013);
    pub const AUDCLNT_E_EVENTHANDLE_NOT_SET: Self = Self::audclnt(0x014);
    pub const AUDCLNT_E_BUFFER_SIZE_ERROR: Self = Self::audclnt(0x016);
    pub const AUDCLNT_E_BUFFER_ERROR: Self = Self::audclnt(0x018);
    pub const AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED: Self = Self::audclnt(0x019);
    pub const AUDCLNT_E_INVALID_DEVICE_PERIOD: Self = Self::audclnt(0x020);
    pub const AUDCLNT_E_RESOURCES_INVALIDATED: Self = Self::audclnt(0x026);
    pub const AUDCLNT_S_BUFFER_EMPTY: Self = Self(0x0889_0001);

    const fn audclnt(code: u32) -> Self {
        Self((0x8889_0000_u32 | code) as i32)
    }

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Whether the status means the endpoint went away underneath an open stream.
    pub fn is_device_invalidated(self) -> bool {
        self == Self::AUDCLNT_E_DEVICE_INVALIDATED || self == Self::AUDCLNT_E_RESOURCES_INVALIDATED
    }

    /// Symbolic name of a well-known status, if any.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::OK => "S_OK",
            Self::FALSE => "S_FALSE",
            Self::E_NOTIMPL => "E_NOTIMPL",
            Self::E_NOINTERFACE => "E_NOINTERFACE",
            Self::E_POINTER => "E_POINTER",
            Self::E_ABORT => "E_ABORT",
            Self::E_FAIL => "E_FAIL",
            Self::E_UNEXPECTED => "E_UNEXPECTED",
            Self::E_ACCESSDENIED => "E_ACCESSDENIED",
            Self::E_HANDLE => "E_HANDLE",
            Self::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Self::E_INVALIDARG => "E_INVALIDARG",
            Self::E_NOTFOUND => "E_NOTFOUND",
            Self::AUDCLNT_E_NOT_INITIALIZED => "AUDCLNT_E_NOT_INITIALIZED",
            Self::AUDCLNT_E_ALREADY_INITIALIZED => "AUDCLNT_E_ALREADY_INITIALIZED",
            Self::AUDCLNT_E_WRONG_ENDPOINT_TYPE => "AUDCLNT_E_WRONG_ENDPOINT_TYPE",
            Self::AUDCLNT_E_DEVICE_INVALIDATED => "AUDCLNT_E_DEVICE_INVALIDATED",
            Self::AUDCLNT_E_NOT_STOPPED => "AUDCLNT_E_NOT_STOPPED",
            Self::AUDCLNT_E_BUFFER_TOO_LARGE => "AUDCLNT_E_BUFFER_TOO_LARGE",
            Self::AUDCLNT_E_OUT_OF_ORDER => "AUDCLNT_E_OUT_OF_ORDER",
            Self::AUDCLNT_E_UNSUPPORTED_FORMAT => "AUDCLNT_E_UNSUPPORTED_FORMAT",
            Self::AUDCLNT_E_INVALID_SIZE => "AUDCLNT_E_INVALID_SIZE",
            Self::AUDCLNT_E_DEVICE_IN_USE => "AUDCLNT_E_DEVICE_IN_USE",
            Self::AUDCLNT_E_BUFFER_OPERATION_PENDING => "AUDCLNT_E_BUFFER_OPERATION_PENDING",
            Self::AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED => "AUDCLNT_E_EXCLUSIVE_MODE_NOT_ALLOWED",
            Self::AUDCLNT_E_ENDPOINT_CREATE_FAILED => "AUDCLNT_E_ENDPOINT_CREATE_FAILED",
            Self::AUDCLNT_E_SERVICE_NOT_RUNNING => "AUDCLNT_E_SERVICE_NOT_RUNNING",
            Self::AUDCLNT_E_EVENTHANDLE_NOT_EXPECTED => "AUDCLNT_E_EVENTHANDLE_NOT_EXPECTED",
            Self::AUDCLNT_E_EXCLUSIVE_MODE_ONLY => "AUDCLNT_E_EXCLUSIVE_MODE_ONLY",
            Self::AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL => "AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL",
            Self::AUDCLNT_E_EVENTHANDLE_NOT_SET => "AUDCLNT_E_EVENTHANDLE_NOT_SET",
            Self::AUDCLNT_E_BUFFER_SIZE_ERROR => "AUDCLNT_E_BUFFER_SIZE_ERROR",
            Self::AUDCLNT_E_BUFFER_ERROR => "AUDCLNT_E_BUFFER_ERROR",
            Self::AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED => "AUDCLNT_E_BUFFER_SIZE_NOT_ALIGNED",
            Self::AUDCLNT_E_INVALID_DEVICE_PERIOD => "AUDCLNT_E_INVALID_DEVICE_PERIOD",
            Self::AUDCLNT_E_RESOURCES_INVALIDATED => "AUDCLNT_E_RESOURCES_INVALIDATED",
            Self::AUDCLNT_S_BUFFER_EMPTY => "AUDCLNT_S_BUFFER_EMPTY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0 as u32),
            None => write!(f, "UNKNOWN (0x{:08X})", self.0 as u32),
        }
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audclnt_codes_match_facility_layout() {
        assert_eq!(StatusCode::AUDCLNT_E_DEVICE_INVALIDATED.0 as u32, 0x8889_0004);
        assert_eq!(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT.0 as u32, 0x8889_0008);
    }

    #[test]
    fn display_renders_name_and_hex() {
        assert_eq!(
            StatusCode::AUDCLNT_E_DEVICE_INVALIDATED.to_string(),
            "AUDCLNT_E_DEVICE_INVALIDATED (0x88890004)"
        );
        assert_eq!(StatusCode(0x1234).to_string(), "UNKNOWN (0x00001234)");
    }

    #[test]
    fn success_and_failure() {
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::AUDCLNT_S_BUFFER_EMPTY.is_success());
        assert!(StatusCode::E_FAIL.is_failure());
    }

    #[test]
    fn invalidation_statuses() {
        assert!(StatusCode::AUDCLNT_E_DEVICE_INVALIDATED.is_device_invalidated());
        assert!(StatusCode::AUDCLNT_E_RESOURCES_INVALIDATED.is_device_invalidated());
        assert!(!StatusCode::E_FAIL.is_device_invalidated());
    }
}
