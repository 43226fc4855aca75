use std::fmt;

use serde::{Deserialize, Serialize};

use super::audio_format::AudioFormat;

/// Placeholder for descriptive fields the platform cannot supply.
pub const UNKNOWN_PROPERTY: &str = "Unknown";

/// Direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Render endpoint (speakers, headphones).
    Out,
    /// Capture endpoint (microphones, line in).
    In,
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Out => "render",
            Self::In => "capture",
        })
    }
}

/// Device role used by default-endpoint notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Console,
    Multimedia,
    Communications,
}

/// Platform device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Active,
    Disabled,
    NotPresent,
    Unplugged,
}

impl DeviceState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// The device has physically gone away.
    pub fn is_gone(self) -> bool {
        matches!(self, Self::NotPresent | Self::Unplugged)
    }
}

/// Stable identifier of a physical endpoint (the platform device id string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortHandle(pub String);

impl PortHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PortHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Human-readable device metadata read from the platform property store.
///
/// `None` means the platform could not supply the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Descriptor of a physical audio endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub handle: PortHandle,
    pub flow: Flow,
    /// Device state at enumeration time.
    pub is_active: bool,
    /// Preferred device format; `None` when the device is inactive.
    pub mix_format: Option<AudioFormat>,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub description: String,
}

impl Port {
    /// Build a descriptor, substituting [`UNKNOWN_PROPERTY`] for missing metadata.
    pub fn new(
        handle: PortHandle,
        flow: Flow,
        is_active: bool,
        mix_format: Option<AudioFormat>,
        properties: DeviceProperties,
    ) -> Self {
        let or_unknown = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_PROPERTY.to_string())
        };
        Self {
            handle,
            flow,
            is_active,
            mix_format,
            name: or_unknown(properties.name),
            vendor: or_unknown(properties.vendor),
            version: or_unknown(properties.version),
            description: or_unknown(properties.description),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.name, self.flow, self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_properties_default_to_unknown() {
        let port = Port::new(
            PortHandle::from("{0.0.0.00000000}.{abc}"),
            Flow::Out,
            true,
            Some(AudioFormat::float(48000, 2)),
            DeviceProperties {
                name: Some("Speakers".into()),
                vendor: None,
                version: None,
                description: Some("   ".into()),
            },
        );
        assert_eq!(port.name, "Speakers");
        assert_eq!(port.vendor, UNKNOWN_PROPERTY);
        assert_eq!(port.version, UNKNOWN_PROPERTY);
        assert_eq!(port.description, UNKNOWN_PROPERTY);
    }

    #[test]
    fn device_state_predicates() {
        assert!(DeviceState::Active.is_active());
        assert!(DeviceState::Unplugged.is_gone());
        assert!(DeviceState::NotPresent.is_gone());
        assert!(!DeviceState::Disabled.is_gone());
    }

    #[test]
    fn port_serializes_handle_as_plain_string() {
        let port = Port::new(PortHandle::from("dev-1"), Flow::In, false, None, DeviceProperties::default());
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["handle"], "dev-1");
        assert_eq!(json["flow"], "in");
        assert!(json["mix_format"].is_null());
    }
}
