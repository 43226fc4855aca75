//! Endpoint enumeration.
//!
//! Every call performs a fresh enumeration; nothing is cached between calls.

use crate::models::error::EngineError;
use crate::models::port::{Flow, Port, PortHandle};
use crate::models::status::StatusCode;
use crate::traits::backend::{AudioBackend, Device, DeviceEnumerator};

/// Lists physical endpoints as [`Port`] descriptors.
pub struct PortCatalog {
    enumerator: Box<dyn DeviceEnumerator>,
}

impl PortCatalog {
    /// Create the catalog's enumerator. Failure leaves the catalog unusable.
    pub fn new(backend: &dyn AudioBackend) -> Result<Self, EngineError> {
        let enumerator = backend
            .create_enumerator()
            .map_err(|status| EngineError::backend("create device enumerator", status))?;
        log::debug!("port catalog ready on {} backend", backend.name());
        Ok(Self { enumerator })
    }

    /// Active endpoints: outputs first, then inputs, each in platform order.
    ///
    /// Endpoints whose metadata cannot be read are skipped.
    pub fn list_ports(&self) -> Result<Vec<Port>, EngineError> {
        let mut ports = Vec::new();
        for flow in [Flow::Out, Flow::In] {
            let devices = self
                .enumerator
                .endpoints(flow)
                .map_err(|status| EngineError::backend("enumerate endpoints", status))?;
            ports
                .try_reserve(devices.len())
                .map_err(|e| EngineError::ResourceExhausted {
                    op: "list ports",
                    reason: e.to_string(),
                })?;

            for device in devices {
                match port_from_device(device.as_ref()) {
                    Ok(port) => ports.push(port),
                    Err(status) => log::warn!("skipping {flow} endpoint: {status}"),
                }
            }
        }
        log::debug!("enumerated {} ports", ports.len());
        Ok(ports)
    }

    /// The platform default endpoint for `flow`, or `None` when there is none.
    pub fn default_port(&self, flow: Flow) -> Result<Option<Port>, EngineError> {
        let device = match self.enumerator.default_endpoint(flow) {
            Ok(Some(device)) => device,
            Ok(None) => return Ok(None),
            Err(status) if status == StatusCode::E_NOTFOUND => return Ok(None),
            Err(status) => return Err(EngineError::backend("get default endpoint", status)),
        };
        port_from_device(device.as_ref())
            .map(Some)
            .map_err(|status| EngineError::backend("describe default endpoint", status))
    }

    /// Resolve a port to a live device handle.
    pub fn resolve(&self, handle: &PortHandle) -> Result<Box<dyn Device>, EngineError> {
        self.enumerator
            .device(handle.as_str())
            .map_err(|status| EngineError::backend("resolve port", status))
    }
}

/// Build a [`Port`] from a live device.
///
/// The mix format is only read from active devices; a failure to read it is
/// logged and leaves the field empty.
pub fn port_from_device(device: &dyn Device) -> Result<Port, StatusCode> {
    let id = device.id()?;
    let flow = device.flow()?;
    let state = device.state()?;
    let properties = device.properties()?;

    let mix_format = if state.is_active() {
        match device.mix_format() {
            Ok(format) => Some(format),
            Err(status) => {
                log::warn!("no mix format for {id}: {status}");
                None
            }
        }
    } else {
        None
    };

    Ok(Port::new(PortHandle(id), flow, state.is_active(), mix_format, properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{EndpointConfig, SimulatedBackend};
    use crate::models::audio_format::AudioFormat;
    use crate::models::port::{DeviceProperties, DeviceState, UNKNOWN_PROPERTY};

    fn backend() -> SimulatedBackend {
        let backend = SimulatedBackend::new();
        backend.add_endpoint(
            EndpointConfig::capture("{mic}", AudioFormat::pcm(44100, 16, 1)).with_properties(DeviceProperties {
                name: Some("Microphone".into()),
                vendor: Some("Acme".into()),
                version: None,
                description: Some("USB Microphone".into()),
            }),
        );
        backend.add_endpoint(EndpointConfig::render("{speakers}", AudioFormat::float(48000, 2)));
        backend.add_endpoint(EndpointConfig::render("{headset}", AudioFormat::float(48000, 2)));
        backend
    }

    #[test]
    fn outputs_come_before_inputs() {
        let backend = backend();
        let catalog = PortCatalog::new(&backend).unwrap();
        let ports = catalog.list_ports().unwrap();

        let ids: Vec<&str> = ports.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(ids, vec!["{speakers}", "{headset}", "{mic}"]);
        assert_eq!(ports[2].flow, Flow::In);
        assert_eq!(ports[2].mix_format, Some(AudioFormat::pcm(44100, 16, 1)));
    }

    #[test]
    fn missing_metadata_defaults_to_unknown() {
        let backend = backend();
        let catalog = PortCatalog::new(&backend).unwrap();
        let mic = catalog
            .list_ports()
            .unwrap()
            .into_iter()
            .find(|p| p.flow == Flow::In)
            .unwrap();

        assert_eq!(mic.name, "Microphone");
        assert_eq!(mic.version, UNKNOWN_PROPERTY);
    }

    #[test]
    fn unreadable_property_store_skips_entry() {
        let backend = backend();
        backend.endpoint("{headset}").unwrap().fail_property_store(true);
        let catalog = PortCatalog::new(&backend).unwrap();

        let ids: Vec<String> = catalog.list_ports().unwrap().into_iter().map(|p| p.handle.0).collect();
        assert_eq!(ids, vec!["{speakers}".to_string(), "{mic}".to_string()]);
    }

    #[test]
    fn inactive_endpoints_are_not_listed() {
        let backend = backend();
        backend.set_device_state("{speakers}", DeviceState::Disabled);
        let catalog = PortCatalog::new(&backend).unwrap();

        assert_eq!(catalog.list_ports().unwrap().len(), 2);
    }

    #[test]
    fn endpoints_added_unplugged_are_skipped_until_active() {
        let backend = backend();
        backend.add_endpoint(
            EndpointConfig::render("{hdmi}", AudioFormat::pcm(48000, 16, 2)).with_state(DeviceState::Unplugged),
        );
        backend.set_default(Flow::Out, "{hdmi}");
        let catalog = PortCatalog::new(&backend).unwrap();

        assert_eq!(catalog.list_ports().unwrap().len(), 3);
        assert!(catalog.default_port(Flow::Out).unwrap().is_none());

        backend.set_device_state("{hdmi}", DeviceState::Active);
        assert_eq!(catalog.list_ports().unwrap().len(), 4);
        assert_eq!(catalog.default_port(Flow::Out).unwrap().unwrap().handle.as_str(), "{hdmi}");
    }

    #[test]
    fn enumeration_is_fresh_each_call() {
        let backend = backend();
        let catalog = PortCatalog::new(&backend).unwrap();
        assert_eq!(catalog.list_ports().unwrap().len(), 3);

        backend.add_endpoint(EndpointConfig::capture("{line-in}", AudioFormat::pcm(48000, 24, 2)));
        assert_eq!(catalog.list_ports().unwrap().len(), 4);
    }

    #[test]
    fn default_port_per_flow() {
        let backend = backend();
        backend.set_default(Flow::Out, "{headset}");
        let catalog = PortCatalog::new(&backend).unwrap();

        let port = catalog.default_port(Flow::Out).unwrap().unwrap();
        assert_eq!(port.handle.as_str(), "{headset}");
        assert!(port.is_active);
        assert!(catalog.default_port(Flow::In).unwrap().is_none());
    }

    #[test]
    fn enumerator_failure_is_a_backend_error() {
        let backend = backend();
        backend.fail_enumerator(Some(StatusCode::E_ACCESSDENIED));

        let err = PortCatalog::new(&backend).err().unwrap();
        assert_eq!(err.status(), Some(StatusCode::E_ACCESSDENIED));
    }
}
