//! The explicit registry every engine operation goes through.

use std::sync::Arc;

use crate::catalog::format_negotiator::{FormatNegotiator, FormatQuery};
use crate::catalog::port_catalog::PortCatalog;
use crate::models::audio_format::AudioFormat;
use crate::models::config::{StreamConfiguration, TimingMode};
use crate::models::error::EngineError;
use crate::models::port::{Flow, Port};
use crate::session::input::InputSession;
use crate::session::output::OutputSession;
use crate::traits::backend::AudioBackend;

/// Owns the backend and the port catalog for the lifetime of the engine.
///
/// Sessions opened through the engine hold their own platform resources and
/// stay usable after [`AudioEngine::shutdown`].
pub struct AudioEngine {
    backend: Arc<dyn AudioBackend>,
    catalog: PortCatalog,
}

impl AudioEngine {
    /// Fails with a backend error when the device enumerator cannot be created.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Result<Self, EngineError> {
        let catalog = PortCatalog::new(backend.as_ref())?;
        log::info!("audio engine initialized on {} backend", backend.name());
        Ok(Self { backend, catalog })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn catalog(&self) -> &PortCatalog {
        &self.catalog
    }

    pub fn list_ports(&self) -> Result<Vec<Port>, EngineError> {
        self.catalog.list_ports()
    }

    pub fn default_port(&self, flow: Flow) -> Result<Option<Port>, EngineError> {
        self.catalog.default_port(flow)
    }

    pub fn is_format_supported(&self, port: &Port, format: &AudioFormat, mode: TimingMode) -> Result<FormatQuery, EngineError> {
        let device = self.catalog.resolve(&port.handle)?;
        FormatNegotiator::is_supported(device.as_ref(), format, mode)
    }

    /// Open a render stream. The session's `format()` is the negotiated format.
    pub fn open_output(&self, port: &Port, config: &StreamConfiguration) -> Result<OutputSession, EngineError> {
        OutputSession::open_output(self.backend.as_ref(), &self.catalog, port, config)
    }

    /// Open a capture stream. The session's `format()` is the negotiated format.
    pub fn open_input(&self, port: &Port, config: &StreamConfiguration) -> Result<InputSession, EngineError> {
        InputSession::open_input(self.backend.as_ref(), &self.catalog, port, config)
    }

    /// Release the catalog and the engine's hold on the backend.
    pub fn shutdown(self) {
        log::info!("audio engine on {} backend shut down", self.backend.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{EndpointConfig, SimulatedBackend};
    use crate::models::status::StatusCode;

    fn backend() -> SimulatedBackend {
        let backend = SimulatedBackend::new();
        backend.add_endpoint(EndpointConfig::render("{speakers}", AudioFormat::float(48000, 2)));
        backend.add_endpoint(EndpointConfig::capture("{mic}", AudioFormat::pcm(48000, 16, 1)));
        backend.set_default(Flow::In, "{mic}");
        backend
    }

    #[test]
    fn unusable_without_enumerator() {
        let backend = backend();
        backend.fail_enumerator(Some(StatusCode::E_OUTOFMEMORY));

        let err = AudioEngine::new(Arc::new(backend)).err().unwrap();
        assert_eq!(
            err,
            EngineError::Backend {
                op: "create device enumerator",
                status: StatusCode::E_OUTOFMEMORY
            }
        );
    }

    #[test]
    fn lists_and_resolves_defaults() {
        let engine = AudioEngine::new(Arc::new(backend())).unwrap();
        assert_eq!(engine.backend_name(), "simulated");
        assert_eq!(engine.list_ports().unwrap().len(), 2);

        let mic = engine.default_port(Flow::In).unwrap().unwrap();
        assert_eq!(mic.flow, Flow::In);
        assert!(engine.default_port(Flow::Out).unwrap().is_none());
    }

    #[test]
    fn sessions_survive_shutdown() {
        let backend = backend();
        let engine = AudioEngine::new(Arc::new(backend.clone())).unwrap();
        let port = engine.default_port(Flow::In).unwrap().unwrap();
        let mut session = engine
            .open_input(&port, &StreamConfiguration::new(AudioFormat::pcm(48000, 16, 1), 960))
            .unwrap();
        engine.shutdown();

        session.start().unwrap();
        backend.endpoint("{mic}").unwrap().stream().unwrap().push_capture(&[1, 2, 3, 4], false);
        let mut buffer = [0u8; 4];
        assert_eq!(session.read(&mut buffer, 0, 4).unwrap(), 4);
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn port_from_another_machine_fails_to_resolve() {
        let engine = AudioEngine::new(Arc::new(backend())).unwrap();
        let mut port = engine.default_port(Flow::In).unwrap().unwrap();
        port.handle = "{gone}".into();

        let err = engine.open_input(&port, &StreamConfiguration::default()).err().unwrap();
        assert_eq!(err.status(), Some(StatusCode::E_NOTFOUND));
    }
}
