//! # audio-stream-core
//!
//! Platform-agnostic audio device streaming engine.
//!
//! Opens one output or input endpoint, negotiates its format, and moves PCM
//! frames between caller buffers and the device's hardware ring buffer.
//! Platform backends (Windows WASAPI, the in-process simulator) implement
//! the traits in [`traits`] and are driven through [`AudioEngine`].
//!
//! ## Architecture
//!
//! ```text
//! audio-stream-core (this crate)
//! ├── traits/       ← AudioBackend, DeviceEnumerator, Device, AudioClient, EventSignals, listeners
//! ├── models/       ← AudioFormat, Port, EngineError, StatusCode, StreamConfiguration, states
//! ├── catalog/      ← PortCatalog, FormatNegotiator
//! ├── session/      ← SessionContext, OutputSession, InputSession, DeviceChangeMonitor, signals
//! ├── processing/   ← TimingStrategy, carry-over RingBuffer
//! ├── backend/      ← SimulatedBackend
//! └── engine.rs     ← AudioEngine registry
//! ```

pub mod backend;
pub mod catalog;
pub mod engine;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backend::simulated::{EndpointConfig, FailurePoint, SimulatedBackend};
pub use catalog::format_negotiator::{FormatNegotiator, FormatQuery};
pub use catalog::port_catalog::PortCatalog;
pub use engine::AudioEngine;
pub use models::audio_format::{AudioFormat, Encoding};
pub use models::config::{StreamConfiguration, TimingMode};
pub use models::error::EngineError;
pub use models::port::{DeviceProperties, DeviceState, Flow, Port, PortHandle};
pub use models::state::{MonitorState, SessionState};
pub use models::status::StatusCode;
pub use session::context::{InterruptHandle, SessionContext};
pub use session::input::InputSession;
pub use session::output::OutputSession;
pub use traits::backend::AudioBackend;
