//! # audio-stream-windows
//!
//! Windows WASAPI backend for audio-stream-core.
//!
//! Provides:
//! - `WasapiBackend`: entry point handed to `AudioEngine::new`
//! - `WasapiEnumerator`: endpoint enumeration and notifications via the MMDevice API
//! - `WasapiDevice` / `WasapiClient`: endpoint metadata and event-driven `IAudioClient` streams
//! - `Win32EventSignals`: stop / buffer-ready event pair
//!
//! ## Platform Requirements
//! - Windows 7+ for event-driven shared and exclusive streams
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_stream_core::{AudioEngine, Flow, StreamConfiguration, AudioFormat};
//! use audio_stream_windows::WasapiBackend;
//!
//! let engine = AudioEngine::new(Arc::new(WasapiBackend::new()))?;
//! let port = engine.default_port(Flow::Out)?.expect("no speakers");
//! let config = StreamConfiguration::new(AudioFormat::pcm(48000, 16, 2), 19200);
//! let mut output = engine.open_output(&port, &config)?;
//! output.start()?;
//! output.write(&pcm, 0, pcm.len())?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod audio_client;
#[cfg(target_os = "windows")]
pub mod device;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod events;
#[cfg(target_os = "windows")]
mod notification_client;
#[cfg(target_os = "windows")]
mod wave_format;

#[cfg(target_os = "windows")]
pub use device_enumerator::{WasapiBackend, WasapiEnumerator};
#[cfg(target_os = "windows")]
pub use events::Win32EventSignals;
