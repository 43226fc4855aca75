use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_format::AudioFormat;
use super::error::EngineError;

/// How the session shares the endpoint's hardware buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Time-shared through the platform mixer; the device may propose a closest format.
    #[default]
    Shared,
    /// The session owns the hardware buffer; the format must match exactly.
    Exclusive,
}

/// Configuration for opening a stream session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfiguration {
    /// Requested format (default: 48000 Hz, 16-bit, stereo, signed PCM).
    pub format: AudioFormat,

    /// Requested ring buffer size in bytes. Converted to frames with the
    /// negotiated format's frame size. Ignored in exclusive mode.
    pub buffer_size_bytes: u32,

    /// Shared or exclusive timing (default: shared).
    pub timing_mode: TimingMode,

    /// Upper bound on a single input wait, so a read re-checks device
    /// liveness even when no buffer event arrives (default: 40 ms).
    pub read_poll_timeout_ms: u64,

    /// Upper bound on a single drain wait (default: 100 ms).
    pub drain_poll_timeout_ms: u64,
}

impl StreamConfiguration {
    pub fn new(format: AudioFormat, buffer_size_bytes: u32) -> Self {
        Self {
            format,
            buffer_size_bytes,
            ..Self::default()
        }
    }

    pub fn with_timing_mode(mut self, timing_mode: TimingMode) -> Self {
        self.timing_mode = timing_mode;
        self
    }

    pub fn read_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.read_poll_timeout_ms)
    }

    pub fn drain_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_poll_timeout_ms)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfiguration {
                op: "parse configuration",
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        const OP: &str = "validate configuration";
        self.format.validate().map_err(|e| e.during(OP))?;
        if self.read_poll_timeout_ms == 0 {
            return Err(EngineError::InvalidConfiguration {
                op: OP,
                reason: "read poll timeout must be positive".into(),
            });
        }
        if self.drain_poll_timeout_ms == 0 {
            return Err(EngineError::InvalidConfiguration {
                op: OP,
                reason: "drain poll timeout must be positive".into(),
            });
        }
        Ok(())
    }
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        Self {
            format: AudioFormat::pcm(48000, 16, 2),
            buffer_size_bytes: 19200,
            timing_mode: TimingMode::Shared,
            read_poll_timeout_ms: 40,
            drain_poll_timeout_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audio_format::Encoding;

    #[test]
    fn defaults_are_valid() {
        let config = StreamConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing_mode, TimingMode::Shared);
        assert_eq!(config.read_poll_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = StreamConfiguration::from_json(
            r#"{
                "format": {"sample_rate": 44100, "bits_per_sample": 32, "channels": 2, "encoding": "PCM_FLOAT"},
                "timing_mode": "exclusive"
            }"#,
        )
        .unwrap();
        assert_eq!(config.format.encoding, Encoding::PcmFloat);
        assert_eq!(config.timing_mode, TimingMode::Exclusive);
        assert_eq!(config.buffer_size_bytes, 19200);
        assert_eq!(config.drain_poll_timeout_ms, 100);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(matches!(
            StreamConfiguration::from_json("{not json"),
            Err(EngineError::InvalidConfiguration { op: "parse configuration", .. })
        ));
    }

    #[test]
    fn big_endian_request_fails_validation() {
        let mut config = StreamConfiguration::default();
        config.format.big_endian = true;
        assert!(matches!(
            config.validate(),
            Err(EngineError::UnsupportedFormat { op: "validate configuration", .. })
        ));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = StreamConfiguration {
            read_poll_timeout_ms: 0,
            ..StreamConfiguration::default()
        };
        assert!(config.validate().is_err());
    }
}
