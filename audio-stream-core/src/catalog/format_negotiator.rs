//! Format support queries and the negotiation step of session open.

use crate::models::audio_format::AudioFormat;
use crate::models::config::TimingMode;
use crate::models::error::EngineError;
use crate::models::status::StatusCode;
use crate::traits::audio_client::{AudioClient, FormatSupport};
use crate::traits::backend::Device;

/// Result of [`FormatNegotiator::is_supported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatQuery {
    pub supported: bool,
    /// Device proposal when `supported` is false. Always `None` in exclusive mode.
    pub closest: Option<AudioFormat>,
}

/// Decides which format a device will actually run.
pub struct FormatNegotiator;

impl FormatNegotiator {
    /// Ask `device` whether `format` is directly usable in `mode`.
    pub fn is_supported(device: &dyn Device, format: &AudioFormat, mode: TimingMode) -> Result<FormatQuery, EngineError> {
        format.validate().map_err(|e| e.during("query format support"))?;
        let client = device
            .activate()
            .map_err(|status| EngineError::backend("activate audio client", status))?;
        let support = Self::query(client.as_ref(), format, mode)?;

        Ok(match support {
            FormatSupport::Supported => FormatQuery { supported: true, closest: None },
            FormatSupport::ClosestMatch(closest) if mode == TimingMode::Shared => FormatQuery {
                supported: false,
                closest: Some(closest),
            },
            FormatSupport::ClosestMatch(_) | FormatSupport::Unsupported => FormatQuery {
                supported: false,
                closest: None,
            },
        })
    }

    /// Pick the format a session will be initialized with.
    ///
    /// Shared mode adopts the device's closest match in place of the request;
    /// exclusive mode accepts only an exact match.
    pub fn negotiate(client: &dyn AudioClient, requested: &AudioFormat, mode: TimingMode) -> Result<AudioFormat, EngineError> {
        const OP: &str = "negotiate format";
        requested.validate().map_err(|e| e.during(OP))?;
        let negotiated = match (Self::query(client, requested, mode)?, mode) {
            (FormatSupport::Supported, _) => *requested,
            (FormatSupport::ClosestMatch(closest), TimingMode::Shared) => {
                log::info!("device proposed {closest} in place of {requested}");
                closest
            }
            _ => {
                return Err(EngineError::UnsupportedFormat {
                    op: OP,
                    reason: format!("{requested} is not supported in {mode:?} mode"),
                })
            }
        };
        negotiated.validate().map_err(|e| e.during(OP))?;
        Ok(negotiated)
    }

    fn query(client: &dyn AudioClient, format: &AudioFormat, mode: TimingMode) -> Result<FormatSupport, EngineError> {
        client.is_format_supported(mode, format).map_err(|status| {
            if status == StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT {
                EngineError::UnsupportedFormat {
                    op: "query format support",
                    reason: format!("{format}: {status}"),
                }
            } else {
                EngineError::from_status("query format support", status)
            }
        })
    }
}
