use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Sample encoding of an [`AudioFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Encoding {
    PcmUnsigned,
    PcmSigned,
    PcmFloat,
}

impl Encoding {
    /// Map a platform sample tag to an encoding.
    ///
    /// Only integer PCM and IEEE float are understood. 8-bit integer PCM is
    /// unsigned, every other integer depth is signed.
    pub fn from_sample_tag(tag: SampleTag, bits_per_sample: u16) -> Result<Self, EngineError> {
        match tag {
            SampleTag::IeeeFloat => Ok(Self::PcmFloat),
            SampleTag::Pcm if bits_per_sample == 8 => Ok(Self::PcmUnsigned),
            SampleTag::Pcm => Ok(Self::PcmSigned),
            SampleTag::Other(tag) => Err(EngineError::UnsupportedEncoding {
                op: "decode sample tag",
                reason: format!("unsupported format tag 0x{:04X}", tag),
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PcmUnsigned => "PCM_UNSIGNED",
            Self::PcmSigned => "PCM_SIGNED",
            Self::PcmFloat => "PCM_FLOAT",
        };
        f.write_str(name)
    }
}

/// Platform-side sample tag, as carried by a device wave format descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleTag {
    Pcm,
    IeeeFloat,
    Other(u16),
}

/// PCM stream format.
///
/// `frame_size` and `byte_rate` are never stored: they are always derived
/// from the other fields, so a caller cannot hand in inconsistent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub encoding: Encoding,
    #[serde(default)]
    pub big_endian: bool,
}

impl AudioFormat {
    /// Little-endian format with the given layout.
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16, encoding: Encoding) -> Self {
        Self {
            sample_rate,
            bits_per_sample,
            channels,
            encoding,
            big_endian: false,
        }
    }

    /// Signed integer PCM (unsigned for 8-bit, matching the platform rule).
    pub fn pcm(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        let encoding = if bits_per_sample == 8 {
            Encoding::PcmUnsigned
        } else {
            Encoding::PcmSigned
        };
        Self::new(sample_rate, bits_per_sample, channels, encoding)
    }

    /// 32-bit IEEE float.
    pub fn float(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, 32, channels, Encoding::PcmFloat)
    }

    pub fn bytes_per_sample(&self) -> u32 {
        (u32::from(self.bits_per_sample) + 7) / 8
    }

    /// Bytes per frame: `channels * ceil(bits / 8)`.
    pub fn frame_size(&self) -> u32 {
        u32::from(self.channels) * self.bytes_per_sample()
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.frame_size())
    }

    /// Whole frames contained in `bytes`.
    pub fn frames_for_bytes(&self, bytes: usize) -> u32 {
        let frame_size = self.frame_size() as usize;
        if frame_size == 0 {
            return 0;
        }
        u32::try_from(bytes / frame_size).unwrap_or(u32::MAX)
    }

    /// The platform sample tag this format is expressed with.
    pub fn sample_tag(&self) -> Result<SampleTag, EngineError> {
        self.validate()?;
        Ok(match self.encoding {
            Encoding::PcmFloat => SampleTag::IeeeFloat,
            Encoding::PcmSigned | Encoding::PcmUnsigned => SampleTag::Pcm,
        })
    }

    /// Check that the format can be expressed on the platform at all.
    pub fn validate(&self) -> Result<(), EngineError> {
        const OP: &str = "validate format";
        let unsupported = |reason: String| EngineError::UnsupportedFormat { op: OP, reason };
        let unsupported_encoding = |reason: String| EngineError::UnsupportedEncoding { op: OP, reason };
        if self.sample_rate == 0 {
            return Err(unsupported("sample rate must be positive".into()));
        }
        if ![8, 16, 24, 32].contains(&self.bits_per_sample) {
            return Err(unsupported(format!("unsupported bit depth: {}", self.bits_per_sample)));
        }
        if self.channels == 0 {
            return Err(unsupported("channel count must be positive".into()));
        }
        if self.big_endian {
            return Err(unsupported("big-endian samples are not supported".into()));
        }
        match self.encoding {
            Encoding::PcmFloat if self.bits_per_sample != 32 => {
                Err(unsupported_encoding(format!("{}-bit float samples", self.bits_per_sample)))
            }
            Encoding::PcmUnsigned if self.bits_per_sample != 8 => {
                Err(unsupported_encoding(format!("{}-bit unsigned samples", self.bits_per_sample)))
            }
            Encoding::PcmSigned if self.bits_per_sample == 8 => Err(unsupported_encoding("8-bit signed samples".into())),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} ch, {}, {}",
            self.sample_rate,
            self.bits_per_sample,
            self.channels,
            self.encoding,
            if self.big_endian { "big-endian" } else { "little-endian" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes() {
        let format = AudioFormat::pcm(48000, 16, 2);
        assert_eq!(format.frame_size(), 4);
        assert_eq!(format.byte_rate(), 192000);

        let float = AudioFormat::float(48000, 2);
        assert_eq!(float.frame_size(), 8);

        let packed = AudioFormat::pcm(44100, 24, 6);
        assert_eq!(packed.frame_size(), 18);
    }

    #[test]
    fn frames_for_bytes_truncates_partial_frames() {
        let format = AudioFormat::float(48000, 2);
        assert_eq!(format.frames_for_bytes(1024), 128);
        assert_eq!(format.frames_for_bytes(1023), 127);
        assert_eq!(format.frames_for_bytes(7), 0);
    }

    #[test]
    fn eight_bit_pcm_is_unsigned() {
        assert_eq!(AudioFormat::pcm(8000, 8, 1).encoding, Encoding::PcmUnsigned);
        assert_eq!(
            Encoding::from_sample_tag(SampleTag::Pcm, 8).unwrap(),
            Encoding::PcmUnsigned
        );
        assert_eq!(
            Encoding::from_sample_tag(SampleTag::Pcm, 24).unwrap(),
            Encoding::PcmSigned
        );
        assert_eq!(
            Encoding::from_sample_tag(SampleTag::IeeeFloat, 32).unwrap(),
            Encoding::PcmFloat
        );
    }

    #[test]
    fn unknown_tag_is_unsupported_encoding() {
        let err = Encoding::from_sample_tag(SampleTag::Other(0x0055), 16).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn big_endian_is_rejected() {
        let mut format = AudioFormat::pcm(48000, 16, 2);
        format.big_endian = true;
        assert!(matches!(format.validate(), Err(EngineError::UnsupportedFormat { .. })));
        assert!(format.sample_tag().is_err());
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(AudioFormat::pcm(0, 16, 2).validate().is_err());
        assert!(AudioFormat::pcm(48000, 12, 2).validate().is_err());
        assert!(AudioFormat::pcm(48000, 16, 0).validate().is_err());
        assert!(matches!(
            AudioFormat::new(48000, 16, 2, Encoding::PcmFloat).validate(),
            Err(EngineError::UnsupportedEncoding { .. })
        ));
        assert!(matches!(
            AudioFormat::new(48000, 16, 2, Encoding::PcmUnsigned).validate(),
            Err(EngineError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn sample_tags() {
        assert_eq!(AudioFormat::float(48000, 2).sample_tag().unwrap(), SampleTag::IeeeFloat);
        assert_eq!(AudioFormat::pcm(48000, 16, 2).sample_tag().unwrap(), SampleTag::Pcm);
    }

    #[test]
    fn serde_ignores_derived_fields() {
        let json = r#"{"sample_rate":44100,"bits_per_sample":16,"channels":2,"encoding":"PCM_SIGNED","frame_size":99}"#;
        let format: AudioFormat = serde_json::from_str(json).unwrap();
        assert_eq!(format, AudioFormat::pcm(44100, 16, 2));
        assert_eq!(format.frame_size(), 4);
    }

    #[test]
    fn display() {
        assert_eq!(
            AudioFormat::float(48000, 2).to_string(),
            "48000 Hz, 32-bit, 2 ch, PCM_FLOAT, little-endian"
        );
    }
}
