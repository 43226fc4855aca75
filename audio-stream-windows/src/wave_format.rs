//! Conversion between [`AudioFormat`] and `WAVEFORMATEX`/`WAVEFORMATEXTENSIBLE`.
//!
//! Both structs are `packed(1)`; fields are always copied out by value.

use std::mem::size_of;

use windows::core::GUID;
use windows::Win32::Media::Audio::{WAVEFORMATEX, WAVEFORMATEXTENSIBLE, WAVEFORMATEXTENSIBLE_0};

use audio_stream_core::models::audio_format::{AudioFormat, Encoding, SampleTag};
use audio_stream_core::models::status::StatusCode;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

const KSDATAFORMAT_SUBTYPE_PCM: GUID = GUID::from_u128(0x00000001_0000_0010_8000_00aa00389b71);
const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: GUID = GUID::from_u128(0x00000003_0000_0010_8000_00aa00389b71);

const SPEAKER_FRONT_LEFT: u32 = 0x1;
const SPEAKER_FRONT_RIGHT: u32 = 0x2;
const SPEAKER_FRONT_CENTER: u32 = 0x4;

/// An owned wave format descriptor, always laid out as `WAVEFORMATEXTENSIBLE`.
///
/// Mono and stereo formats up to 16 bits use the plain `WAVEFORMATEX` header
/// (`cbSize == 0`); everything else carries the extensible tail.
pub(crate) struct WaveFormat {
    inner: WAVEFORMATEXTENSIBLE,
}

impl WaveFormat {
    pub(crate) fn from_audio_format(format: &AudioFormat) -> Result<Self, StatusCode> {
        let tag = format.sample_tag().map_err(|e| {
            log::debug!("format {format} cannot be expressed: {e}");
            StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT
        })?;

        let block_align = format.frame_size() as u16;
        let extensible = format.channels > 2 || format.bits_per_sample > 16;
        let (format_tag, sub_format) = match tag {
            SampleTag::IeeeFloat => (WAVE_FORMAT_IEEE_FLOAT, KSDATAFORMAT_SUBTYPE_IEEE_FLOAT),
            _ => (WAVE_FORMAT_PCM, KSDATAFORMAT_SUBTYPE_PCM),
        };

        let header = WAVEFORMATEX {
            wFormatTag: if extensible { WAVE_FORMAT_EXTENSIBLE } else { format_tag },
            nChannels: format.channels,
            nSamplesPerSec: format.sample_rate,
            nAvgBytesPerSec: format.byte_rate(),
            nBlockAlign: block_align,
            wBitsPerSample: (format.bytes_per_sample() * 8) as u16,
            cbSize: if extensible {
                (size_of::<WAVEFORMATEXTENSIBLE>() - size_of::<WAVEFORMATEX>()) as u16
            } else {
                0
            },
        };

        Ok(Self {
            inner: WAVEFORMATEXTENSIBLE {
                Format: header,
                Samples: WAVEFORMATEXTENSIBLE_0 {
                    wValidBitsPerSample: format.bits_per_sample,
                },
                dwChannelMask: channel_mask(format.channels),
                SubFormat: sub_format,
            },
        })
    }

    pub(crate) fn as_ptr(&self) -> *const WAVEFORMATEX {
        &self.inner as *const WAVEFORMATEXTENSIBLE as *const WAVEFORMATEX
    }
}

fn channel_mask(channels: u16) -> u32 {
    match channels {
        1 => SPEAKER_FRONT_CENTER,
        2 => SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT,
        n if n < 32 => (1u32 << n) - 1,
        _ => 0,
    }
}

/// Read a platform-allocated descriptor.
///
/// # Safety
/// `ptr` must point to a valid `WAVEFORMATEX`, followed by the extensible
/// tail when `wFormatTag` is `WAVE_FORMAT_EXTENSIBLE`.
pub(crate) unsafe fn audio_format_from_ptr(ptr: *const WAVEFORMATEX) -> Result<AudioFormat, StatusCode> {
    if ptr.is_null() {
        return Err(StatusCode::E_POINTER);
    }
    let header = std::ptr::read_unaligned(ptr);
    let mut format_tag = header.wFormatTag;
    // container size; a narrower valid width is left-justified inside it
    let bits = header.wBitsPerSample;

    if format_tag == WAVE_FORMAT_EXTENSIBLE {
        let ext = std::ptr::read_unaligned(ptr as *const WAVEFORMATEXTENSIBLE);
        let sub_format = ext.SubFormat;
        format_tag = if sub_format == KSDATAFORMAT_SUBTYPE_PCM {
            WAVE_FORMAT_PCM
        } else if sub_format == KSDATAFORMAT_SUBTYPE_IEEE_FLOAT {
            WAVE_FORMAT_IEEE_FLOAT
        } else {
            log::warn!("unsupported extensible sub-format {:?}", sub_format);
            return Err(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT);
        };
        let valid_bits = ext.Samples.wValidBitsPerSample;
        if valid_bits != 0 && valid_bits < bits {
            log::debug!("{valid_bits} valid bits in a {bits}-bit container");
        }
    }

    let tag = match format_tag {
        WAVE_FORMAT_PCM => SampleTag::Pcm,
        WAVE_FORMAT_IEEE_FLOAT => SampleTag::IeeeFloat,
        other => SampleTag::Other(other),
    };
    let encoding = Encoding::from_sample_tag(tag, bits).map_err(|e| {
        log::warn!("{e}");
        StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT
    })?;

    let format = AudioFormat::new(header.nSamplesPerSec, bits, header.nChannels, encoding);
    if format.frame_size() != u32::from(header.nBlockAlign) {
        log::warn!("block align {} does not match {format}", { header.nBlockAlign });
        return Err(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT);
    }
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_sixteen_bit_uses_plain_header() {
        let wave = WaveFormat::from_audio_format(&AudioFormat::pcm(44100, 16, 2)).unwrap();
        let header = unsafe { std::ptr::read_unaligned(wave.as_ptr()) };
        assert_eq!({ header.wFormatTag }, WAVE_FORMAT_PCM);
        assert_eq!({ header.cbSize }, 0);
        assert_eq!({ header.nBlockAlign }, 4);
        assert_eq!({ header.nAvgBytesPerSec }, 176_400);
    }

    #[test]
    fn float_round_trips_through_extensible() {
        let format = AudioFormat::float(48000, 6);
        let wave = WaveFormat::from_audio_format(&format).unwrap();
        let header = unsafe { std::ptr::read_unaligned(wave.as_ptr()) };
        assert_eq!({ header.wFormatTag }, WAVE_FORMAT_EXTENSIBLE);
        assert_eq!(unsafe { audio_format_from_ptr(wave.as_ptr()) }.unwrap(), format);
    }

    #[test]
    fn twenty_four_bit_keeps_its_container() {
        let format = AudioFormat::pcm(96000, 24, 2);
        let wave = WaveFormat::from_audio_format(&format).unwrap();
        let header = unsafe { std::ptr::read_unaligned(wave.as_ptr()) };
        assert_eq!({ header.wBitsPerSample }, 24);
        assert_eq!({ header.nBlockAlign }, 6);
        assert_eq!(unsafe { audio_format_from_ptr(wave.as_ptr()) }.unwrap(), format);
    }

    #[test]
    fn narrower_valid_bits_decode_to_the_container_width() {
        let wave = WAVEFORMATEXTENSIBLE {
            Format: WAVEFORMATEX {
                wFormatTag: WAVE_FORMAT_EXTENSIBLE,
                nChannels: 2,
                nSamplesPerSec: 48000,
                nAvgBytesPerSec: 384_000,
                nBlockAlign: 8,
                wBitsPerSample: 32,
                cbSize: 22,
            },
            Samples: WAVEFORMATEXTENSIBLE_0 { wValidBitsPerSample: 24 },
            dwChannelMask: SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT,
            SubFormat: KSDATAFORMAT_SUBTYPE_PCM,
        };
        let ptr = &wave as *const WAVEFORMATEXTENSIBLE as *const WAVEFORMATEX;

        let format = unsafe { audio_format_from_ptr(ptr) }.unwrap();
        assert_eq!(format, AudioFormat::pcm(48000, 32, 2));
        assert_eq!(format.frame_size(), 8);

        let encoded = WaveFormat::from_audio_format(&format).unwrap();
        let header = unsafe { std::ptr::read_unaligned(encoded.as_ptr()) };
        assert_eq!({ header.wBitsPerSample }, 32);
        assert_eq!({ header.nBlockAlign }, 8);
        assert_eq!({ header.nAvgBytesPerSec }, 384_000);
    }

    #[test]
    fn inconsistent_block_align_is_rejected() {
        let header = WAVEFORMATEX {
            wFormatTag: WAVE_FORMAT_PCM,
            nChannels: 2,
            nSamplesPerSec: 44100,
            nAvgBytesPerSec: 176_400,
            nBlockAlign: 6,
            wBitsPerSample: 16,
            cbSize: 0,
        };
        assert_eq!(
            unsafe { audio_format_from_ptr(&header) },
            Err(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT)
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let header = WAVEFORMATEX {
            wFormatTag: 0x0055,
            nChannels: 2,
            nSamplesPerSec: 44100,
            nAvgBytesPerSec: 0,
            nBlockAlign: 0,
            wBitsPerSample: 0,
            cbSize: 0,
        };
        assert_eq!(
            unsafe { audio_format_from_ptr(&header) },
            Err(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT)
        );
    }

    #[test]
    fn float_of_sixteen_bits_cannot_be_expressed() {
        let format = AudioFormat::new(48000, 16, 2, Encoding::PcmFloat);
        assert_eq!(
            WaveFormat::from_audio_format(&format).err(),
            Some(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT)
        );
    }
}
