//! `IAudioClient` and its services behind the core client traits.

use std::ptr::null_mut;
use std::sync::Arc;
use std::time::Duration;

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::CoTaskMemFree;

use audio_stream_core::models::audio_format::AudioFormat;
use audio_stream_core::models::config::TimingMode;
use audio_stream_core::models::status::StatusCode;
use audio_stream_core::traits::audio_client::{
    AudioClient, AudioClock, BufferFlags, CaptureClient, CapturePacket, DevicePeriod, FormatSupport, RenderClient,
};
use audio_stream_core::traits::signals::EventSignals;

use crate::com::{status_of_hresult, IntoStatus};
use crate::events::Win32EventSignals;
use crate::wave_format::{audio_format_from_ptr, WaveFormat};

/// `REFERENCE_TIME` is expressed in 100 ns units.
fn to_reference_time(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
}

fn from_reference_time(hns: i64) -> Duration {
    Duration::from_nanos(u64::try_from(hns).unwrap_or(0).saturating_mul(100))
}

fn share_mode(mode: TimingMode) -> AUDCLNT_SHAREMODE {
    match mode {
        TimingMode::Shared => AUDCLNT_SHAREMODE_SHARED,
        TimingMode::Exclusive => AUDCLNT_SHAREMODE_EXCLUSIVE,
    }
}

/// Take ownership of a `CoTaskMemAlloc`ed descriptor and convert it.
unsafe fn take_wave_format(ptr: *mut WAVEFORMATEX) -> Result<AudioFormat, StatusCode> {
    let format = audio_format_from_ptr(ptr);
    if !ptr.is_null() {
        CoTaskMemFree(Some(ptr as *const _));
    }
    format
}

/// An activated `IAudioClient`.
pub struct WasapiClient {
    client: IAudioClient,
    format: Option<AudioFormat>,
    signals: Option<Arc<Win32EventSignals>>,
}

// SAFETY: the client is created in the multithreaded apartment, whose
// objects may be called from any thread. A session owns it exclusively.
unsafe impl Send for WasapiClient {}

impl WasapiClient {
    pub(crate) fn new(client: IAudioClient) -> Self {
        Self {
            client,
            format: None,
            signals: None,
        }
    }

    fn initialized_format(&self) -> Result<AudioFormat, StatusCode> {
        self.format.ok_or(StatusCode::AUDCLNT_E_NOT_INITIALIZED)
    }
}

impl AudioClient for WasapiClient {
    fn mix_format(&self) -> Result<AudioFormat, StatusCode> {
        unsafe {
            let ptr = self.client.GetMixFormat().status()?;
            take_wave_format(ptr)
        }
    }

    fn is_format_supported(&self, mode: TimingMode, format: &AudioFormat) -> Result<FormatSupport, StatusCode> {
        let wave = WaveFormat::from_audio_format(format)?;
        unsafe {
            let mut closest: *mut WAVEFORMATEX = null_mut();
            let closest_out = match mode {
                TimingMode::Shared => Some(&mut closest as *mut *mut WAVEFORMATEX),
                TimingMode::Exclusive => None,
            };
            let hr = self.client.IsFormatSupported(share_mode(mode), wave.as_ptr(), closest_out);
            let status = status_of_hresult(hr);

            if status == StatusCode::OK {
                if !closest.is_null() {
                    CoTaskMemFree(Some(closest as *const _));
                }
                return Ok(FormatSupport::Supported);
            }
            if status == StatusCode::FALSE {
                return match take_wave_format(closest) {
                    Ok(proposal) => Ok(FormatSupport::ClosestMatch(proposal)),
                    // A proposal we cannot express is as good as none.
                    Err(_) => Ok(FormatSupport::Unsupported),
                };
            }
            if !closest.is_null() {
                CoTaskMemFree(Some(closest as *const _));
            }
            if status == StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT {
                return Ok(FormatSupport::Unsupported);
            }
            Err(status)
        }
    }

    fn device_period(&self) -> Result<DevicePeriod, StatusCode> {
        let mut default = 0i64;
        let mut minimum = 0i64;
        unsafe {
            self.client
                .GetDevicePeriod(Some(&mut default), Some(&mut minimum))
                .status()?;
        }
        Ok(DevicePeriod {
            default: from_reference_time(default),
            minimum: from_reference_time(minimum),
        })
    }

    fn initialize(
        &mut self,
        mode: TimingMode,
        buffer_duration: Duration,
        periodicity: Duration,
        format: &AudioFormat,
    ) -> Result<(), StatusCode> {
        let wave = WaveFormat::from_audio_format(format)?;
        unsafe {
            self.client
                .Initialize(
                    share_mode(mode),
                    AUDCLNT_STREAMFLAGS_EVENTCALLBACK | AUDCLNT_STREAMFLAGS_NOPERSIST,
                    to_reference_time(buffer_duration),
                    to_reference_time(periodicity),
                    wave.as_ptr(),
                    None,
                )
                .status()?;
        }
        self.format = Some(*format);
        Ok(())
    }

    fn event_signals(&mut self) -> Result<Arc<dyn EventSignals>, StatusCode> {
        let signals = Arc::new(Win32EventSignals::new()?);
        unsafe {
            self.client.SetEventHandle(signals.buffer_ready_handle()).status()?;
        }
        // The engine keeps signalling the handle until the client is released.
        self.signals = Some(Arc::clone(&signals));
        Ok(signals)
    }

    fn buffer_size(&self) -> Result<u32, StatusCode> {
        unsafe { self.client.GetBufferSize().status() }
    }

    fn current_padding(&self) -> Result<u32, StatusCode> {
        unsafe { self.client.GetCurrentPadding().status() }
    }

    fn stream_latency(&self) -> Result<Duration, StatusCode> {
        let hns = unsafe { self.client.GetStreamLatency().status()? };
        Ok(from_reference_time(hns))
    }

    fn start(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Start().status() }
    }

    fn stop(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Stop().status() }
    }

    fn reset(&mut self) -> Result<(), StatusCode> {
        unsafe { self.client.Reset().status() }
    }

    fn render_client(&mut self) -> Result<Box<dyn RenderClient>, StatusCode> {
        let format = self.initialized_format()?;
        let render: IAudioRenderClient = unsafe { self.client.GetService().status()? };
        Ok(Box::new(WasapiRenderClient {
            render,
            frame_size: format.frame_size() as usize,
        }))
    }

    fn capture_client(&mut self) -> Result<Box<dyn CaptureClient>, StatusCode> {
        let format = self.initialized_format()?;
        let capture: IAudioCaptureClient = unsafe { self.client.GetService().status()? };
        Ok(Box::new(WasapiCaptureClient {
            capture,
            frame_size: format.frame_size() as usize,
        }))
    }

    fn clock(&mut self) -> Result<Box<dyn AudioClock>, StatusCode> {
        let format = self.initialized_format()?;
        let clock: IAudioClock = unsafe { self.client.GetService().status()? };
        let frequency = unsafe { clock.GetFrequency().status()? };
        Ok(Box::new(WasapiClock {
            clock,
            frequency,
            sample_rate: format.sample_rate,
        }))
    }
}

/// `IAudioRenderClient`.
pub struct WasapiRenderClient {
    render: IAudioRenderClient,
    frame_size: usize,
}

// SAFETY: see `WasapiClient`.
unsafe impl Send for WasapiRenderClient {}

impl RenderClient for WasapiRenderClient {
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], StatusCode> {
        let len = frames as usize * self.frame_size;
        unsafe {
            let ptr = self.render.GetBuffer(frames).status()?;
            if ptr.is_null() || len == 0 {
                return Ok(&mut []);
            }
            Ok(std::slice::from_raw_parts_mut(ptr, len))
        }
    }

    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<(), StatusCode> {
        let raw = if flags.silent {
            AUDCLNT_BUFFERFLAGS_SILENT.0 as u32
        } else {
            0
        };
        unsafe { self.render.ReleaseBuffer(frames, raw).status() }
    }
}

/// `IAudioCaptureClient`.
pub struct WasapiCaptureClient {
    capture: IAudioCaptureClient,
    frame_size: usize,
}

// SAFETY: see `WasapiClient`.
unsafe impl Send for WasapiCaptureClient {}

impl CaptureClient for WasapiCaptureClient {
    fn get_buffer(&mut self) -> Result<Option<CapturePacket<'_>>, StatusCode> {
        unsafe {
            let next = self.capture.GetNextPacketSize().status()?;
            if next == 0 {
                return Ok(None);
            }

            let mut data: *mut u8 = null_mut();
            let mut frames: u32 = 0;
            let mut raw_flags: u32 = 0;
            self.capture
                .GetBuffer(&mut data, &mut frames, &mut raw_flags, None, None)
                .status()?;

            if raw_flags & (AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32) != 0 {
                log::debug!("capture discontinuity before a {frames}-frame packet");
            }
            let silent = raw_flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0;
            let len = frames as usize * self.frame_size;
            let data: &[u8] = if data.is_null() || len == 0 {
                &[]
            } else {
                std::slice::from_raw_parts(data, len)
            };

            Ok(Some(CapturePacket {
                data,
                frames,
                flags: BufferFlags { silent },
            }))
        }
    }

    fn release_buffer(&mut self, frames: u32) -> Result<(), StatusCode> {
        unsafe { self.capture.ReleaseBuffer(frames).status() }
    }
}

/// `IAudioClock`, converted from device clock units to frames.
pub struct WasapiClock {
    clock: IAudioClock,
    frequency: u64,
    sample_rate: u32,
}

// SAFETY: see `WasapiClient`.
unsafe impl Send for WasapiClock {}

impl AudioClock for WasapiClock {
    fn position(&self) -> Result<u64, StatusCode> {
        let mut position = 0u64;
        unsafe {
            self.clock.GetPosition(&mut position, None).status()?;
        }
        if self.frequency == 0 {
            return Ok(0);
        }
        let frames = u128::from(position) * u128::from(self.sample_rate) / u128::from(self.frequency);
        Ok(u64::try_from(frames).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_time_conversions() {
        assert_eq!(to_reference_time(Duration::from_millis(10)), 100_000);
        assert_eq!(from_reference_time(30_000), Duration::from_millis(3));
        assert_eq!(from_reference_time(-1), Duration::ZERO);
    }
}
