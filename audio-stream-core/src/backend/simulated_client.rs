//! Simulated audio client, stream buffers and clock.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_format::AudioFormat;
use crate::models::config::TimingMode;
use crate::models::port::Flow;
use crate::models::status::StatusCode;
use crate::session::signals::ConditionSignals;
use crate::traits::audio_client::{
    AudioClient, AudioClock, BufferFlags, CaptureClient, CapturePacket, DevicePeriod, FormatSupport, RenderClient,
};
use crate::traits::signals::{EventSignals, WaitOutcome};

use super::simulated::{FailurePoint, ReleaseLog, SimEndpoint};

struct Packet {
    data: Vec<u8>,
    frames: u32,
    flags: BufferFlags,
}

#[derive(Default)]
struct StreamState {
    running: bool,
    /// Render: frames committed but not yet played. Capture: frames queued.
    padding: u32,
    position: u64,
    rendered: Vec<u8>,
    captured: VecDeque<Packet>,
    acquisitions: Vec<u32>,
}

/// One initialized stream: the hardware ring buffer of a simulated client.
pub struct SimStream {
    flow: Flow,
    format: AudioFormat,
    mode: TimingMode,
    buffer_duration: Duration,
    periodicity: Duration,
    buffer_frames: u32,
    state: Mutex<StreamState>,
    signals: Mutex<Weak<SimSignals>>,
}

impl SimStream {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    /// Duration and periodicity the client was initialized with.
    pub fn initialized_with(&self) -> (Duration, Duration) {
        (self.buffer_duration, self.periodicity)
    }

    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    pub fn padding(&self) -> u32 {
        self.state.lock().padding
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Play up to `frames` queued frames and raise buffer-ready.
    /// Returns the number of frames played.
    pub fn consume(&self, frames: u32) -> u32 {
        let played = self.drift(frames);
        self.raise_buffer_ready();
        played
    }

    /// Play up to `frames` queued frames without raising buffer-ready, as a
    /// device whose period event went missing.
    pub fn drift(&self, frames: u32) -> u32 {
        let mut state = self.state.lock();
        let played = frames.min(state.padding);
        state.padding -= played;
        state.position += u64::from(played);
        played
    }

    /// Queue one captured packet and raise buffer-ready.
    pub fn push_capture(&self, data: &[u8], silent: bool) {
        let frame_size = self.format.frame_size() as usize;
        let frames = (data.len() / frame_size) as u32;
        {
            let mut state = self.state.lock();
            state.padding += frames;
            state.captured.push_back(Packet {
                data: data[..frames as usize * frame_size].to_vec(),
                frames,
                flags: if silent { BufferFlags::SILENT } else { BufferFlags::NONE },
            });
        }
        self.raise_buffer_ready();
    }

    /// Everything committed to the render buffer so far; silent regions as zeros.
    pub fn rendered(&self) -> Vec<u8> {
        self.state.lock().rendered.clone()
    }

    /// Frame counts of every render buffer acquisition, in order.
    pub fn acquisitions(&self) -> Vec<u32> {
        self.state.lock().acquisitions.clone()
    }

    fn raise_buffer_ready(&self) {
        if let Some(signals) = self.signals.lock().upgrade() {
            signals.raise_buffer_ready();
        }
    }

    fn free_frames(&self) -> u32 {
        self.buffer_frames.saturating_sub(self.state.lock().padding)
    }
}

/// Signal pair of a simulated stream. Runs the endpoint's pending
/// stop-reset hook just before clearing stop-requested.
struct SimSignals {
    inner: ConditionSignals,
    endpoint: Arc<SimEndpoint>,
}

impl EventSignals for SimSignals {
    fn raise_stop(&self) {
        self.inner.raise_stop();
    }

    fn reset_stop(&self) {
        if let Some(hook) = self.endpoint.take_stop_reset_hook() {
            hook();
        }
        self.inner.reset_stop();
    }

    fn is_stop_raised(&self) -> bool {
        self.inner.is_stop_raised()
    }

    fn raise_buffer_ready(&self) {
        self.inner.raise_buffer_ready();
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, StatusCode> {
        self.inner.wait(timeout)
    }
}

fn frames_in(duration: Duration, sample_rate: u32) -> u32 {
    let frames = duration.as_nanos() * u128::from(sample_rate) / 1_000_000_000;
    u32::try_from(frames).unwrap_or(u32::MAX)
}

pub(crate) struct SimClient {
    endpoint: Arc<SimEndpoint>,
    stream: Option<Arc<SimStream>>,
    releases: Arc<ReleaseLog>,
}

impl SimClient {
    pub(crate) fn new(endpoint: Arc<SimEndpoint>, releases: Arc<ReleaseLog>) -> Self {
        Self {
            endpoint,
            stream: None,
            releases,
        }
    }

    fn stream(&self) -> Result<&Arc<SimStream>, StatusCode> {
        self.stream.as_ref().ok_or(StatusCode::AUDCLNT_E_NOT_INITIALIZED)
    }

    fn live_stream(&self) -> Result<&Arc<SimStream>, StatusCode> {
        self.endpoint.check_alive()?;
        self.stream()
    }
}

impl AudioClient for SimClient {
    fn mix_format(&self) -> Result<AudioFormat, StatusCode> {
        self.endpoint.check_alive()?;
        Ok(self.endpoint.config().mix_format)
    }

    fn is_format_supported(&self, mode: TimingMode, format: &AudioFormat) -> Result<FormatSupport, StatusCode> {
        self.endpoint.check_alive()?;
        if self.endpoint.accepts(format) {
            return Ok(FormatSupport::Supported);
        }
        Ok(match mode {
            TimingMode::Shared => FormatSupport::ClosestMatch(self.endpoint.config().mix_format),
            TimingMode::Exclusive => FormatSupport::Unsupported,
        })
    }

    fn device_period(&self) -> Result<DevicePeriod, StatusCode> {
        self.endpoint.check_alive()?;
        Ok(self.endpoint.config().period)
    }

    fn initialize(
        &mut self,
        mode: TimingMode,
        buffer_duration: Duration,
        periodicity: Duration,
        format: &AudioFormat,
    ) -> Result<(), StatusCode> {
        self.endpoint.check_alive()?;
        self.endpoint.check(FailurePoint::Initialize)?;
        if self.stream.is_some() {
            return Err(StatusCode::AUDCLNT_E_ALREADY_INITIALIZED);
        }
        if !self.endpoint.accepts(format) {
            return Err(StatusCode::AUDCLNT_E_UNSUPPORTED_FORMAT);
        }
        let period = self.endpoint.config().period;
        let buffer_frames = match mode {
            TimingMode::Shared => {
                // the mixer never runs a buffer shorter than one default period
                frames_in(buffer_duration, format.sample_rate).max(frames_in(period.default, format.sample_rate))
            }
            TimingMode::Exclusive => {
                if buffer_duration != periodicity {
                    return Err(StatusCode::AUDCLNT_E_BUFDURATION_PERIOD_NOT_EQUAL);
                }
                if buffer_duration < period.minimum {
                    return Err(StatusCode::AUDCLNT_E_INVALID_DEVICE_PERIOD);
                }
                frames_in(buffer_duration, format.sample_rate)
            }
        };

        let stream = Arc::new(SimStream {
            flow: self.endpoint.flow(),
            format: *format,
            mode,
            buffer_duration,
            periodicity,
            buffer_frames,
            state: Mutex::new(StreamState::default()),
            signals: Mutex::new(Weak::new()),
        });
        self.endpoint.set_stream(Arc::clone(&stream));
        self.stream = Some(stream);
        Ok(())
    }

    fn event_signals(&mut self) -> Result<Arc<dyn EventSignals>, StatusCode> {
        let stream = self.live_stream()?;
        self.endpoint.check(FailurePoint::EventSignals)?;
        let signals = Arc::new(SimSignals {
            inner: ConditionSignals::new(),
            endpoint: Arc::clone(&self.endpoint),
        });
        *stream.signals.lock() = Arc::downgrade(&signals);
        Ok(signals)
    }

    fn buffer_size(&self) -> Result<u32, StatusCode> {
        let stream = self.live_stream()?;
        self.endpoint.check(FailurePoint::BufferSize)?;
        Ok(stream.buffer_frames)
    }

    fn current_padding(&self) -> Result<u32, StatusCode> {
        let stream = self.live_stream()?;
        self.endpoint.check(FailurePoint::Padding)?;
        Ok(stream.padding())
    }

    fn stream_latency(&self) -> Result<Duration, StatusCode> {
        self.live_stream()?;
        Ok(self.endpoint.latency())
    }

    fn start(&mut self) -> Result<(), StatusCode> {
        let stream = self.live_stream()?;
        self.endpoint.check(FailurePoint::Start)?;
        let mut state = stream.state.lock();
        if state.running {
            return Err(StatusCode::AUDCLNT_E_NOT_STOPPED);
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StatusCode> {
        let stream = self.live_stream()?;
        stream.state.lock().running = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), StatusCode> {
        let stream = self.live_stream()?;
        let mut state = stream.state.lock();
        if state.running {
            return Err(StatusCode::AUDCLNT_E_NOT_STOPPED);
        }
        state.padding = 0;
        state.captured.clear();
        Ok(())
    }

    fn render_client(&mut self) -> Result<Box<dyn RenderClient>, StatusCode> {
        let stream = Arc::clone(self.live_stream()?);
        self.endpoint.check(FailurePoint::RenderClient)?;
        if stream.flow != Flow::Out {
            return Err(StatusCode::AUDCLNT_E_WRONG_ENDPOINT_TYPE);
        }
        Ok(Box::new(SimRenderClient {
            stream,
            endpoint: Arc::clone(&self.endpoint),
            scratch: Vec::new(),
            held: None,
            releases: Arc::clone(&self.releases),
        }))
    }

    fn capture_client(&mut self) -> Result<Box<dyn CaptureClient>, StatusCode> {
        let stream = Arc::clone(self.live_stream()?);
        self.endpoint.check(FailurePoint::CaptureClient)?;
        if stream.flow != Flow::In {
            return Err(StatusCode::AUDCLNT_E_WRONG_ENDPOINT_TYPE);
        }
        Ok(Box::new(SimCaptureClient {
            stream,
            endpoint: Arc::clone(&self.endpoint),
            current: None,
            releases: Arc::clone(&self.releases),
        }))
    }

    fn clock(&mut self) -> Result<Box<dyn AudioClock>, StatusCode> {
        let stream = Arc::clone(self.live_stream()?);
        self.endpoint.check(FailurePoint::Clock)?;
        Ok(Box::new(SimClock {
            stream,
            releases: Arc::clone(&self.releases),
        }))
    }
}

impl Drop for SimClient {
    fn drop(&mut self) {
        self.releases.record("client");
    }
}

struct SimRenderClient {
    stream: Arc<SimStream>,
    endpoint: Arc<SimEndpoint>,
    scratch: Vec<u8>,
    held: Option<u32>,
    releases: Arc<ReleaseLog>,
}

impl RenderClient for SimRenderClient {
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], StatusCode> {
        self.endpoint.check_alive()?;
        self.endpoint.check(FailurePoint::GetBuffer)?;
        if self.held.is_some() {
            return Err(StatusCode::AUDCLNT_E_OUT_OF_ORDER);
        }
        if frames > self.stream.free_frames() {
            return Err(StatusCode::AUDCLNT_E_BUFFER_TOO_LARGE);
        }
        self.stream.state.lock().acquisitions.push(frames);
        let frame_size = self.stream.format.frame_size() as usize;
        let mut bytes = frames as usize * frame_size;
        if self.endpoint.short_regions() {
            bytes = bytes.saturating_sub(frame_size);
        }
        self.scratch.clear();
        self.scratch.resize(bytes, 0);
        self.held = Some(frames);
        Ok(&mut self.scratch[..])
    }

    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<(), StatusCode> {
        self.endpoint.check(FailurePoint::ReleaseBuffer)?;
        let held = self.held.take().ok_or(StatusCode::AUDCLNT_E_OUT_OF_ORDER)?;
        if frames > held {
            return Err(StatusCode::AUDCLNT_E_INVALID_SIZE);
        }
        let bytes = frames as usize * self.stream.format.frame_size() as usize;
        let mut state = self.stream.state.lock();
        if flags.silent {
            let len = state.rendered.len();
            state.rendered.resize(len + bytes, 0);
        } else {
            state.rendered.extend_from_slice(&self.scratch[..bytes]);
        }
        state.padding += frames;
        Ok(())
    }
}

impl Drop for SimRenderClient {
    fn drop(&mut self) {
        self.releases.record("render");
    }
}

struct SimCaptureClient {
    stream: Arc<SimStream>,
    endpoint: Arc<SimEndpoint>,
    current: Option<Packet>,
    releases: Arc<ReleaseLog>,
}

impl CaptureClient for SimCaptureClient {
    fn get_buffer(&mut self) -> Result<Option<CapturePacket<'_>>, StatusCode> {
        self.endpoint.check_alive()?;
        self.endpoint.check(FailurePoint::GetBuffer)?;
        if self.current.is_some() {
            return Err(StatusCode::AUDCLNT_E_OUT_OF_ORDER);
        }
        self.current = self.stream.state.lock().captured.pop_front();
        Ok(self.current.as_ref().map(|packet| CapturePacket {
            data: &packet.data,
            frames: packet.frames,
            flags: packet.flags,
        }))
    }

    fn release_buffer(&mut self, frames: u32) -> Result<(), StatusCode> {
        self.endpoint.check(FailurePoint::ReleaseBuffer)?;
        let packet = self.current.take().ok_or(StatusCode::AUDCLNT_E_OUT_OF_ORDER)?;
        if frames != packet.frames {
            return Err(StatusCode::AUDCLNT_E_INVALID_SIZE);
        }
        let mut state = self.stream.state.lock();
        state.padding = state.padding.saturating_sub(frames);
        state.position += u64::from(frames);
        Ok(())
    }
}

impl Drop for SimCaptureClient {
    fn drop(&mut self) {
        self.releases.record("capture");
    }
}

struct SimClock {
    stream: Arc<SimStream>,
    releases: Arc<ReleaseLog>,
}

impl AudioClock for SimClock {
    fn position(&self) -> Result<u64, StatusCode> {
        Ok(self.stream.state.lock().position)
    }
}

impl Drop for SimClock {
    fn drop(&mut self) {
        self.releases.record("clock");
    }
}
