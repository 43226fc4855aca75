use std::sync::Arc;
use std::time::Duration;

use crate::models::audio_format::AudioFormat;
use crate::models::config::TimingMode;
use crate::models::status::StatusCode;
use crate::traits::signals::EventSignals;

/// Answer of a format support query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSupport {
    Supported,
    /// Not directly usable; the device proposes this format instead.
    ClosestMatch(AudioFormat),
    Unsupported,
}

/// Device scheduling periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevicePeriod {
    pub default: Duration,
    pub minimum: Duration,
}

/// Flags attached to a hardware buffer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags {
    /// The region is to be treated as silence regardless of its content.
    pub silent: bool,
}

impl BufferFlags {
    pub const NONE: Self = Self { silent: false };
    pub const SILENT: Self = Self { silent: true };
}

/// A filled capture region borrowed from the hardware buffer.
#[derive(Debug)]
pub struct CapturePacket<'a> {
    pub data: &'a [u8],
    pub frames: u32,
    pub flags: BufferFlags,
}

/// An audio client activated on one device.
///
/// A client is owned by exactly one session and never shared.
pub trait AudioClient: Send {
    fn mix_format(&self) -> Result<AudioFormat, StatusCode>;

    /// Ask whether `format` is usable in `mode`. Exclusive queries never
    /// return [`FormatSupport::ClosestMatch`].
    fn is_format_supported(&self, mode: TimingMode, format: &AudioFormat) -> Result<FormatSupport, StatusCode>;

    fn device_period(&self) -> Result<DevicePeriod, StatusCode>;

    /// Initialize in event-driven mode.
    fn initialize(
        &mut self,
        mode: TimingMode,
        buffer_duration: Duration,
        periodicity: Duration,
        format: &AudioFormat,
    ) -> Result<(), StatusCode>;

    /// Allocate the buffer-ready / stop-requested signal pair and bind the
    /// buffer-ready signal to this client's event callback.
    fn event_signals(&mut self) -> Result<Arc<dyn EventSignals>, StatusCode>;

    /// Hardware buffer size in frames.
    fn buffer_size(&self) -> Result<u32, StatusCode>;

    /// Frames queued in the hardware buffer (unplayed for render, unread for capture).
    fn current_padding(&self) -> Result<u32, StatusCode>;

    fn stream_latency(&self) -> Result<Duration, StatusCode>;

    fn start(&mut self) -> Result<(), StatusCode>;

    fn stop(&mut self) -> Result<(), StatusCode>;

    /// Discard every queued frame. Only valid while the stream is stopped.
    fn reset(&mut self) -> Result<(), StatusCode>;

    fn render_client(&mut self) -> Result<Box<dyn RenderClient>, StatusCode>;

    fn capture_client(&mut self) -> Result<Box<dyn CaptureClient>, StatusCode>;

    fn clock(&mut self) -> Result<Box<dyn AudioClock>, StatusCode>;
}

/// Writable side of an output hardware buffer.
pub trait RenderClient: Send {
    /// Acquire a writable region of exactly `frames` frames.
    fn get_buffer(&mut self, frames: u32) -> Result<&mut [u8], StatusCode>;

    /// Commit `frames` frames of the acquired region.
    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<(), StatusCode>;
}

/// Readable side of an input hardware buffer.
pub trait CaptureClient: Send {
    /// Acquire the next filled packet; `None` means the buffer is empty.
    fn get_buffer(&mut self) -> Result<Option<CapturePacket<'_>>, StatusCode>;

    /// Hand the whole acquired packet back to the device.
    fn release_buffer(&mut self, frames: u32) -> Result<(), StatusCode>;
}

/// Monotonic stream position.
pub trait AudioClock: Send {
    /// Stream position in frames.
    fn position(&self) -> Result<u64, StatusCode>;
}
