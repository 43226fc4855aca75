//! Output streaming: the blocking write loop, drain, flush and stop.

use crate::catalog::port_catalog::PortCatalog;
use crate::models::config::StreamConfiguration;
use crate::models::error::EngineError;
use crate::models::port::{Flow, Port};
use crate::models::status::StatusCode;
use crate::session::context::{clamp_range, frames_to_available, SessionContext};
use crate::traits::audio_client::{BufferFlags, RenderClient};
use crate::traits::backend::AudioBackend;
use crate::traits::signals::WaitOutcome;

/// An open render stream.
pub type OutputSession = SessionContext<Box<dyn RenderClient>>;

impl SessionContext<Box<dyn RenderClient>> {
    pub(crate) fn open_output(
        backend: &dyn AudioBackend,
        catalog: &PortCatalog,
        port: &Port,
        config: &StreamConfiguration,
    ) -> Result<Self, EngineError> {
        Self::open(backend, catalog, port, Flow::Out, config, |client| client.render_client())
    }

    /// Write `buffer[offset..offset + length]`, blocking while the hardware
    /// buffer is full.
    ///
    /// Returns the number of bytes written. Fewer than `length` bytes means
    /// the write was interrupted by a stop request; a trailing partial frame
    /// is never written.
    pub fn write(&mut self, buffer: &[u8], offset: usize, length: usize) -> Result<usize, EngineError> {
        const OP: &str = "write";
        self.resources(OP)?;
        let data = &buffer[clamp_range(buffer.len(), offset, length)];
        let frame_size = self.frame_size();
        let total_frames = data.len() / frame_size;
        let buffer_frames = self.buffer_size()?;
        let wait = self.timing().write_wait();
        let mut written = 0usize;

        while written < total_frames {
            self.ensure_device_active(OP)?;
            let padding = self.current_padding(OP)?;
            let available = buffer_frames.saturating_sub(padding) as usize;
            if available == 0 {
                match self.wait(OP, wait)? {
                    WaitOutcome::StopRequested => return self.stopped(OP, written * frame_size),
                    WaitOutcome::BufferReady | WaitOutcome::TimedOut => continue,
                }
            }

            let frames = available.min(total_frames - written);
            let start = written * frame_size;
            let chunk = &data[start..start + frames * frame_size];
            self.commit(OP, Some(chunk), frames as u32, BufferFlags::NONE)?;
            written += frames;
            self.pending_frames += frames as u64;
        }
        Ok(written * frame_size)
    }

    /// Acquire a region of `frames` frames, fill it from `data` and release it.
    /// `None` releases the region untouched (used with the silent flag).
    fn commit(&mut self, op: &'static str, data: Option<&[u8]>, frames: u32, flags: BufferFlags) -> Result<(), EngineError> {
        let status = {
            let render = &mut self.resources_mut(op)?.service;
            match render.get_buffer(frames) {
                Ok(region) => {
                    let fits = data.map_or(true, |data| region.len() >= data.len());
                    if let Some(data) = data.filter(|_| fits) {
                        region[..data.len()].copy_from_slice(data);
                    }
                    if fits {
                        match render.release_buffer(frames, flags) {
                            Ok(()) => return Ok(()),
                            Err(status) => status,
                        }
                    } else {
                        if let Err(status) = render.release_buffer(0, BufferFlags::NONE) {
                            log::warn!("{op}: releasing short region failed: {status}");
                        }
                        StatusCode::AUDCLNT_E_BUFFER_SIZE_ERROR
                    }
                }
                Err(status) => status,
            }
        };
        Err(self.io_error(op, status))
    }

    /// Block until every queued frame has been played.
    ///
    /// Returns early on a clean stop request. A device that stops being
    /// active mid-drain is reported as invalidated.
    pub fn drain(&mut self) -> Result<(), EngineError> {
        const OP: &str = "drain";
        let wait = self.timing().drain_wait();
        loop {
            match self.ensure_device_active(OP) {
                Ok(()) => {}
                Err(EngineError::DeviceInactive { .. }) => return Err(EngineError::DeviceInvalidated { op: OP }),
                Err(err) => return Err(err),
            }
            if self.current_padding(OP)? == 0 {
                log::debug!("[{}] drained", self.session_id());
                return Ok(());
            }
            if self.wait(OP, Some(wait))? == WaitOutcome::StopRequested {
                return self.stopped(OP, ());
            }
        }
    }

    /// Discard queued audio without waiting for playback.
    ///
    /// A stopped stream is reset; a running one has its free region
    /// committed as silence.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        const OP: &str = "flush";
        self.drain_notifications();
        if !self.is_running() {
            let reset = self.resources_mut(OP)?.client.reset();
            reset.map_err(|status| self.io_error(OP, status))?;
        }
        let padding = self.current_padding(OP)?;
        let available = self.buffer_size()?.saturating_sub(padding);
        if self.is_running() && available > 0 {
            self.commit(OP, None, available, BufferFlags::SILENT)?;
        }
        self.pending_frames = 0;
        log::debug!("[{}] flushed", self.session_id());
        Ok(())
    }

    /// Raise stop-requested (unblocking any in-flight write), stop the
    /// device stream, then flush.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.halt()?;
        if let Err(err) = self.flush() {
            log::warn!("[{}] flush after stop failed: {err}", self.session_id());
        }
        Ok(())
    }

    /// Free frames in the hardware buffer; `-1` if the count overflows.
    pub fn available(&self) -> Result<i32, EngineError> {
        let padding = self.current_padding("available")?;
        let free = self.buffer_size()?.saturating_sub(padding);
        Ok(frames_to_available(u64::from(free)))
    }
}
