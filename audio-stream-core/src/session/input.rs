//! Input streaming: the blocking read loop, flush and stop.

use crate::catalog::port_catalog::PortCatalog;
use crate::models::config::StreamConfiguration;
use crate::models::error::EngineError;
use crate::models::port::{Flow, Port};
use crate::models::status::StatusCode;
use crate::processing::ring_buffer::RingBuffer;
use crate::session::context::{clamp_range, frames_to_available, SessionContext};
use crate::traits::audio_client::CaptureClient;
use crate::traits::backend::AudioBackend;
use crate::traits::signals::WaitOutcome;

/// Capture interface plus the bytes of the last packet that did not fit in
/// the caller's buffer.
pub struct CaptureStream {
    client: Box<dyn CaptureClient>,
    carry: RingBuffer,
}

/// An open capture stream.
pub type InputSession = SessionContext<CaptureStream>;

impl SessionContext<CaptureStream> {
    pub(crate) fn open_input(
        backend: &dyn AudioBackend,
        catalog: &PortCatalog,
        port: &Port,
        config: &StreamConfiguration,
    ) -> Result<Self, EngineError> {
        let mut session = Self::open(backend, catalog, port, Flow::In, config, |client| {
            client.capture_client().map(|client| CaptureStream {
                client,
                carry: RingBuffer::default(),
            })
        })?;
        // one hardware buffer is the largest packet the device can hand out
        let capacity = session.buffer_size()? as usize * session.frame_size();
        session.resources_mut("open")?.service.carry = RingBuffer::try_new(capacity)?;
        Ok(session)
    }

    /// Fill `buffer[offset..offset + length]` with captured audio, blocking
    /// until enough has arrived.
    ///
    /// Returns the number of bytes read; fewer than `length` means the read
    /// was interrupted by a stop request. Silent packets read as zeros.
    pub fn read(&mut self, buffer: &mut [u8], offset: usize, length: usize) -> Result<usize, EngineError> {
        const OP: &str = "read";
        let range = clamp_range(buffer.len(), offset, length);
        let dest = &mut buffer[range];
        let wait = self.timing().read_wait();
        let mut filled = self.resources_mut(OP)?.service.carry.read_into(dest);

        while filled < dest.len() {
            self.ensure_device_active(OP)?;
            match self.take_packet(OP, &mut dest[filled..])? {
                Some(copied) => filled += copied,
                None => {
                    if self.wait(OP, Some(wait))? == WaitOutcome::StopRequested {
                        return self.stopped(OP, filled);
                    }
                }
            }
        }
        Ok(filled)
    }

    /// Move the next packet into `dest`, parking what does not fit.
    /// Returns `None` when the device has nothing queued.
    fn take_packet(&mut self, op: &'static str, dest: &mut [u8]) -> Result<Option<usize>, EngineError> {
        let frame_size = self.frame_size();
        let result: Result<Option<(usize, u32)>, StatusCode> = {
            let stream = &mut self.resources_mut(op)?.service;
            match stream.client.get_buffer() {
                Err(status) => Err(status),
                Ok(None) => Ok(None),
                Ok(Some(packet)) => {
                    let frames = packet.frames;
                    let packet_bytes = frames as usize * frame_size;
                    let copied = if packet.flags.silent {
                        let copied = packet_bytes.min(dest.len());
                        dest[..copied].fill(0);
                        stream.carry.write_silence(packet_bytes - copied);
                        copied
                    } else {
                        let data = &packet.data[..packet_bytes.min(packet.data.len())];
                        let copied = data.len().min(dest.len());
                        dest[..copied].copy_from_slice(&data[..copied]);
                        stream.carry.write(&data[copied..]);
                        copied
                    };
                    stream.client.release_buffer(frames).map(|()| Some((copied, frames)))
                }
            }
        };

        match result {
            Ok(Some((copied, frames))) => {
                self.pending_frames += u64::from(frames);
                Ok(Some(copied))
            }
            Ok(None) => Ok(None),
            Err(status) => Err(self.io_error(op, status)),
        }
    }

    /// Discard queued packets and any carried-over bytes.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        const OP: &str = "flush";
        self.drain_notifications();
        let status = {
            let stream = &mut self.resources_mut(OP)?.service;
            stream.carry.reset();
            loop {
                match stream.client.get_buffer() {
                    Ok(Some(packet)) => {
                        let frames = packet.frames;
                        if let Err(status) = stream.client.release_buffer(frames) {
                            break Some(status);
                        }
                    }
                    Ok(None) => break None,
                    Err(status) => break Some(status),
                }
            }
        };
        if let Some(status) = status {
            return Err(self.io_error(OP, status));
        }
        if !self.is_running() {
            let reset = self.resources_mut(OP)?.client.reset();
            reset.map_err(|status| self.io_error(OP, status))?;
        }
        self.pending_frames = 0;
        log::debug!("[{}] flushed", self.session_id());
        Ok(())
    }

    /// Raise stop-requested (unblocking any in-flight read), stop the device
    /// stream, then flush.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.halt()?;
        if let Err(err) = self.flush() {
            log::warn!("[{}] flush after stop failed: {err}", self.session_id());
        }
        Ok(())
    }

    /// Captured frames ready to read, including carried-over bytes;
    /// `-1` if the count overflows.
    pub fn available(&self) -> Result<i32, EngineError> {
        const OP: &str = "available";
        let padding = self.current_padding(OP)?;
        let carried = self.resources(OP)?.service.carry.count() / self.frame_size();
        Ok(frames_to_available(u64::from(padding) + carried as u64))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::backend::simulated::{EndpointConfig, SimulatedBackend};
    use crate::backend::simulated_client::SimStream;
    use crate::engine::AudioEngine;
    use crate::models::audio_format::AudioFormat;
    use crate::traits::notification::DeviceProperty;

    const MIC: &str = "{0.0.1.00000000}.{mic}";

    fn setup() -> (SimulatedBackend, InputSession, Arc<SimStream>) {
        let backend = SimulatedBackend::new();
        backend.add_endpoint(EndpointConfig::capture(MIC, AudioFormat::pcm(48000, 16, 2)));
        let engine = AudioEngine::new(Arc::new(backend.clone())).unwrap();
        let port = engine.list_ports().unwrap().remove(0);
        let mut session = engine
            .open_input(&port, &StreamConfiguration::new(AudioFormat::pcm(48000, 16, 2), 1920))
            .unwrap();
        session.start().unwrap();
        let stream = backend.endpoint(MIC).unwrap().stream().unwrap();
        (backend, session, stream)
    }

    fn bytes(range: std::ops::Range<u8>) -> Vec<u8> {
        range.collect()
    }

    #[test]
    fn reads_queued_packets() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..16), false);
        stream.push_capture(&bytes(16..32), false);

        let mut buffer = [0u8; 32];
        assert_eq!(session.read(&mut buffer, 0, 32).unwrap(), 32);
        assert_eq!(buffer.to_vec(), bytes(0..32));
        assert_eq!(session.frame_position().unwrap(), 8);
        assert_eq!(session.pending_frames(), 8);
    }

    #[test]
    fn packet_remainder_is_carried_to_next_read() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..32), false);

        let mut first = [0u8; 12];
        assert_eq!(session.read(&mut first, 0, 12).unwrap(), 12);
        assert_eq!(first.to_vec(), bytes(0..12));
        // packet released whole; the remaining 20 bytes are 5 frames
        assert_eq!(stream.padding(), 0);
        assert_eq!(session.available().unwrap(), 5);

        let mut rest = [0u8; 20];
        assert_eq!(session.read(&mut rest, 0, 20).unwrap(), 20);
        assert_eq!(rest.to_vec(), bytes(12..32));
        assert_eq!(session.available().unwrap(), 0);
    }

    #[test]
    fn silent_packets_read_as_zeros() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&[0x55; 16], true);

        let mut buffer = [0xAAu8; 24];
        assert_eq!(session.read(&mut buffer, 4, 16).unwrap(), 16);
        assert_eq!(&buffer[..4], &[0xAA; 4]);
        assert_eq!(&buffer[4..20], &[0u8; 16]);
        assert_eq!(&buffer[20..], &[0xAA; 4]);
    }

    #[test]
    fn read_blocks_until_data_arrives() {
        let (_backend, mut session, stream) = setup();
        let producer = {
            let stream = Arc::clone(&stream);
            thread::spawn(move || {
                for chunk in 0..4u8 {
                    thread::sleep(Duration::from_millis(15));
                    stream.push_capture(&[chunk; 8], false);
                }
            })
        };

        let mut buffer = [0u8; 32];
        assert_eq!(session.read(&mut buffer, 0, 32).unwrap(), 32);
        producer.join().unwrap();
        assert_eq!(&buffer[24..], &[3u8; 8]);
    }

    #[test]
    fn interrupt_returns_partial_read() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..8), false);
        let handle = session.interrupt_handle().unwrap();
        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            handle.interrupt();
        });

        let mut buffer = [0u8; 64];
        assert_eq!(session.read(&mut buffer, 0, 64).unwrap(), 8);
        interrupter.join().unwrap();
    }

    #[test]
    fn device_removal_during_blocking_read_is_invalidation() {
        let (backend, mut session, _stream) = setup();
        let unplug = {
            let backend = backend.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                backend.remove_device(MIC);
            })
        };

        let mut buffer = [0u8; 64];
        let err = session.read(&mut buffer, 0, 64).unwrap_err();
        unplug.join().unwrap();
        assert_eq!(err, EngineError::DeviceInvalidated { op: "read" });
    }

    #[test]
    fn interface_disabled_during_blocking_read_is_invalidation() {
        let (backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..8), false);
        let toggle = {
            let backend = backend.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(60));
                backend.change_property(MIC, DeviceProperty::InterfaceEnabled);
            })
        };

        let mut buffer = [0u8; 64];
        let err = session.read(&mut buffer, 0, 64).unwrap_err();
        toggle.join().unwrap();
        assert_eq!(err, EngineError::DeviceInvalidated { op: "read" });
        assert!(matches!(session.start(), Err(EngineError::DeviceInvalidated { op: "start" })));
    }

    #[test]
    fn unrelated_property_change_does_not_interrupt() {
        let (backend, mut session, stream) = setup();
        backend.change_property(MIC, DeviceProperty::Other);
        stream.push_capture(&bytes(0..8), false);

        let mut buffer = [0u8; 8];
        assert_eq!(session.read(&mut buffer, 0, 8).unwrap(), 8);
    }

    #[test]
    fn flush_discards_queued_and_carried_audio() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..32), false);
        let mut head = [0u8; 4];
        session.read(&mut head, 0, 4).unwrap();
        stream.push_capture(&bytes(32..48), false);

        session.flush().unwrap();
        assert_eq!(session.available().unwrap(), 0);
        assert_eq!(session.pending_frames(), 0);

        stream.push_capture(&bytes(100..104), false);
        let mut next = [0u8; 4];
        session.read(&mut next, 0, 4).unwrap();
        assert_eq!(next.to_vec(), bytes(100..104));
    }

    #[test]
    fn stop_unblocks_and_stops_the_device() {
        let (_backend, mut session, stream) = setup();
        stream.push_capture(&bytes(0..16), false);
        session.stop().unwrap();

        assert!(!stream.is_running());
        assert_eq!(stream.padding(), 0);
        let mut buffer = [0u8; 16];
        // stop request is still raised: no data, clean zero-length return
        assert_eq!(session.read(&mut buffer, 0, 16).unwrap(), 0);
    }

    #[test]
    fn input_session_on_render_port_is_rejected() {
        let backend = SimulatedBackend::new();
        backend.add_endpoint(EndpointConfig::render("{speakers}", AudioFormat::pcm(48000, 16, 2)));
        let engine = AudioEngine::new(Arc::new(backend.clone())).unwrap();
        let port = engine.list_ports().unwrap().remove(0);

        let err = engine.open_input(&port, &StreamConfiguration::default()).err().unwrap();
        assert_eq!(err.status(), Some(StatusCode::AUDCLNT_E_WRONG_ENDPOINT_TYPE));
    }
}
