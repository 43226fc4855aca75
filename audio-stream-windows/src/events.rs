//! Win32 event objects backing a session's wait signals.

use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Threading::{
    CreateEventW, ResetEvent, SetEvent, WaitForMultipleObjects, WaitForSingleObject, INFINITE,
};

use audio_stream_core::models::status::StatusCode;
use audio_stream_core::traits::signals::{EventSignals, WaitOutcome};

use crate::com::{status_of, IntoStatus};

/// Stop-requested (manual reset) and buffer-ready (auto reset) events.
///
/// The buffer-ready handle is handed to `IAudioClient::SetEventHandle`, so the
/// audio engine signals it directly.
pub struct Win32EventSignals {
    stop: HANDLE,
    buffer_ready: HANDLE,
}

// SAFETY: Win32 event handles may be signalled and waited on from any thread.
// Both handles are owned by this struct and closed exactly once in Drop.
unsafe impl Send for Win32EventSignals {}
unsafe impl Sync for Win32EventSignals {}

impl Win32EventSignals {
    pub fn new() -> Result<Self, StatusCode> {
        unsafe {
            let stop = CreateEventW(None, true, false, PCWSTR::null()).status()?;
            let buffer_ready = match CreateEventW(None, false, false, PCWSTR::null()) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = CloseHandle(stop);
                    return Err(status_of(&e));
                }
            };
            Ok(Self { stop, buffer_ready })
        }
    }

    pub(crate) fn buffer_ready_handle(&self) -> HANDLE {
        self.buffer_ready
    }
}

impl EventSignals for Win32EventSignals {
    fn raise_buffer_ready(&self) {
        if let Err(e) = unsafe { SetEvent(self.buffer_ready) } {
            log::warn!("SetEvent(buffer ready) failed: {e}");
        }
    }

    fn raise_stop(&self) {
        if let Err(e) = unsafe { SetEvent(self.stop) } {
            log::warn!("SetEvent(stop) failed: {e}");
        }
    }

    fn reset_stop(&self) {
        if let Err(e) = unsafe { ResetEvent(self.stop) } {
            log::warn!("ResetEvent(stop) failed: {e}");
        }
    }

    fn is_stop_raised(&self) -> bool {
        unsafe { WaitForSingleObject(self.stop, 0) == WAIT_OBJECT_0 }
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, StatusCode> {
        let millis = match timeout {
            Some(t) => u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1),
            None => INFINITE,
        };
        // Lowest index wins when several are signalled, so stop comes first.
        let handles = [self.stop, self.buffer_ready];
        let result = unsafe { WaitForMultipleObjects(&handles, false, millis) };
        match result {
            r if r == WAIT_OBJECT_0 => Ok(WaitOutcome::StopRequested),
            r if r.0 == WAIT_OBJECT_0.0 + 1 => Ok(WaitOutcome::BufferReady),
            WAIT_TIMEOUT => Ok(WaitOutcome::TimedOut),
            WAIT_FAILED => Err(status_of(&windows::core::Error::from_win32())),
            other => {
                log::error!("unexpected wait result 0x{:08X}", other.0);
                Err(StatusCode::E_UNEXPECTED)
            }
        }
    }
}

impl Drop for Win32EventSignals {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.buffer_ready);
            let _ = CloseHandle(self.stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn stop_is_level_triggered_and_wins() {
        let signals = Win32EventSignals::new().unwrap();
        signals.raise_buffer_ready();
        signals.raise_stop();
        assert_eq!(signals.wait(Some(Duration::ZERO)).unwrap(), WaitOutcome::StopRequested);
        assert_eq!(signals.wait(Some(Duration::ZERO)).unwrap(), WaitOutcome::StopRequested);

        signals.reset_stop();
        assert!(!signals.is_stop_raised());
        assert_eq!(signals.wait(Some(Duration::ZERO)).unwrap(), WaitOutcome::BufferReady);
        assert_eq!(signals.wait(Some(Duration::from_millis(5))).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn wakes_a_waiter_on_another_thread() {
        let signals = Arc::new(Win32EventSignals::new().unwrap());
        let raiser = Arc::clone(&signals);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            raiser.raise_buffer_ready();
        });
        assert_eq!(signals.wait(Some(Duration::from_secs(5))).unwrap(), WaitOutcome::BufferReady);
        handle.join().unwrap();
    }
}
