//! COM apartment management and HRESULT translation.

use windows::core::HRESULT;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::System::Com::*;

use audio_stream_core::models::status::StatusCode;

/// The calling thread's membership in the multithreaded apartment.
///
/// Entered lazily, once per thread, and left when the thread exits.
struct Apartment {
    owned: bool,
}

impl Apartment {
    fn enter() -> Result<Self, StatusCode> {
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr == RPC_E_CHANGED_MODE {
            // Already a single-threaded apartment; COM is usable but not ours to tear down.
            log::debug!("thread already in an STA, reusing it");
            return Ok(Self { owned: false });
        }
        hr.ok().map_err(|e| status_of(&e))?;
        Ok(Self { owned: true })
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

thread_local! {
    static APARTMENT: Result<Apartment, StatusCode> = Apartment::enter();
}

/// Make sure COM is initialized on the calling thread.
pub(crate) fn ensure_apartment() -> Result<(), StatusCode> {
    APARTMENT.with(|apartment| match apartment {
        Ok(_) => Ok(()),
        Err(status) => Err(*status),
    })
}

/// Raw status of a `windows` crate error.
pub(crate) fn status_of(error: &windows::core::Error) -> StatusCode {
    status_of_hresult(error.code())
}

pub(crate) fn status_of_hresult(hr: HRESULT) -> StatusCode {
    StatusCode(hr.0)
}

/// Shorthand for `windows::core::Result<T>` -> `Result<T, StatusCode>`.
pub(crate) trait IntoStatus<T> {
    fn status(self) -> Result<T, StatusCode>;
}

impl<T> IntoStatus<T> for windows::core::Result<T> {
    fn status(self) -> Result<T, StatusCode> {
        self.map_err(|e| status_of(&e))
    }
}
