//! Two-phase "query size, then fetch" helper for variable-length OS payloads.
//!
//! Every raw-input API rawcast calls (`GetRawInputData`,
//! `GetRawInputDeviceList`, `GetRawInputDeviceInfoW`) follows the same
//! protocol: call once with no buffer to learn the required element count,
//! allocate, then call again to fill the buffer.  [`fetch_sized`] wraps that
//! dance so the capture code only ever sees a sized `Vec<T>` or a typed
//! [`PayloadError`].
//!
//! The helper itself has no OS dependency; the Windows adapter passes closures
//! that forward to the real API.  That keeps it unit-testable on any host.

use thiserror::Error;

/// Returned by the Win32 raw-input functions to signal failure.
pub const OS_CALL_FAILED: u32 = u32::MAX;

/// Failure while reading a variable-length OS payload.
///
/// `code` is the OS error code captured immediately after the failing call
/// (`GetLastError` on Windows), when the OS provided one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload size query failed (os error {code:?})")]
    SizeQuery { code: Option<i32> },

    #[error("payload fetch failed (os error {code:?})")]
    Fetch { code: Option<i32> },

    #[error("payload truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unsupported raw input device class {0}")]
    UnsupportedClass(u32),
}

/// Runs the size-query / fetch protocol against `call`.
///
/// `call` receives `None` for the size query and `Some(buffer)` for the
/// fetch, together with the in/out element count.  It must return the raw
/// API result: `0` for a successful size query, the number of elements
/// written for a successful fetch, and [`OS_CALL_FAILED`] on error.
///
/// A reported size of zero yields an empty vector without a second call.
///
/// # Errors
///
/// [`PayloadError::SizeQuery`] or [`PayloadError::Fetch`] with the OS error
/// code of the failing phase.  Nothing is retried.
pub fn fetch_sized<T, F>(mut call: F) -> Result<Vec<T>, PayloadError>
where
    T: Copy + Default,
    F: FnMut(Option<&mut [T]>, &mut u32) -> u32,
{
    let mut count: u32 = 0;
    if call(None, &mut count) != 0 {
        return Err(PayloadError::SizeQuery {
            code: last_os_error_code(),
        });
    }
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![T::default(); count as usize];
    let written = call(Some(&mut buf), &mut count);
    if written == OS_CALL_FAILED {
        return Err(PayloadError::Fetch {
            code: last_os_error_code(),
        });
    }

    buf.truncate(written as usize);
    Ok(buf)
}

/// Checks that a fetched byte payload is long enough to hold a structure of
/// `expected` bytes.
///
/// # Errors
///
/// [`PayloadError::Truncated`] when `buf` is shorter than `expected`.
pub fn ensure_len(buf: &[u8], expected: usize) -> Result<(), PayloadError> {
    if buf.len() < expected {
        return Err(PayloadError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn last_os_error_code() -> Option<i32> {
    std::io::Error::last_os_error().raw_os_error()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
