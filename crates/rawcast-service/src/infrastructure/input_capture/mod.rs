//! Input capture infrastructure: OS raw-input adapters.
//!
//! On Windows, a dedicated thread owns a message-only window registered for
//! raw keyboard and mouse input (`RIDEV_INPUTSINK`, so delivery does not
//! depend on focus) and for device arrival/removal notifications
//! (`RIDEV_DEVNOTIFY`).  Each `WM_INPUT` / `WM_INPUT_DEVICE_CHANGE` message is
//! decoded into a [`RawInputPacket`] and pushed into an `mpsc` channel that the
//! capture loop drains.
//!
//! # Why a channel? (for beginners)
//!
//! The window procedure runs inside the OS message dispatch and should return
//! quickly.  Sending a small `Copy` packet through a channel is cheap; all the
//! real work (device lookup, filtering, network fan-out) happens on the
//! consumer side of the channel, outside the OS callback.
//!
//! # Testability
//!
//! [`InputSource`] and [`DeviceSource`](crate::application::device_registry::DeviceSource)
//! are traits, so tests inject synthetic packets and device lists through
//! [`mock::MockInputSource`] and [`mock::ScriptedDeviceSource`] without touching
//! the OS.

use std::sync::{mpsc, Arc};

use rawcast_core::DeviceHandle;

use crate::application::device_registry::DeviceSource;

pub mod mock;
pub mod payload;

#[cfg(target_os = "windows")]
pub mod windows;

/// Keyboard flag bit marking a key release (`RI_KEY_BREAK`).
pub const KEY_BREAK: u16 = 0x0001;

/// One raw-input message, in OS-neutral form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputPacket {
    /// A keyboard make or break transition.
    Keyboard {
        device: DeviceHandle,
        /// Windows virtual-key code.
        vkey: u16,
        /// Raw keyboard flags; [`KEY_BREAK`] is set for key-up.
        flags: u16,
        /// Milliseconds since host boot when the message was read.
        time_ms: u64,
    },
    /// Relative mouse motion and/or button transitions.
    Mouse {
        device: DeviceHandle,
        dx: i32,
        dy: i32,
        /// `RI_MOUSE_*` transition bits.
        button_flags: u16,
        time_ms: u64,
    },
    /// A device was attached or detached.
    DeviceChange {
        device: DeviceHandle,
        change: DeviceChange,
    },
}

/// Direction of a hotplug notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Arrival,
    Removal,
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The OS refused the raw-input registration.
    #[error("raw input registration failed: {0}")]
    RegistrationFailed(String),

    /// The message-only window could not be created.
    #[error("failed to create raw input window: {0}")]
    WindowCreationFailed(String),

    /// `start()` was called on a source that is already running.
    #[error("input source is already running")]
    AlreadyStarted,

    /// The capture thread could not be spawned.
    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting raw input production.
///
/// The production implementation is `windows::WindowsInputSource`; tests use
/// [`mock::MockInputSource`].
pub trait InputSource: Send + Sync {
    /// Registers with the OS and returns the packet stream.
    ///
    /// Returns only once registration has either succeeded or failed.
    fn start(&self) -> Result<mpsc::Receiver<RawInputPacket>, CaptureError>;

    /// Unblocks the OS message wait and closes the packet stream.
    ///
    /// Idempotent; a no-op when the source was never started.
    fn stop(&self);
}

/// Builds the OS input and device sources for the current platform.
///
/// # Errors
///
/// [`CaptureError::UnsupportedPlatform`] on hosts without a raw-input adapter.
#[cfg(target_os = "windows")]
pub fn os_sources() -> Result<(Box<dyn InputSource>, Arc<dyn DeviceSource>), CaptureError> {
    Ok((
        Box::new(windows::WindowsInputSource::new()),
        Arc::new(windows::WindowsDeviceSource),
    ))
}

/// Builds the OS input and device sources for the current platform.
///
/// # Errors
///
/// [`CaptureError::UnsupportedPlatform`] on hosts without a raw-input adapter.
#[cfg(not(target_os = "windows"))]
pub fn os_sources() -> Result<(Box<dyn InputSource>, Arc<dyn DeviceSource>), CaptureError> {
    Err(CaptureError::UnsupportedPlatform(format!(
        "raw input capture requires Windows (running on {})",
        std::env::consts::OS
    )))
}
