//! Scripted input and device sources for tests.
//!
//! Both mocks are cheap to clone and every clone shares the same state, so a
//! test can hand one clone to the capture loop and keep another to inject
//! packets or change the device list while the loop runs.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex, MutexGuard, PoisonError,
};

use rawcast_core::DeviceHandle;

use super::payload::PayloadError;
use super::{CaptureError, InputSource, RawInputPacket};
use crate::application::device_registry::{AttachedDevice, DeviceSource, RawDeviceKind};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── MockInputSource ──────────────────────────────────────────────────────────

#[derive(Default)]
struct InputState {
    sender: Mutex<Option<Sender<RawInputPacket>>>,
    fail_registration: AtomicBool,
    stop_count: AtomicUsize,
}

/// An [`InputSource`] that delivers whatever packets the test injects.
#[derive(Clone, Default)]
pub struct MockInputSource {
    state: Arc<InputState>,
}

impl MockInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `start()` calls fail as if the OS refused the
    /// raw-input registration.
    pub fn fail_registration(&self, fail: bool) {
        self.state.fail_registration.store(fail, Ordering::SeqCst);
    }

    /// Injects a synthetic packet, as if read from the OS.
    ///
    /// Returns `false` when the source is not running or the receiver has been
    /// dropped.
    pub fn inject(&self, packet: RawInputPacket) -> bool {
        match lock(&self.state.sender).as_ref() {
            Some(sender) => sender.send(packet).is_ok(),
            None => false,
        }
    }

    /// `true` between a successful `start()` and the next `stop()`.
    pub fn is_running(&self) -> bool {
        lock(&self.state.sender).is_some()
    }

    /// Number of times `stop()` was called.
    pub fn stop_count(&self) -> usize {
        self.state.stop_count.load(Ordering::SeqCst)
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::Receiver<RawInputPacket>, CaptureError> {
        if self.state.fail_registration.load(Ordering::SeqCst) {
            return Err(CaptureError::RegistrationFailed(
                "mock registration failure".to_string(),
            ));
        }
        let mut sender = lock(&self.state.sender);
        if sender.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        *sender = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender closes the stream.
        lock(&self.state.sender).take();
    }
}

// ── ScriptedDeviceSource ─────────────────────────────────────────────────────

#[derive(Default)]
struct DeviceScript {
    devices: Vec<AttachedDevice>,
    names: HashMap<DeviceHandle, String>,
    fail_enumeration: bool,
    enumerations: usize,
}

/// A [`DeviceSource`] backed by a mutable, in-memory device list.
#[derive(Clone, Default)]
pub struct ScriptedDeviceSource {
    script: Arc<Mutex<DeviceScript>>,
}

impl ScriptedDeviceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<AttachedDevice>) -> Self {
        let source = Self::new();
        lock(&source.script).devices = devices;
        source
    }

    /// Adds a device to the list the next enumeration will see.
    pub fn attach(&self, handle: DeviceHandle, kind: RawDeviceKind) {
        let mut script = lock(&self.script);
        script.devices.retain(|d| d.handle != handle);
        script.devices.push(AttachedDevice { handle, kind });
    }

    /// Removes a device from the list the next enumeration will see.
    pub fn detach(&self, handle: DeviceHandle) {
        lock(&self.script).devices.retain(|d| d.handle != handle);
    }

    /// Sets the name `device_name` reports for `handle`.  Unnamed handles
    /// report `None`.
    pub fn set_name(&self, handle: DeviceHandle, name: impl Into<String>) {
        lock(&self.script).names.insert(handle, name.into());
    }

    pub fn fail_enumeration(&self, fail: bool) {
        lock(&self.script).fail_enumeration = fail;
    }

    /// Number of `attached_devices()` calls so far, failed ones included.
    pub fn enumeration_count(&self) -> usize {
        lock(&self.script).enumerations
    }
}

impl DeviceSource for ScriptedDeviceSource {
    fn attached_devices(&self) -> Result<Vec<AttachedDevice>, PayloadError> {
        let mut script = lock(&self.script);
        script.enumerations += 1;
        if script.fail_enumeration {
            return Err(PayloadError::SizeQuery { code: None });
        }
        Ok(script.devices.clone())
    }

    fn device_name(&self, handle: DeviceHandle) -> Option<String> {
        lock(&self.script).names.get(&handle).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_input_source_delivers_injected_packets() {
        // Arrange
        let source = MockInputSource::new();
        let rx = source.start().expect("start should succeed");
        let packet = RawInputPacket::Keyboard {
            device: DeviceHandle::from_raw(1),
            vkey: 0x41,
            flags: 0,
            time_ms: 5,
        };

        // Act
        let delivered = source.inject(packet);

        // Assert
        assert!(delivered);
        assert_eq!(rx.recv().expect("should receive packet"), packet);
    }

    #[test]
    fn test_mock_input_source_stop_closes_stream() {
        // Arrange
        let source = MockInputSource::new();
        let rx = source.start().expect("start should succeed");

        // Act
        source.stop();

        // Assert
        assert!(rx.recv().is_err(), "stream should be closed after stop()");
        assert!(!source.is_running());
        assert_eq!(source.stop_count(), 1);
    }

    #[test]
    fn test_mock_input_source_inject_before_start_is_rejected() {
        let source = MockInputSource::new();
        assert!(!source.inject(RawInputPacket::Mouse {
            device: DeviceHandle::from_raw(2),
            dx: 1,
            dy: 1,
            button_flags: 0,
            time_ms: 0,
        }));
    }

    #[test]
    fn test_mock_input_source_can_fail_registration() {
        let source = MockInputSource::new();
        source.fail_registration(true);

        assert!(matches!(
            source.start(),
            Err(CaptureError::RegistrationFailed(_))
        ));
        assert!(!source.is_running());
    }

    #[test]
    fn test_mock_input_source_rejects_second_start() {
        let source = MockInputSource::new();
        let _rx = source.start().unwrap();

        assert!(matches!(source.start(), Err(CaptureError::AlreadyStarted)));
    }

    #[test]
    fn test_scripted_device_source_tracks_attach_detach_and_names() {
        // Arrange
        let source = ScriptedDeviceSource::new();
        let handle = DeviceHandle::from_raw(0x10);

        // Act
        source.attach(handle, RawDeviceKind::Keyboard);
        source.set_name(handle, r"\\?\HID#KBD");
        let listed = source.attached_devices().unwrap();
        source.detach(handle);
        let after_detach = source.attached_devices().unwrap();

        // Assert
        assert_eq!(listed.len(), 1);
        assert_eq!(source.device_name(handle).as_deref(), Some(r"\\?\HID#KBD"));
        assert!(after_detach.is_empty());
        assert_eq!(source.enumeration_count(), 2);
    }

    #[test]
    fn test_scripted_device_source_failure() {
        let source = ScriptedDeviceSource::new();
        source.fail_enumeration(true);

        assert!(source.attached_devices().is_err());
        assert_eq!(source.enumeration_count(), 1);
    }
}
