//! DeviceRegistry: the table of currently attached keyboards and mice.
//!
//! Maps each OS device handle to its immutable [`DeviceRecord`].  The table
//! is rebuilt wholesale by [`DeviceRegistry::enumerate`] (startup and every
//! hotplug notification) and patched point-wise by
//! [`DeviceRegistry::add_device_if_missing`] when input arrives from a handle
//! enumeration has not seen yet.
//!
//! # Locking
//!
//! One mutex guards the whole table.  OS queries (device list, device names)
//! run before the lock is taken, so the critical section is only ever a map
//! replace, insert or remove.  The registry never touches the broadcast
//! server's client lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rawcast_core::{DeviceClass, DeviceHandle, DeviceRecord};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::infrastructure::input_capture::payload::PayloadError;

/// Kind of a device as reported by the OS device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDeviceKind {
    Keyboard,
    Mouse,
    /// Any other HID collection (game controllers, vendor devices, ...).
    Hid,
}

impl RawDeviceKind {
    /// The tracked class for this kind, or `None` for classes rawcast ignores.
    pub fn device_class(self) -> Option<DeviceClass> {
        match self {
            RawDeviceKind::Keyboard => Some(DeviceClass::Keyboard),
            RawDeviceKind::Mouse => Some(DeviceClass::Mouse),
            RawDeviceKind::Hid => None,
        }
    }
}

/// One entry of the OS device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedDevice {
    pub handle: DeviceHandle,
    pub kind: RawDeviceKind,
}

/// OS-facing queries the registry needs.
///
/// Infrastructure implements this with the raw-input device APIs; tests use
/// a mock.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceSource: Send + Sync {
    /// Lists every attached HID device, of any class.
    fn attached_devices(&self) -> Result<Vec<AttachedDevice>, PayloadError>;

    /// Resolves the device interface path for `handle`; `None` when the OS
    /// cannot provide one.
    fn device_name(&self, handle: DeviceHandle) -> Option<String>;
}

/// Error type for registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The OS device list could not be read.  The table was left unchanged.
    #[error("device enumeration failed: {0}")]
    Enumeration(#[source] PayloadError),
}

/// Thread-safe handle → record table.
pub struct DeviceRegistry {
    source: Arc<dyn DeviceSource>,
    devices: Mutex<HashMap<DeviceHandle, Arc<DeviceRecord>>>,
}

impl DeviceRegistry {
    /// Creates an empty registry backed by `source`.
    pub fn new(source: Arc<dyn DeviceSource>) -> Self {
        Self {
            source,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the whole table with the current OS device list, filtered to
    /// keyboards and mice.  Returns the number of tracked devices.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Enumeration`] when the OS query fails; the
    /// previous table is kept as-is (stale but safe).
    pub fn enumerate(&self) -> Result<usize, RegistryError> {
        let attached = match self.source.attached_devices() {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "device enumeration failed; keeping previous device table");
                return Err(RegistryError::Enumeration(e));
            }
        };

        let mut fresh = HashMap::with_capacity(attached.len());
        for device in attached {
            let Some(class) = device.kind.device_class() else {
                trace!(handle = %device.handle, "ignoring non keyboard/mouse device");
                continue;
            };
            let record = self.make_record(device.handle, class);
            debug!(
                handle = %record.handle(),
                class = %record.class(),
                name = record.display_name(),
                "found device"
            );
            fresh.insert(device.handle, Arc::new(record));
        }

        let count = fresh.len();
        *self.table() = fresh;
        info!(count, "device table refreshed");
        Ok(count)
    }

    /// Returns the record for `handle`, if registered.
    pub fn lookup(&self, handle: DeviceHandle) -> Option<Arc<DeviceRecord>> {
        self.table().get(&handle).cloned()
    }

    /// Returns the record for `handle`, registering it with `class` first if
    /// it is not in the table yet.
    ///
    /// Idempotent: concurrent or repeated calls for the same handle leave
    /// exactly one record, and every caller gets that record back.
    pub fn add_device_if_missing(
        &self,
        handle: DeviceHandle,
        class: DeviceClass,
    ) -> Arc<DeviceRecord> {
        if let Some(existing) = self.lookup(handle) {
            return existing;
        }

        // Name resolution is an OS call; keep it outside the lock.
        let candidate = self.make_record(handle, class);

        let mut table = self.table();
        let record = table.entry(handle).or_insert_with(|| {
            info!(
                handle = %handle,
                class = %class,
                name = candidate.display_name(),
                "registered device first seen through input"
            );
            Arc::new(candidate)
        });
        Arc::clone(record)
    }

    /// Removes `handle` from the table.  A no-op when absent.
    pub fn remove(&self, handle: DeviceHandle) -> Option<Arc<DeviceRecord>> {
        let removed = self.table().remove(&handle);
        if let Some(record) = &removed {
            info!(handle = %handle, class = %record.class(), "device removed");
        }
        removed
    }

    /// Number of tracked devices.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// All tracked records, ordered by handle.
    pub fn snapshot(&self) -> Vec<Arc<DeviceRecord>> {
        let mut records: Vec<_> = self.table().values().cloned().collect();
        records.sort_by_key(|r| r.handle());
        records
    }

    fn make_record(&self, handle: DeviceHandle, class: DeviceClass) -> DeviceRecord {
        let name = self.source.device_name(handle);
        if name.is_none() {
            debug!(handle = %handle, "device name unavailable; using placeholder");
        }
        DeviceRecord::new(handle, class, name)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<DeviceHandle, Arc<DeviceRecord>>> {
        // Every critical section is a single map operation, so a panic while
        // holding the lock cannot leave the table half-updated.
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
