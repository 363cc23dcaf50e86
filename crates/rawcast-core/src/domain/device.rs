//! Device handles, device classes, and the immutable device record.
//!
//! # Identity is session-scoped
//!
//! The OS hands out a pointer-sized *handle* for each attached raw-input
//! device.  Handles are unique among the devices attached right now, inside
//! this process, but nothing more: unplugging and replugging a keyboard, or
//! rebooting the host, may yield a different handle.  The stable id derived
//! from a handle inherits exactly that guarantee.  Downstream consumers that
//! need permanent hardware identity must build it themselves (for example
//! from the device interface path in [`DeviceRecord::display_name`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display name used when the OS cannot resolve a device's interface path.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/// Opaque, OS-assigned identifier for an attached input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    /// Wraps a raw handle value as returned by the OS.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric handle value.
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// Derives the wire-protocol device identifier for this handle.
    ///
    /// The id is `"0x"` followed by the uppercase hexadecimal digits of the
    /// handle value, without zero padding.  It is a pure function of the
    /// handle: the same handle always yields the same id, and two distinct
    /// handles never share one.
    ///
    /// ```rust
    /// use rawcast_core::DeviceHandle;
    ///
    /// assert_eq!(DeviceHandle::from_raw(0x1A2B).stable_id(), "0x1A2B");
    /// ```
    pub fn stable_id(self) -> String {
        format!("0x{:X}", self.0)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// The two raw-input device classes rawcast tracks.
///
/// Every other HID class (game controllers, touchpads exposed as generic HID,
/// vendor collections) is discarded during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Keyboard,
    Mouse,
}

impl DeviceClass {
    /// The value of the `type` field on the wire.
    pub const fn wire_name(self) -> &'static str {
        match self {
            DeviceClass::Keyboard => "keyboard",
            DeviceClass::Mouse => "mouse",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Keyboard => f.write_str("Keyboard"),
            DeviceClass::Mouse => f.write_str("Mouse"),
        }
    }
}

/// Everything rawcast knows about one attached device.
///
/// A record is created the first time a handle is observed (enumeration, or
/// an event from a handle enumeration has not seen yet) and is never mutated
/// afterwards; it is only ever replaced or removed as a whole.  Fields are
/// therefore private with read-only accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    handle: DeviceHandle,
    class: DeviceClass,
    display_name: String,
    stable_id: String,
}

impl DeviceRecord {
    /// Creates a record, computing the stable id once from `handle`.
    ///
    /// A `display_name` of `None` (name resolution failed) is replaced by
    /// [`UNKNOWN_DEVICE_NAME`].
    pub fn new(handle: DeviceHandle, class: DeviceClass, display_name: Option<String>) -> Self {
        Self {
            handle,
            class,
            display_name: display_name.unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string()),
            stable_id: handle.stable_id(),
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// The OS device interface path, or [`UNKNOWN_DEVICE_NAME`].
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The identifier sent as `device_id` on the wire.
    pub fn stable_id(&self) -> &str {
        &self.stable_id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
