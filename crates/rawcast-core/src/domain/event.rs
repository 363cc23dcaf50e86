//! The normalized input event streamed to clients.
//!
//! An [`InputEvent`] is ephemeral: it is produced by the capture loop from one
//! raw-input message, encoded once, written to every connected client, and
//! dropped.  Nothing in rawcast stores events.

use serde::{Deserialize, Serialize};

use super::device::DeviceClass;

/// One keyboard or mouse event, attributed to the device that produced it.
///
/// The serde layout mirrors the wire schema directly: `payload` is flattened
/// into the outer object and tagged by `type`, so the serialized field order
/// is `device_id`, `type`, class fields, `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Stable id of the producing device (see [`crate::DeviceHandle::stable_id`]).
    pub device_id: String,
    /// Class-specific data.
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Milliseconds since host boot, monotonic.
    pub timestamp: u64,
}

/// Class-specific event data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    /// A key was pressed.
    Keyboard {
        /// Windows virtual-key code (e.g. `0x41` for A).
        vkey: u16,
    },
    /// The mouse moved or a button/wheel flag was reported.
    Mouse {
        /// Relative horizontal motion in raw device counts.
        dx: i32,
        /// Relative vertical motion in raw device counts.
        dy: i32,
        /// Raw-input button transition flags (`RI_MOUSE_*` bits).
        buttons: u16,
    },
}

impl EventPayload {
    pub fn class(&self) -> DeviceClass {
        match self {
            EventPayload::Keyboard { .. } => DeviceClass::Keyboard,
            EventPayload::Mouse { .. } => DeviceClass::Mouse,
        }
    }
}

impl InputEvent {
    pub fn keyboard(device_id: impl Into<String>, vkey: u16, timestamp: u64) -> Self {
        Self {
            device_id: device_id.into(),
            payload: EventPayload::Keyboard { vkey },
            timestamp,
        }
    }

    pub fn mouse(
        device_id: impl Into<String>,
        dx: i32,
        dy: i32,
        buttons: u16,
        timestamp: u64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            payload: EventPayload::Mouse { dx, dy, buttons },
            timestamp,
        }
    }

    /// The class of the device that produced this event.
    pub fn class(&self) -> DeviceClass {
        self.payload.class()
    }
}
