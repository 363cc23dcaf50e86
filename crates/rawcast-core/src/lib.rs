//! # rawcast-core
//!
//! Shared library for rawcast containing the device identity types, the
//! normalized input event model, and the line-delimited JSON wire codec.
//!
//! This crate is used by the capture service and by the `rawcast-tap` client.
//! It has zero dependencies on OS APIs or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! rawcast watches every keyboard and mouse attached to a Windows machine
//! *individually*.  Normal applications only see "the keyboard"; rawcast sees
//! "keyboard `0x1A2B` pressed A" and "mouse `0x3C4D` moved 4 pixels right", and
//! streams those facts to any number of TCP clients, one JSON object per line.
//!
//! This crate (`rawcast-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – What a device is (handle, class, stable id) and what an
//!   input event is (keyboard key-down or relative mouse motion).
//!
//! - **`protocol`** – How an event travels over the wire: a single line of
//!   UTF-8 JSON terminated by `\n`.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rawcast_core::InputEvent` instead of `rawcast_core::domain::event::InputEvent`.
pub use domain::device::{DeviceClass, DeviceHandle, DeviceRecord, UNKNOWN_DEVICE_NAME};
pub use domain::event::{EventPayload, InputEvent};
pub use protocol::codec::{decode_line, encode_event, encode_line, ProtocolError};
