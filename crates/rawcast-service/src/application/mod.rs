//! Application layer use cases for the rawcast service.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the domain types in `rawcast_core`
//! (devices, events, the wire codec) and the infrastructure that talks to the
//! OS and the network.  Code here decides *what happens* to an input packet;
//! it never opens a socket or calls a Win32 function itself.  Everything it
//! needs from the outside world arrives through a trait (`InputSource`,
//! `DeviceSource`, `EventSink`), which is why it can be tested with mocks on
//! any platform.
//!
//! # Sub-modules
//!
//! - **`device_registry`** – The table of attached keyboards and mice, keyed by
//!   OS handle.  Filled at startup, extended lazily when an unseen handle
//!   produces input, and trimmed on device removal.
//!
//! - **`capture_loop`** – Consumes raw packets, filters out the ones that carry
//!   nothing worth sending (key releases, zero-motion mouse reports), turns the
//!   rest into `InputEvent`s and hands them to the sink.

pub mod capture_loop;
pub mod device_registry;
