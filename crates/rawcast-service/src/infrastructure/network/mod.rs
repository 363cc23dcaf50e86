//! Network infrastructure for the rawcast service.
//!
//! # Sub-modules
//!
//! - **`broadcast_server`** – Accepts TCP clients on the configured port and
//!   fans every captured event out to all of them as one line of JSON.  Each
//!   client gets a reader thread whose only job is noticing the disconnect.

pub mod broadcast_server;

pub use broadcast_server::{BroadcastServer, BroadcastSettings, ServerError};
