//! Infrastructure layer for the rawcast service.
//!
//! Contains OS-facing adapters: raw input capture, the TCP broadcast server,
//! configuration file loading and log output setup.

pub mod input_capture;
pub mod logging;
pub mod network;
pub mod storage;
