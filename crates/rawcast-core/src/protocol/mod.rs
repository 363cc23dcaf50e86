//! Protocol module containing the wire constants and the line-JSON codec.
//!
//! # Wire format
//!
//! ```text
//! {"device_id":"0x1A2B","type":"keyboard","vkey":65,"timestamp":123456}\n
//! {"device_id":"0x3C4D","type":"mouse","dx":4,"dy":-2,"buttons":0,"timestamp":123457}\n
//! ```
//!
//! Plain UTF-8 over TCP, one JSON object per line, strictly server → client.
//! There is no handshake and no additional framing.  Consumers must parse each
//! line by key; the field order is fixed for readability only.

pub mod codec;

pub use codec::{decode_line, encode_event, encode_line, ProtocolError};

/// Default TCP port the broadcast server listens on.
pub const DEFAULT_PORT: u16 = 9999;

/// Default ceiling on simultaneously connected clients.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// Terminates every encoded event on the wire.
pub const LINE_DELIMITER: u8 = b'\n';
