//! Line-delimited JSON codec for [`InputEvent`]s.
//!
//! Wire format (one event per line):
//! ```text
//! keyboard: {"device_id":"<hex>","type":"keyboard","vkey":<int>,"timestamp":<uint64>}
//! mouse:    {"device_id":"<hex>","type":"mouse","dx":<int>,"dy":<int>,"buttons":<int>,"timestamp":<uint64>}
//! ```
//!
//! Encoding is stateless: the broadcast server encodes an event exactly once
//! and writes the same bytes to every client.

use thiserror::Error;

use crate::domain::event::InputEvent;
use crate::protocol::LINE_DELIMITER;

/// Errors that can occur while encoding or decoding a wire line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// The line is not a valid event object (malformed JSON, unknown `type`,
    /// missing or out-of-range field).
    #[error("malformed event line: {0}")]
    Decode(#[source] serde_json::Error),

    /// The line contained nothing but whitespace.
    #[error("empty line")]
    EmptyLine,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `event` as one self-contained line of JSON, without the trailing
/// delimiter.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use rawcast_core::{encode_event, InputEvent};
///
/// let line = encode_event(&InputEvent::keyboard("0x1A2B", 65, 1000)).unwrap();
/// assert_eq!(line, r#"{"device_id":"0x1A2B","type":"keyboard","vkey":65,"timestamp":1000}"#);
/// ```
pub fn encode_event(event: &InputEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Encodes `event` and appends the `\n` delimiter, producing the exact bytes
/// written to each client socket.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_line(event: &InputEvent) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(event).map_err(ProtocolError::Encode)?;
    bytes.push(LINE_DELIMITER);
    Ok(bytes)
}

/// Decodes one wire line into an [`InputEvent`].
///
/// Fields are matched by key, so any field order is accepted.  A trailing
/// `\n` or `\r\n` is ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyLine`] for a blank line and
/// [`ProtocolError::Decode`] for anything that is not a valid event object.
pub fn decode_line(line: &str) -> Result<InputEvent, ProtocolError> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    serde_json::from_str(trimmed).map_err(ProtocolError::Decode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
