//! Integration tests for the rawcast wire format.
//!
//! These tests look at encoded lines the way a downstream consumer does: as
//! independent lines of JSON parsed by key, without access to rawcast's own
//! types.  They pin down the schema from the consumer's point of view.

use rawcast_core::{
    decode_line, encode_event, encode_line,
    protocol::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT, LINE_DELIMITER},
    DeviceClass, DeviceHandle, DeviceRecord, InputEvent,
};
use serde_json::Value;

fn parse(line: &str) -> Value {
    serde_json::from_str(line).expect("every encoded line must be valid JSON")
}

#[test]
fn test_keyboard_line_exposes_schema_keys() {
    // Arrange
    let record = DeviceRecord::new(DeviceHandle::from_raw(0x10041), DeviceClass::Keyboard, None);
    let event = InputEvent::keyboard(record.stable_id(), 65, 42);

    // Act
    let value = parse(&encode_event(&event).unwrap());

    // Assert
    assert_eq!(value["device_id"], "0x10041");
    assert_eq!(value["type"], "keyboard");
    assert_eq!(value["vkey"], 65);
    assert_eq!(value["timestamp"], 42);
    assert_eq!(value.as_object().unwrap().len(), 4, "no extra keys on the wire");
}

#[test]
fn test_mouse_line_exposes_schema_keys() {
    let event = InputEvent::mouse("0x20043", -7, 12, 0x0004, 43);

    let value = parse(&encode_event(&event).unwrap());

    assert_eq!(value["device_id"], "0x20043");
    assert_eq!(value["type"], "mouse");
    assert_eq!(value["dx"], -7);
    assert_eq!(value["dy"], 12);
    assert_eq!(value["buttons"], 4);
    assert_eq!(value["timestamp"], 43);
    assert_eq!(value.as_object().unwrap().len(), 6, "no extra keys on the wire");
}

#[test]
fn test_device_id_uses_hex_alphabet_only() {
    // The id is embedded without escaping, so it must never need any.
    for raw in [0usize, 1, 0xABCDEF, usize::MAX] {
        let id = DeviceHandle::from_raw(raw).stable_id();
        let digits = id.strip_prefix("0x").expect("0x prefix");
        assert!(!digits.is_empty());
        assert!(digits.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }
}

#[test]
fn test_stream_of_lines_splits_on_delimiter() {
    // Arrange: what a client sees after three broadcasts.
    let events = [
        InputEvent::keyboard("0x1", 0x41, 1),
        InputEvent::mouse("0x2", 1, 0, 0, 2),
        InputEvent::keyboard("0x1", 0x42, 3),
    ];
    let mut stream = Vec::new();
    for event in &events {
        stream.extend(encode_line(event).unwrap());
    }

    // Act
    let text = String::from_utf8(stream).expect("wire is UTF-8");
    let decoded: Vec<InputEvent> = text
        .split_terminator(LINE_DELIMITER as char)
        .map(|line| decode_line(line).expect("decode"))
        .collect();

    // Assert
    assert_eq!(decoded, events);
}

#[test]
fn test_default_wire_constants() {
    assert_eq!(DEFAULT_PORT, 9999);
    assert_eq!(DEFAULT_MAX_CLIENTS, 10);
    assert_eq!(LINE_DELIMITER, b'\n');
}
