//! rawcast-tap: prints the rawcast event stream in human-readable form.
//!
//! Connects to a running `rawcast` service as a plain TCP client and renders
//! each line, e.g.:
//!
//! ```text
//! [123456] KEYBOARD 0x1A2B key=A (vk=65)
//! [123457] MOUSE    0x3C4D dx=+4 dy=-2 buttons=0x0001
//! ```
//!
//! Malformed lines are reported on stderr and skipped.  The tap exits when the
//! service closes the connection.

use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use anyhow::Context;
use clap::Parser;
use rawcast_core::protocol::{DEFAULT_PORT, LINE_DELIMITER};
use rawcast_core::{decode_line, EventPayload, InputEvent};
use tracing::{info, warn};

use rawcast_service::infrastructure::logging::init_logging;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Plain TCP client for the rawcast event stream.
#[derive(Debug, Parser)]
#[command(
    name = "rawcast-tap",
    about = "Print the rawcast event stream in human-readable form",
    version
)]
struct Cli {
    /// Hostname or IP address of the rawcast service.
    #[arg(long, default_value = "127.0.0.1", env = "RAWCAST_TAP_HOST")]
    host: String,

    /// TCP port of the rawcast service.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "RAWCAST_TAP_PORT")]
    port: u16,
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Human name for a Windows virtual-key code.
fn key_name(vkey: u16) -> String {
    match vkey {
        // '0'..'9' and 'A'..'Z' share their ASCII codes.
        0x30..=0x39 | 0x41..=0x5A => char::from(vkey as u8).to_string(),
        0x08 => "BACKSPACE".to_string(),
        0x09 => "TAB".to_string(),
        0x0D => "ENTER".to_string(),
        0x10 => "SHIFT".to_string(),
        0x11 => "CTRL".to_string(),
        0x12 => "ALT".to_string(),
        0x1B => "ESC".to_string(),
        0x20 => "SPACE".to_string(),
        0x25 => "LEFT".to_string(),
        0x26 => "UP".to_string(),
        0x27 => "RIGHT".to_string(),
        0x28 => "DOWN".to_string(),
        0x70..=0x87 => format!("F{}", vkey - 0x6F),
        other => format!("VK_{other}"),
    }
}

fn render(event: &InputEvent) -> String {
    match event.payload {
        EventPayload::Keyboard { vkey } => format!(
            "[{}] KEYBOARD {} key={} (vk={})",
            event.timestamp,
            event.device_id,
            key_name(vkey),
            vkey
        ),
        EventPayload::Mouse { dx, dy, buttons } => format!(
            "[{}] MOUSE    {} dx={:+} dy={:+} buttons=0x{:04X}",
            event.timestamp, event.device_id, dx, dy, buttons
        ),
    }
}

/// Renders every line from `reader` into `out` until end of stream.
///
/// A line that is not UTF-8 or not a valid event is logged and skipped.
/// Returns the number of events printed.
fn pump<R: BufRead, W: Write>(mut reader: R, out: &mut W) -> io::Result<usize> {
    let mut buf = Vec::new();
    let mut printed = 0;
    loop {
        buf.clear();
        if reader.read_until(LINE_DELIMITER, &mut buf)? == 0 {
            return Ok(printed);
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, bytes = buf.len(), "line is not valid UTF-8");
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line) {
            Ok(event) => {
                writeln!(out, "{}", render(&event))?;
                printed += 1;
            }
            Err(e) => warn!(error = %e, line = line.trim_end(), "malformed line"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging("warn", None).context("failed to initialise logging")?;

    let addr = format!("{}:{}", cli.host, cli.port);
    let stream =
        TcpStream::connect(&addr).with_context(|| format!("failed to connect to {addr}"))?;
    info!(%addr, "connected");

    let stdout = std::io::stdout();
    let printed =
        pump(BufReader::new(stream), &mut stdout.lock()).context("connection error")?;

    info!(printed, "server closed the connection");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_keyboard_letter() {
        // Arrange
        let event = InputEvent::keyboard("0x1A2B", 65, 123456);

        // Act
        let text = render(&event);

        // Assert
        assert_eq!(text, "[123456] KEYBOARD 0x1A2B key=A (vk=65)");
    }

    #[test]
    fn test_render_mouse_signs_and_hex_buttons() {
        let event = InputEvent::mouse("0x3C4D", 4, -2, 1, 123457);

        assert_eq!(
            render(&event),
            "[123457] MOUSE    0x3C4D dx=+4 dy=-2 buttons=0x0001"
        );
    }

    #[test]
    fn test_render_mouse_zero_motion_is_signed() {
        let event = InputEvent::mouse("0x1", 0, 0, 0x0400, 1);

        assert!(render(&event).contains("dx=+0 dy=+0 buttons=0x0400"));
    }

    #[test]
    fn test_key_name_digits_and_named_keys() {
        assert_eq!(key_name(0x31), "1");
        assert_eq!(key_name(0x20), "SPACE");
        assert_eq!(key_name(0x0D), "ENTER");
        assert_eq!(key_name(0x70), "F1");
        assert_eq!(key_name(0x87), "F24");
    }

    #[test]
    fn test_key_name_falls_back_to_code() {
        assert_eq!(key_name(0xBA), "VK_186");
    }

    #[test]
    fn test_pump_skips_invalid_utf8_and_malformed_lines() {
        // Arrange
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"device_id\":\"0x1\",\"type\":\"keyboard\",\"vkey\":65,\"timestamp\":1}\n");
        input.extend_from_slice(b"\xff\xfe not utf-8\n");
        input.extend_from_slice(b"{not json}\n");
        input.extend_from_slice(b"\n");
        input.extend_from_slice(b"{\"device_id\":\"0x2\",\"type\":\"mouse\",\"dx\":1,\"dy\":0,\"buttons\":0,\"timestamp\":2}\n");
        let mut out = Vec::new();

        // Act
        let printed = pump(io::Cursor::new(input), &mut out).expect("pump");

        // Assert
        assert_eq!(printed, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[1] KEYBOARD 0x1 key=A"));
        assert!(lines[1].starts_with("[2] MOUSE"));
    }

    #[test]
    fn test_pump_accepts_final_line_without_delimiter() {
        let input = b"{\"device_id\":\"0x1\",\"type\":\"keyboard\",\"vkey\":66,\"timestamp\":3}";
        let mut out = Vec::new();

        let printed = pump(&input[..], &mut out).expect("pump");

        assert_eq!(printed, 1);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rawcast-tap"]);

        assert_eq!(cli.port, 9999);
    }

    #[test]
    fn test_cli_host_override() {
        let cli = Cli::parse_from(["rawcast-tap", "--host", "10.0.0.5"]);
        assert_eq!(cli.host, "10.0.0.5");
    }
}
