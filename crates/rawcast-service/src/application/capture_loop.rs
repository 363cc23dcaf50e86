//! InputCaptureLoop: turns raw-input packets into broadcast events.
//!
//! The loop owns the OS registration (through [`InputSource`]), drains the
//! packet stream, applies the filtering policy, resolves device identity
//! through the [`DeviceRegistry`], and hands every surviving event to an
//! [`EventSink`].
//!
//! # Filtering policy
//!
//! - Keyboard: only key-down transitions are forwarded.  Any packet with the
//!   [`KEY_BREAK`] flag set is dropped.
//! - Mouse: a packet with `dx == 0`, `dy == 0` and no button flags is a no-op
//!   frame and is dropped.  Any motion or any button bit is forwarded.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──start()──▶ Registered ──run()──▶ Running
//!        │                       │                    │
//!        │                       └──shutdown()──┐     │ shutdown()
//!        │                                      ▼     ▼
//!        └──shutdown()──▶ Stopped ◀──────────── ShuttingDown
//! ```
//!
//! A registration failure in `start()` moves straight to `Stopped`.  A
//! shutdown that lands between `start()` and `run()` releases the OS source at
//! once; the following `run()` then returns `Ok` without reading a packet.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rawcast_core::{DeviceClass, DeviceHandle, EventPayload, InputEvent};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::device_registry::DeviceRegistry;
use crate::infrastructure::input_capture::{
    CaptureError, DeviceChange, InputSource, RawInputPacket, KEY_BREAK,
};

/// Destination for normalized events.
///
/// Implemented by the broadcast server; tests record calls.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &InputEvent);
}

/// Lifecycle state of the capture loop.  Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    Registered,
    Running,
    ShuttingDown,
    Stopped,
}

/// Error type for the capture loop.
#[derive(Debug, Error)]
pub enum CaptureLoopError {
    #[error("capture loop cannot do that in state {0:?}")]
    InvalidState(CaptureState),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Returns `true` when `packet` survives the filtering policy.
///
/// Device-change packets are never forwarded as events.
pub fn passes_filter(packet: &RawInputPacket) -> bool {
    match *packet {
        RawInputPacket::Keyboard { flags, .. } => flags & KEY_BREAK == 0,
        RawInputPacket::Mouse {
            dx,
            dy,
            button_flags,
            ..
        } => dx != 0 || dy != 0 || button_flags != 0,
        RawInputPacket::DeviceChange { .. } => false,
    }
}

pub struct InputCaptureLoop {
    registry: Arc<DeviceRegistry>,
    source: Box<dyn InputSource>,
    sink: Arc<dyn EventSink>,
    state: Mutex<CaptureState>,
}

impl InputCaptureLoop {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        source: Box<dyn InputSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            source,
            sink,
            state: Mutex::new(CaptureState::Uninitialized),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.lock_state()
    }

    /// Enumerates devices, then registers with the OS.
    ///
    /// An enumeration failure is logged and tolerated: devices are then
    /// registered lazily as their first input arrives.
    ///
    /// # Errors
    ///
    /// [`CaptureLoopError::InvalidState`] unless the loop is `Uninitialized`;
    /// [`CaptureLoopError::Capture`] when registration fails, after which the
    /// loop is `Stopped`.
    pub fn start(&self) -> Result<Receiver<RawInputPacket>, CaptureLoopError> {
        let state = self.state();
        if state != CaptureState::Uninitialized {
            return Err(CaptureLoopError::InvalidState(state));
        }

        if let Ok(count) = self.registry.enumerate() {
            info!(devices = count, "initial device enumeration complete");
        }

        let packets = match self.source.start() {
            Ok(rx) => rx,
            Err(e) => {
                error!(error = %e, "raw input registration failed");
                self.set_state(CaptureState::Stopped);
                return Err(e.into());
            }
        };

        if let Err(current) = self.advance(CaptureState::Uninitialized, CaptureState::Registered) {
            // shutdown() won the race while we were registering.
            self.source.stop();
            return Err(CaptureLoopError::InvalidState(current));
        }
        info!("raw input registered for keyboard and mouse");
        Ok(packets)
    }

    /// Drives the packet stream on the calling thread until the stream closes
    /// or [`shutdown`](Self::shutdown) is called.  Pending packets are not
    /// drained after a shutdown.
    ///
    /// # Errors
    ///
    /// [`CaptureLoopError::InvalidState`] unless the loop is `Registered`.
    /// A loop already shutting down is simply moved to `Stopped`.
    pub fn run(&self, packets: Receiver<RawInputPacket>) -> Result<(), CaptureLoopError> {
        if let Err(current) = self.advance(CaptureState::Registered, CaptureState::Running) {
            if current == CaptureState::ShuttingDown {
                self.set_state(CaptureState::Stopped);
                return Ok(());
            }
            return Err(CaptureLoopError::InvalidState(current));
        }
        info!("capture loop running");

        for packet in packets.iter() {
            if self.state() == CaptureState::ShuttingDown {
                break;
            }
            self.handle_packet(packet);
        }

        self.set_state(CaptureState::Stopped);
        info!("capture loop stopped");
        Ok(())
    }

    /// Requests termination.  Callable from any thread; idempotent.
    pub fn shutdown(&self) {
        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            *state = match previous {
                CaptureState::Uninitialized => CaptureState::Stopped,
                CaptureState::Registered | CaptureState::Running => CaptureState::ShuttingDown,
                other => other,
            };
            previous
        };

        match previous {
            CaptureState::Registered => {
                // run() completes the move to Stopped.
                info!("capture loop shutting down before it ran");
                self.source.stop();
            }
            CaptureState::Running => {
                info!("capture loop shutting down");
                self.source.stop();
            }
            _ => {}
        }
    }

    /// Applies the filtering and identity policy to one packet and publishes
    /// the resulting event, if any.
    pub fn handle_packet(&self, packet: RawInputPacket) -> Option<InputEvent> {
        if let RawInputPacket::DeviceChange { device, change } = packet {
            self.on_device_change(device, change);
            return None;
        }
        if !passes_filter(&packet) {
            trace!(?packet, "dropped by filter");
            return None;
        }

        let (device, class, payload, timestamp) = match packet {
            RawInputPacket::Keyboard {
                device,
                vkey,
                time_ms,
                ..
            } => (
                device,
                DeviceClass::Keyboard,
                EventPayload::Keyboard { vkey },
                time_ms,
            ),
            RawInputPacket::Mouse {
                device,
                dx,
                dy,
                button_flags,
                time_ms,
            } => (
                device,
                DeviceClass::Mouse,
                EventPayload::Mouse {
                    dx,
                    dy,
                    buttons: button_flags,
                },
                time_ms,
            ),
            RawInputPacket::DeviceChange { .. } => return None,
        };

        let record = self
            .registry
            .lookup(device)
            .unwrap_or_else(|| self.registry.add_device_if_missing(device, class));

        let event = InputEvent {
            device_id: record.stable_id().to_string(),
            payload,
            timestamp,
        };
        self.sink.publish(&event);
        Some(event)
    }

    fn on_device_change(&self, device: DeviceHandle, change: DeviceChange) {
        info!(handle = %device, ?change, "device change notification");
        if change == DeviceChange::Removal {
            self.registry.remove(device);
        }
        if let Err(e) = self.registry.enumerate() {
            debug!(error = %e, "re-enumeration after device change failed");
        }
    }

    /// Moves `from` → `to`; on mismatch returns the actual state untouched.
    fn advance(&self, from: CaptureState, to: CaptureState) -> Result<(), CaptureState> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(*state);
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: CaptureState) {
        let mut state = self.lock_state();
        if *state != to {
            debug!(from = ?*state, to = ?to, "capture state change");
            *state = to;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for InputCaptureLoop {
    fn drop(&mut self) {
        if matches!(self.state(), CaptureState::Registered | CaptureState::Running) {
            warn!("capture loop dropped while active; stopping input source");
            self.shutdown();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
