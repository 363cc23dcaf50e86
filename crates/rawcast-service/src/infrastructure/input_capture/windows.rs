//! Windows raw-input adapter.
//!
//! [`WindowsInputSource`] spawns the `rawcast-raw-input` thread, which
//! creates a message-only window (`HWND_MESSAGE`), registers it for
//! Generic-Desktop keyboard and mouse input with
//! `RIDEV_INPUTSINK | RIDEV_DEVNOTIFY`, and pumps messages until `WM_QUIT`.
//! The window procedure turns `WM_INPUT` and `WM_INPUT_DEVICE_CHANGE` into
//! [`RawInputPacket`]s and sends them down the channel returned by `start()`.
//!
//! [`WindowsDeviceSource`] answers the registry's device-list and
//! device-name queries with `GetRawInputDeviceList` and
//! `GetRawInputDeviceInfoW(RIDI_DEVICENAME)`.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls and
//! for reading OS structures out of byte buffers.

#![cfg(target_os = "windows")]

use std::cell::RefCell;
use std::ffi::c_void;
use std::mem::size_of;
use std::ptr;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use rawcast_core::DeviceHandle;
use tracing::{debug, info, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_CLASS_ALREADY_EXISTS, HANDLE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::SystemInformation::GetTickCount64;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::{
    GetRawInputData, GetRawInputDeviceInfoW, GetRawInputDeviceList, RegisterRawInputDevices,
    HRAWINPUT, RAWINPUTDEVICE, RAWINPUTDEVICELIST, RAWINPUTHEADER, RAWKEYBOARD, RAWMOUSE,
    RIDEV_DEVNOTIFY, RIDEV_INPUTSINK, RIDEV_REMOVE, RIDI_DEVICENAME, RID_INPUT, RIM_TYPEKEYBOARD,
    RIM_TYPEMOUSE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PostThreadMessageW, RegisterClassExW, HWND_MESSAGE, MSG, WINDOW_EX_STYLE, WINDOW_STYLE,
    WM_INPUT, WM_INPUT_DEVICE_CHANGE, WM_QUIT, WNDCLASSEXW,
};

use super::payload::{ensure_len, fetch_sized, PayloadError};
use super::{CaptureError, DeviceChange, InputSource, RawInputPacket};
use crate::application::device_registry::{AttachedDevice, DeviceSource, RawDeviceKind};

// Local constants (HID usage tables and WM_INPUT_DEVICE_CHANGE wparam values).
const HID_USAGE_PAGE_GENERIC: u16 = 0x01;
const HID_USAGE_GENERIC_MOUSE: u16 = 0x02;
const HID_USAGE_GENERIC_KEYBOARD: u16 = 0x06;
const GIDC_ARRIVAL: usize = 1;
const GIDC_REMOVAL: usize = 2;

const WINDOW_CLASS: PCWSTR = w!("RawcastRawInputSink");

thread_local! {
    /// Packet sender for the window procedure running on this thread.  Set
    /// only on the raw-input thread, for the lifetime of its message loop.
    static PACKETS: RefCell<Option<Sender<RawInputPacket>>> = const { RefCell::new(None) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── WindowsInputSource ────────────────────────────────────────────────────────

struct MessageThread {
    thread_id: u32,
    handle: JoinHandle<()>,
}

/// Raw keyboard/mouse capture through a message-only window.
#[derive(Default)]
pub struct WindowsInputSource {
    thread: Mutex<Option<MessageThread>>,
}

impl WindowsInputSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputSource for WindowsInputSource {
    fn start(&self) -> Result<mpsc::Receiver<RawInputPacket>, CaptureError> {
        let mut slot = lock(&self.thread);
        if slot.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let (packet_tx, packet_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("rawcast-raw-input".to_string())
            .spawn(move || run_message_thread(packet_tx, ready_tx))
            .map_err(CaptureError::ThreadSpawn)?;

        // Registration happens on the new thread; wait for its verdict.
        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                *slot = Some(MessageThread { thread_id, handle });
                Ok(packet_rx)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::RegistrationFailed(
                    "raw input thread exited during startup".to_string(),
                ))
            }
        }
    }

    fn stop(&self) {
        let Some(thread) = lock(&self.thread).take() else {
            return;
        };

        // SAFETY: posting to a thread id we own; the thread created its
        // message queue before reporting ready.
        let posted =
            unsafe { PostThreadMessageW(thread.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        if let Err(e) = posted {
            warn!(error = %e, "failed to post WM_QUIT to raw input thread");
            return;
        }
        if thread.handle.join().is_err() {
            warn!("raw input thread panicked");
        }
        info!("raw input capture stopped");
    }
}

impl Drop for WindowsInputSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point for the `rawcast-raw-input` thread.
fn run_message_thread(packets: Sender<RawInputPacket>, ready: Sender<Result<u32, CaptureError>>) {
    let hwnd = match create_message_window() {
        Ok(hwnd) => hwnd,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = register_raw_input(hwnd) {
        destroy_window(hwnd);
        let _ = ready.send(Err(e));
        return;
    }

    PACKETS.with(|slot| *slot.borrow_mut() = Some(packets));
    // SAFETY: no preconditions.
    let thread_id = unsafe { GetCurrentThreadId() };

    if ready.send(Ok(thread_id)).is_ok() {
        debug!("raw input message loop running");
        let mut msg = MSG::default();
        // SAFETY: standard GetMessage/DispatchMessage loop on the thread that
        // owns the window.  Returns 0 on WM_QUIT and -1 on error.
        unsafe {
            loop {
                let status = GetMessageW(&mut msg, None, 0, 0).0;
                if status == 0 || status == -1 {
                    break;
                }
                DispatchMessageW(&msg);
            }
        }
    }

    unregister_raw_input();
    destroy_window(hwnd);
    // Dropping the sender closes the packet stream.
    PACKETS.with(|slot| slot.borrow_mut().take());
}

fn create_message_window() -> Result<HWND, CaptureError> {
    let failed = |e: windows::core::Error| CaptureError::WindowCreationFailed(e.to_string());

    // SAFETY: plain Win32 calls with valid, 'static arguments.
    unsafe {
        let instance = GetModuleHandleW(None).map_err(failed)?;
        let class = WNDCLASSEXW {
            cbSize: size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(window_proc),
            hInstance: instance.into(),
            lpszClassName: WINDOW_CLASS,
            ..Default::default()
        };
        // A restart after stop() finds the class already registered.
        if RegisterClassExW(&class) == 0 && GetLastError() != ERROR_CLASS_ALREADY_EXISTS {
            return Err(failed(windows::core::Error::from_thread()));
        }

        CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            WINDOW_CLASS,
            w!("rawcast"),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            Some(HWND_MESSAGE),
            None,
            Some(instance.into()),
            None,
        )
        .map_err(failed)
    }
}

fn register_raw_input(hwnd: HWND) -> Result<(), CaptureError> {
    let devices = [HID_USAGE_GENERIC_KEYBOARD, HID_USAGE_GENERIC_MOUSE].map(|usage| {
        RAWINPUTDEVICE {
            usUsagePage: HID_USAGE_PAGE_GENERIC,
            usUsage: usage,
            dwFlags: RIDEV_INPUTSINK | RIDEV_DEVNOTIFY,
            hwndTarget: hwnd,
        }
    });
    // SAFETY: `devices` is a valid slice of initialized structures.
    unsafe { RegisterRawInputDevices(&devices, size_of::<RAWINPUTDEVICE>() as u32) }
        .map_err(|e| CaptureError::RegistrationFailed(format!("{e} (os error {})", e.code().0)))
}

fn unregister_raw_input() {
    let devices = [HID_USAGE_GENERIC_KEYBOARD, HID_USAGE_GENERIC_MOUSE].map(|usage| {
        RAWINPUTDEVICE {
            usUsagePage: HID_USAGE_PAGE_GENERIC,
            usUsage: usage,
            dwFlags: RIDEV_REMOVE,
            hwndTarget: HWND::default(),
        }
    });
    // SAFETY: as in `register_raw_input`.
    let result = unsafe { RegisterRawInputDevices(&devices, size_of::<RAWINPUTDEVICE>() as u32) };
    if let Err(e) = result {
        debug!(error = %e, "raw input unregistration failed");
    }
}

fn destroy_window(hwnd: HWND) {
    // SAFETY: `hwnd` was created on this thread and is destroyed once.
    if let Err(e) = unsafe { DestroyWindow(hwnd) } {
        debug!(error = %e, "DestroyWindow failed");
    }
}

fn deliver(packet: RawInputPacket) {
    PACKETS.with(|slot| {
        if let Some(sender) = slot.borrow().as_ref() {
            // Ignore send errors (receiver dropped during shutdown).
            let _ = sender.send(packet);
        }
    });
}

/// Window procedure for the message-only window.
///
/// # Safety
///
/// Called by Windows on the raw-input thread during `DispatchMessageW`.
unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_INPUT => {
            match read_input(HRAWINPUT(lparam.0 as *mut c_void)) {
                Ok(packet) => deliver(packet),
                Err(e) => warn!(error = %e, "dropping raw input message"),
            }
            // WM_INPUT must reach DefWindowProc so the system can clean up.
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }
        WM_INPUT_DEVICE_CHANGE => {
            let change = match wparam.0 {
                GIDC_ARRIVAL => Some(DeviceChange::Arrival),
                GIDC_REMOVAL => Some(DeviceChange::Removal),
                _ => None,
            };
            if let Some(change) = change {
                deliver(RawInputPacket::DeviceChange {
                    device: DeviceHandle::from_raw(lparam.0 as usize),
                    change,
                });
            }
            LRESULT(0)
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

fn read_input(handle: HRAWINPUT) -> Result<RawInputPacket, PayloadError> {
    let header_size = size_of::<RAWINPUTHEADER>() as u32;
    let bytes = fetch_sized::<u8, _>(|buf, size| {
        let data = buf.map(|b| b.as_mut_ptr().cast::<c_void>());
        // SAFETY: `handle` comes from the WM_INPUT being dispatched; `data`
        // is either absent (size query) or a buffer of `*size` bytes.
        unsafe { GetRawInputData(handle, RID_INPUT, data, size, header_size) }
    })?;
    // SAFETY: no preconditions.
    let time_ms = unsafe { GetTickCount64() };
    parse_raw_input(&bytes, time_ms)
}

/// Decodes a `RID_INPUT` payload (as copied out by `GetRawInputData`).
fn parse_raw_input(bytes: &[u8], time_ms: u64) -> Result<RawInputPacket, PayloadError> {
    let header_len = size_of::<RAWINPUTHEADER>();
    ensure_len(bytes, header_len)?;
    // SAFETY: length checked above; read_unaligned tolerates any alignment.
    let header: RAWINPUTHEADER = unsafe { ptr::read_unaligned(bytes.as_ptr().cast()) };
    let device = DeviceHandle::from_raw(header.hDevice.0 as usize);
    let body = bytes[header_len..].as_ptr();

    if header.dwType == RIM_TYPEKEYBOARD.0 {
        ensure_len(bytes, header_len + size_of::<RAWKEYBOARD>())?;
        // SAFETY: length checked above.
        let kbd: RAWKEYBOARD = unsafe { ptr::read_unaligned(body.cast()) };
        Ok(RawInputPacket::Keyboard {
            device,
            vkey: kbd.VKey,
            flags: kbd.Flags,
            time_ms,
        })
    } else if header.dwType == RIM_TYPEMOUSE.0 {
        ensure_len(bytes, header_len + size_of::<RAWMOUSE>())?;
        // SAFETY: length checked above; both union views are plain integers.
        let mouse: RAWMOUSE = unsafe { ptr::read_unaligned(body.cast()) };
        let button_flags = unsafe { mouse.Anonymous.Anonymous.usButtonFlags };
        Ok(RawInputPacket::Mouse {
            device,
            dx: mouse.lLastX,
            dy: mouse.lLastY,
            button_flags,
            time_ms,
        })
    } else {
        Err(PayloadError::UnsupportedClass(header.dwType))
    }
}

// ── WindowsDeviceSource ───────────────────────────────────────────────────────

/// OS device list and device names through the raw-input device APIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsDeviceSource;

impl DeviceSource for WindowsDeviceSource {
    fn attached_devices(&self) -> Result<Vec<AttachedDevice>, PayloadError> {
        let entry_size = size_of::<RAWINPUTDEVICELIST>() as u32;
        let list = fetch_sized::<RAWINPUTDEVICELIST, _>(|buf, count| {
            // SAFETY: `buf` is absent (count query) or holds `*count` entries.
            unsafe { GetRawInputDeviceList(buf.map(|b| b.as_mut_ptr()), count, entry_size) }
        })?;

        Ok(list
            .iter()
            .map(|entry| AttachedDevice {
                handle: DeviceHandle::from_raw(entry.hDevice.0 as usize),
                kind: if entry.dwType == RIM_TYPEKEYBOARD {
                    RawDeviceKind::Keyboard
                } else if entry.dwType == RIM_TYPEMOUSE {
                    RawDeviceKind::Mouse
                } else {
                    RawDeviceKind::Hid
                },
            })
            .collect())
    }

    fn device_name(&self, handle: DeviceHandle) -> Option<String> {
        let device = HANDLE(handle.as_raw() as *mut c_void);
        let result = fetch_sized::<u16, _>(|buf, size| {
            let data = buf.map(|b| b.as_mut_ptr().cast::<c_void>());
            // SAFETY: `data` is absent (size query) or holds `*size` WCHARs.
            unsafe { GetRawInputDeviceInfoW(Some(device), RIDI_DEVICENAME, data, size) }
        });

        match result {
            Ok(mut wide) => {
                while wide.last() == Some(&0) {
                    wide.pop();
                }
                (!wide.is_empty()).then(|| String::from_utf16_lossy(&wide))
            }
            Err(e) => {
                debug!(handle = %handle, error = %e, "device name query failed");
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
