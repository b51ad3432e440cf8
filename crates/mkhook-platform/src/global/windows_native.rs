//! Windows native global source.
//!
//! Installs `WH_KEYBOARD_LL` and `WH_MOUSE_LL` on a dedicated thread that runs
//! a message loop. Each primitive is delivered to the sink from inside the
//! hook procedure, and a suppress verdict keeps the event from reaching the
//! rest of the system.

use crate::error::PlatformError;
use crossbeam_channel::bounded;
use mkhook_core::{
    ButtonAction, EventSink, HookResult, KeyCode, MouseButton, RawEvent, RawEventKind, RawSource,
    Scope, Verdict, WheelAxis,
};
use std::cell::RefCell;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};
use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, ToUnicode, VK_BACK, VK_CAPITAL, VK_CONTROL, VK_DELETE,
    VK_DOWN, VK_END, VK_ESCAPE, VK_HOME, VK_INSERT, VK_LCONTROL, VK_LEFT, VK_LMENU, VK_LSHIFT,
    VK_LWIN, VK_MENU, VK_NEXT, VK_NUMLOCK, VK_PAUSE, VK_PRIOR, VK_RCONTROL, VK_RETURN, VK_RIGHT,
    VK_RMENU, VK_RSHIFT, VK_RWIN, VK_SCROLL, VK_SHIFT, VK_SNAPSHOT, VK_SPACE, VK_TAB, VK_UP,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT,
    MSLLHOOKSTRUCT, MSG, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP,
    WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEHWHEEL, WM_MOUSEMOVE,
    WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
    WM_XBUTTONDOWN, WM_XBUTTONUP,
};

const XBUTTON1: u32 = 0x0001;
/// `ToUnicode` flag: leave the keyboard state (dead keys) untouched.
const TO_UNICODE_NO_STATE_CHANGE: u32 = 0x0004;

// Hook procedures run on the thread that installed them.
thread_local! {
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
    static START_TIME: RefCell<Option<Instant>> = const { RefCell::new(None) };
}

/// Global source backed by low-level Windows hooks.
#[derive(Default)]
pub struct GlobalSource {
    thread: Option<JoinHandle<()>>,
    thread_id: u32,
}

impl GlobalSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawSource for GlobalSource {
    fn scope(&self) -> Scope {
        Scope::Global
    }

    fn start(&mut self, sink: EventSink) -> HookResult<()> {
        if self.thread.is_some() {
            return Err(PlatformError::AlreadyRunning.into());
        }

        let (ready_tx, ready_rx) = bounded::<Result<u32, PlatformError>>(1);
        let handle = thread::Builder::new()
            .name("mkhook-global-hook".into())
            .spawn(move || run_hook_thread(sink, ready_tx))
            .map_err(|e| PlatformError::ThreadSpawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.thread_id = thread_id;
                self.thread = Some(handle);
                info!(thread_id, "Global hook started");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.into())
            }
            Err(_) => {
                let _ = handle.join();
                Err(PlatformError::HookThreadExited.into())
            }
        }
    }

    fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        let posted = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
        if posted == 0 {
            warn!(thread_id = self.thread_id, "Failed to post WM_QUIT to hook thread");
        }
        if handle.join().is_err() {
            error!("Global hook thread panicked");
        }
        self.thread_id = 0;
        info!("Global hook stopped");
    }

    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for GlobalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the hook thread: install, pump messages until `WM_QUIT`, unhook.
fn run_hook_thread(
    sink: EventSink,
    ready_tx: crossbeam_channel::Sender<Result<u32, PlatformError>>,
) {
    let thread_id = unsafe { GetCurrentThreadId() };
    SINK.with(|s| *s.borrow_mut() = Some(sink));
    START_TIME.with(|t| *t.borrow_mut() = Some(Instant::now()));

    // Make sure the thread has a message queue before anyone posts to it.
    let mut msg: MSG = unsafe { std::mem::zeroed() };
    unsafe { PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_NOREMOVE) };

    let module = unsafe { GetModuleHandleW(std::ptr::null()) };
    let keyboard_hook =
        unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), module, 0) };
    if keyboard_hook.is_null() {
        error!("Failed to install keyboard hook");
        clear_thread_state();
        let _ = ready_tx.send(Err(PlatformError::HookInstall("keyboard")));
        return;
    }
    let mouse_hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), module, 0) };
    if mouse_hook.is_null() {
        error!("Failed to install mouse hook");
        unhook(keyboard_hook);
        clear_thread_state();
        let _ = ready_tx.send(Err(PlatformError::HookInstall("mouse")));
        return;
    }
    debug!("Low-level keyboard and mouse hooks installed");
    let _ = ready_tx.send(Ok(thread_id));

    loop {
        let ret = unsafe { GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) };
        if ret <= 0 {
            // WM_QUIT or error
            break;
        }
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    unhook(mouse_hook);
    unhook(keyboard_hook);
    clear_thread_state();
    debug!("Hook thread exiting");
}

fn unhook(hook: HHOOK) {
    if unsafe { UnhookWindowsHookEx(hook) } == 0 {
        warn!("UnhookWindowsHookEx failed");
    }
}

fn clear_thread_state() {
    SINK.with(|s| s.borrow_mut().take());
    START_TIME.with(|t| t.borrow_mut().take());
}

/// Deliver a primitive to this thread's sink.
fn deliver(kind: RawEventKind) -> Verdict {
    let timestamp_ms = START_TIME.with(|time| {
        time.borrow()
            .as_ref()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    });
    let sink = SINK.with(|s| s.borrow().clone());
    match sink {
        Some(sink) => sink.deliver(&RawEvent { timestamp_ms, kind }),
        None => Verdict::Pass,
    }
}

unsafe extern "system" fn keyboard_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let kb = &*(lparam as *const KBDLLHOOKSTRUCT);
        let key = key_code(kb.vkCode);
        match wparam as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                trace!(%key, "KeyDown");
                deliver(RawEventKind::KeyDown { key });
                if let Some(ch) = translate_char(kb.vkCode, kb.scanCode) {
                    deliver(RawEventKind::KeyPress { ch });
                }
            }
            WM_KEYUP | WM_SYSKEYUP => {
                trace!(%key, "KeyUp");
                deliver(RawEventKind::KeyUp { key });
            }
            _ => {}
        }
    }

    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

unsafe extern "system" fn mouse_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let ms = &*(lparam as *const MSLLHOOKSTRUCT);
        if let Some(kind) = mouse_event_kind(wparam as u32, ms) {
            if deliver(kind).is_suppress() {
                // Non-zero return keeps the event from the next hook and the target window.
                return 1;
            }
        }
    }

    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

fn mouse_event_kind(message: u32, ms: &MSLLHOOKSTRUCT) -> Option<RawEventKind> {
    let (x, y) = (ms.pt.x, ms.pt.y);
    let high_word = (ms.mouseData >> 16) as u16;
    let button = |button, action| {
        Some(RawEventKind::MouseButton {
            button,
            action,
            x,
            y,
        })
    };
    let x_button = if u32::from(high_word) == XBUTTON1 {
        MouseButton::XButton1
    } else {
        MouseButton::XButton2
    };

    match message {
        WM_MOUSEMOVE => Some(RawEventKind::MouseMove { x, y }),
        WM_LBUTTONDOWN => button(MouseButton::Left, ButtonAction::Down),
        WM_LBUTTONUP => button(MouseButton::Left, ButtonAction::Up),
        WM_RBUTTONDOWN => button(MouseButton::Right, ButtonAction::Down),
        WM_RBUTTONUP => button(MouseButton::Right, ButtonAction::Up),
        WM_MBUTTONDOWN => button(MouseButton::Middle, ButtonAction::Down),
        WM_MBUTTONUP => button(MouseButton::Middle, ButtonAction::Up),
        WM_XBUTTONDOWN => button(x_button, ButtonAction::Down),
        WM_XBUTTONUP => button(x_button, ButtonAction::Up),
        WM_MOUSEWHEEL | WM_MOUSEHWHEEL => Some(RawEventKind::MouseWheel {
            delta: i32::from(high_word as i16),
            axis: if message == WM_MOUSEWHEEL {
                WheelAxis::Vertical
            } else {
                WheelAxis::Horizontal
            },
            x,
            y,
        }),
        _ => None,
    }
}

/// Character a key stroke produces under the current modifier state.
///
/// Low-level hooks run before the thread's key state is updated, so the
/// modifier state is rebuilt from the async state.
fn translate_char(vk: u32, scan_code: u32) -> Option<char> {
    let mut state = [0u8; 256];
    for modifier in [VK_SHIFT, VK_CONTROL, VK_MENU] {
        if unsafe { GetAsyncKeyState(i32::from(modifier)) } < 0 {
            state[usize::from(modifier)] = 0x80;
        }
    }
    if unsafe { GetKeyState(i32::from(VK_CAPITAL)) } & 1 != 0 {
        state[usize::from(VK_CAPITAL)] = 0x01;
    }

    let mut buf = [0u16; 4];
    let written = unsafe {
        ToUnicode(
            vk,
            scan_code,
            state.as_ptr(),
            buf.as_mut_ptr(),
            buf.len() as i32,
            TO_UNICODE_NO_STATE_CHANGE,
        )
    };
    if written != 1 {
        return None;
    }
    char::from_u32(u32::from(buf[0])).filter(|c| !c.is_control())
}

/// Virtual-key code plus display name.
fn key_code(vk: u32) -> KeyCode {
    let name = match vk {
        0x30..=0x39 | 0x41..=0x5A => char::from_u32(vk).map(String::from),
        0x60..=0x69 => Some(format!("Kp{}", vk - 0x60)),
        0x70..=0x87 => Some(format!("F{}", vk - 0x6F)),
        _ => named_key(vk).map(str::to_string),
    };
    KeyCode::new(vk, name.unwrap_or_else(|| format!("Unknown(0x{vk:02X})")))
}

fn named_key(vk: u32) -> Option<&'static str> {
    let Ok(vk) = u16::try_from(vk) else {
        return None;
    };
    let name = match vk {
        VK_BACK => "Backspace",
        VK_TAB => "Tab",
        VK_RETURN => "Return",
        VK_SHIFT | VK_LSHIFT => "ShiftLeft",
        VK_RSHIFT => "ShiftRight",
        VK_CONTROL | VK_LCONTROL => "ControlLeft",
        VK_RCONTROL => "ControlRight",
        VK_MENU | VK_LMENU => "Alt",
        VK_RMENU => "AltGr",
        VK_PAUSE => "Pause",
        VK_CAPITAL => "CapsLock",
        VK_ESCAPE => "Escape",
        VK_SPACE => "Space",
        VK_PRIOR => "PageUp",
        VK_NEXT => "PageDown",
        VK_END => "End",
        VK_HOME => "Home",
        VK_LEFT => "Left",
        VK_UP => "Up",
        VK_RIGHT => "Right",
        VK_DOWN => "Down",
        VK_SNAPSHOT => "PrintScreen",
        VK_INSERT => "Insert",
        VK_DELETE => "Delete",
        VK_LWIN => "MetaLeft",
        VK_RWIN => "MetaRight",
        VK_NUMLOCK => "NumLock",
        VK_SCROLL => "ScrollLock",
        0x6A => "KpMultiply",
        0x6B => "KpPlus",
        0x6D => "KpMinus",
        0x6E => "KpDelete",
        0x6F => "KpDivide",
        0xBA => ";",
        0xBB => "=",
        0xBC => ",",
        0xBD => "-",
        0xBE => ".",
        0xBF => "/",
        0xC0 => "`",
        0xDB => "[",
        0xDC => "\\",
        0xDD => "]",
        0xDE => "'",
        _ => return None,
    };
    Some(name)
}
