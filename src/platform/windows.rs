//! Win32 backend: `WH_KEYBOARD_LL` hook and keyboard layout services
//!
//! The hook is installed on a dedicated thread that runs a `GetMessageW`
//! loop, which low-level hooks need in order to be called. Hook procs get
//! no user pointer, so the event sink lives in a process-global `Mutex`.
//! Only one `HookListener` may be active at a time.
//!
//! The hook proc must return quickly: Windows silently removes low-level
//! hooks that exceed the system hook timeout.

use std::panic;
use std::ptr;
use std::sync::mpsc;
use std::sync::{Mutex, TryLockError};
use std::thread::{self, JoinHandle};

use tracing::{error, info, trace};
use windows_sys::Win32::Foundation::{GetLastError, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    ActivateKeyboardLayout, GetAsyncKeyState, GetKeyboardLayout, GetKeyboardLayoutList, SendInput,
    HKL, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, KLF_SETFORPROCESS, VK_LWIN,
    VK_SPACE,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetForegroundWindow, GetMessageW, GetWindowThreadProcessId, PostMessageW,
    PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx, HC_ACTION, KBDLLHOOKSTRUCT,
    LLKHF_INJECTED, MSG, WH_KEYBOARD_LL, WM_INPUTLANGCHANGEREQUEST, WM_QUIT,
};

use super::{HookError, PlatformError};
use crate::config::ModifierKey;
use crate::hotkey::{Decision, KeyEvent, KeyEventKind, ModifierProbe};
use crate::layout::{ForegroundTarget, LayoutId, LayoutPlatform};
use crate::state::EventSink;

/// Sink receiving every event seen by the hook proc
static HOOK_SINK: Mutex<Option<Box<dyn EventSink + Send>>> = Mutex::new(None);

fn last_error(call: &'static str) -> PlatformError {
    PlatformError::Win32 {
        call,
        code: unsafe { GetLastError() },
    }
}

/// Reads live modifier state with `GetAsyncKeyState`
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncKeyProbe;

impl ModifierProbe for AsyncKeyProbe {
    fn is_held(&self, key: ModifierKey) -> bool {
        // High bit set means the key is down right now. The generic VK code
        // covers both the left and right keys.
        unsafe { GetAsyncKeyState(key.vk_code()) < 0 }
    }
}

/// Keyboard layout services backed by user32
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Layouts;

impl LayoutPlatform for Win32Layouts {
    fn foreground(&self) -> Option<ForegroundTarget> {
        let window = unsafe { GetForegroundWindow() };
        if window.is_null() {
            return None;
        }

        let thread_id = unsafe { GetWindowThreadProcessId(window, ptr::null_mut()) };
        if thread_id == 0 {
            return None;
        }

        Some(ForegroundTarget {
            window: window as isize,
            thread_id,
        })
    }

    fn current_layout(&self, target: &ForegroundTarget) -> LayoutId {
        LayoutId(unsafe { GetKeyboardLayout(target.thread_id) } as usize as u64)
    }

    fn process_layout(&self) -> LayoutId {
        LayoutId(unsafe { GetKeyboardLayout(0) } as usize as u64)
    }

    fn installed_layouts(&self, max: usize) -> Vec<LayoutId> {
        let mut buffer: Vec<HKL> = vec![ptr::null_mut(); max];
        let count = unsafe { GetKeyboardLayoutList(max as i32, buffer.as_mut_ptr()) };
        if count <= 0 {
            return Vec::new();
        }

        buffer
            .into_iter()
            .take(count as usize)
            .map(|hkl| LayoutId(hkl as usize as u64))
            .collect()
    }

    fn request_layout_change(
        &self,
        target: &ForegroundTarget,
        layout: LayoutId,
    ) -> Result<(), PlatformError> {
        // Posted, not sent: a hung target must never stall the hook thread.
        let posted = unsafe {
            PostMessageW(
                target.window as _,
                WM_INPUTLANGCHANGEREQUEST,
                0,
                layout.0 as usize as LPARAM,
            )
        };
        if posted == 0 {
            return Err(last_error("PostMessageW"));
        }
        Ok(())
    }

    fn activate_for_process(&self, layout: LayoutId) -> Result<(), PlatformError> {
        let previous = unsafe { ActivateKeyboardLayout(layout.0 as usize as HKL, KLF_SETFORPROCESS) };
        if previous.is_null() {
            return Err(last_error("ActivateKeyboardLayout"));
        }
        Ok(())
    }

    fn send_next_layout_chord(&self) -> Result<(), PlatformError> {
        let key = |vk: u16, up: bool| INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    wScan: 0,
                    dwFlags: if up { KEYEVENTF_KEYUP } else { 0 },
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        let inputs = [
            key(VK_LWIN, false),
            key(VK_SPACE, false),
            key(VK_SPACE, true),
            key(VK_LWIN, true),
        ];

        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };
        if sent as usize != inputs.len() {
            return Err(last_error("SendInput"));
        }
        Ok(())
    }
}

/// Owns the `WH_KEYBOARD_LL` hook and its message-loop thread
pub struct HookListener {
    /// Thread ID of the message-loop thread; used to post `WM_QUIT`
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl HookListener {
    pub fn new() -> Self {
        Self {
            thread_id: 0,
            thread: None,
        }
    }

    /// Install the hook and start delivering events to `sink`
    ///
    /// Returns once the hook is installed, or with the installation error.
    pub fn start(&mut self, sink: Box<dyn EventSink + Send>) -> Result<(), HookError> {
        if self.is_running() {
            return Err(HookError::AlreadyRunning);
        }

        *lock_sink() = Some(sink);

        let (status_tx, status_rx) = mpsc::channel::<Result<u32, PlatformError>>();

        let thread = thread::Builder::new()
            .name("capslock-hook".to_string())
            .spawn(move || run_message_loop(status_tx))
            .map_err(|e| HookError::ThreadSpawn(e.to_string()))?;

        match status_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.thread_id = thread_id;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                *lock_sink() = None;
                let _ = thread.join();
                Err(HookError::Install(e))
            }
            Err(_) => {
                *lock_sink() = None;
                Err(HookError::ThreadExited)
            }
        }
    }

    /// Remove the hook and stop the message-loop thread
    pub fn stop(&mut self) {
        if self.thread_id != 0 {
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
            self.thread_id = 0;
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        *lock_sink() = None;
    }

    /// Check if the hook is currently installed
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Default for HookListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HookListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_sink() -> std::sync::MutexGuard<'static, Option<Box<dyn EventSink + Send>>> {
    HOOK_SINK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Body of the hook thread: install, pump messages, uninstall
fn run_message_loop(status_tx: mpsc::Sender<Result<u32, PlatformError>>) {
    let hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), ptr::null_mut(), 0) };
    if hook.is_null() {
        let e = last_error("SetWindowsHookExW");
        error!(%e, "failed to install keyboard hook");
        let _ = status_tx.send(Err(e));
        return;
    }

    let thread_id = unsafe { GetCurrentThreadId() };
    let _ = status_tx.send(Ok(thread_id));
    info!(thread_id, "keyboard hook installed");

    // Returns 0 on WM_QUIT and -1 on error; both end the loop.
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {}
        UnhookWindowsHookEx(hook);
    }

    info!("keyboard hook removed");
}

/// Hand an event to the sink. Never panics; any trouble means Forward.
fn dispatch(event: KeyEvent) -> Decision {
    let result = panic::catch_unwind(|| {
        let mut guard = match HOOK_SINK.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Decision::Forward,
        };
        match guard.as_mut() {
            Some(sink) => sink.handle(event),
            None => Decision::Forward,
        }
    });
    result.unwrap_or(Decision::Forward)
}

/// Low-level keyboard hook proc, called on the hook thread
unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        let kb = &*(l_param as *const KBDLLHOOKSTRUCT);
        if let Some(kind) = KeyEventKind::from_message(w_param as u32) {
            let event = KeyEvent {
                vk_code: kb.vkCode,
                kind,
                injected: kb.flags & LLKHF_INJECTED != 0,
            };
            if dispatch(event) == Decision::Suppress {
                trace!(vk = event.vk_code, injected = event.injected, "suppressed");
                return 1;
            }
        }
    }

    CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let listener = HookListener::new();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut listener = HookListener::new();
        listener.stop();
        assert!(!listener.is_running());
    }

    #[test]
    fn test_dispatch_without_sink_forwards() {
        let event = KeyEvent::new(crate::hotkey::VK_CAPITAL, KeyEventKind::KeyDown);
        assert_eq!(dispatch(event), Decision::Forward);
    }
}
