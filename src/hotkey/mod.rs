//! Hotkey module for global keyboard event interception
//!
//! Defines the key event vocabulary shared by the interceptor and the
//! platform hook. On Windows the events come from a `WH_KEYBOARD_LL` hook.

mod keys;

pub use keys::{Decision, KeyEvent, KeyEventKind, ModifierProbe, VK_CAPITAL};
