//! Key event definitions and live modifier sampling
//!
//! Mirrors the subset of the Windows low-level keyboard vocabulary the
//! interceptor cares about, so the state machine can be driven without
//! a real hook.

use crate::config::ModifierKey;

/// Virtual-key code of CapsLock
pub const VK_CAPITAL: u32 = 0x14;

/// Window messages delivered to a low-level keyboard hook
pub mod messages {
    pub const WM_KEYDOWN: u32 = 0x0100;
    pub const WM_KEYUP: u32 = 0x0101;
    pub const WM_SYSKEYDOWN: u32 = 0x0104;
    pub const WM_SYSKEYUP: u32 = 0x0105;
}

/// Kind of keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
    /// Key down while Alt is held
    SysKeyDown,
    /// Key up while Alt is held
    SysKeyUp,
}

impl KeyEventKind {
    /// Map a hook message identifier to an event kind
    pub fn from_message(message: u32) -> Option<Self> {
        match message {
            messages::WM_KEYDOWN => Some(Self::KeyDown),
            messages::WM_KEYUP => Some(Self::KeyUp),
            messages::WM_SYSKEYDOWN => Some(Self::SysKeyDown),
            messages::WM_SYSKEYUP => Some(Self::SysKeyUp),
            _ => None,
        }
    }

    /// True for both plain and system key-down events
    pub fn is_down(self) -> bool {
        matches!(self, Self::KeyDown | Self::SysKeyDown)
    }
}

/// A single keyboard event as seen by the interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk_code: u32,
    pub kind: KeyEventKind,
    /// Event was synthesized by software rather than typed
    pub injected: bool,
}

impl KeyEvent {
    pub fn new(vk_code: u32, kind: KeyEventKind) -> Self {
        Self {
            vk_code,
            kind,
            injected: false,
        }
    }

    pub fn is_caps_lock(&self) -> bool {
        self.vk_code == VK_CAPITAL
    }
}

/// What the hook should do with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Pass the event on to the next hook and applications
    Forward,
    /// Swallow the event
    Suppress,
}

/// Samples the physical state of a modifier key at the current instant
pub trait ModifierProbe {
    fn is_held(&self, key: ModifierKey) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message() {
        assert_eq!(KeyEventKind::from_message(0x0100), Some(KeyEventKind::KeyDown));
        assert_eq!(KeyEventKind::from_message(0x0101), Some(KeyEventKind::KeyUp));
        assert_eq!(KeyEventKind::from_message(0x0104), Some(KeyEventKind::SysKeyDown));
        assert_eq!(KeyEventKind::from_message(0x0105), Some(KeyEventKind::SysKeyUp));
        assert_eq!(KeyEventKind::from_message(0x0102), None);
    }

    #[test]
    fn test_is_down() {
        assert!(KeyEventKind::KeyDown.is_down());
        assert!(KeyEventKind::SysKeyDown.is_down());
        assert!(!KeyEventKind::KeyUp.is_down());
        assert!(!KeyEventKind::SysKeyUp.is_down());
    }

    #[test]
    fn test_caps_lock_detection() {
        assert!(KeyEvent::new(VK_CAPITAL, KeyEventKind::KeyDown).is_caps_lock());
        assert!(!KeyEvent::new(0x41, KeyEventKind::KeyDown).is_caps_lock());
    }
}
