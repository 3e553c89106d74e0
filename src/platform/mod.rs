//! Platform abstraction layer
//!
//! The interceptor and rotator only talk to the OS through the
//! `ModifierProbe` and `LayoutPlatform` traits. The Win32 implementation
//! lives in a child module and is only compiled on Windows.

#[cfg(windows)]
mod windows;

#[cfg(windows)]
pub use windows::{AsyncKeyProbe, HookListener, Win32Layouts};

/// Errors reported by an OS backend
#[cfg_attr(not(windows), allow(dead_code))]
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{call} failed (os error {code})")]
    Win32 { call: &'static str, code: u32 },

    #[cfg(not(windows))]
    #[error("keyboard interception is not supported on this platform")]
    Unsupported,
}

/// Errors that can occur while installing the keyboard hook
#[cfg(windows)]
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("keyboard hook is already installed")]
    AlreadyRunning,

    #[error("failed to install keyboard hook: {0}")]
    Install(#[source] PlatformError),

    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(String),

    #[error("hook thread exited before reporting status")]
    ThreadExited,
}
