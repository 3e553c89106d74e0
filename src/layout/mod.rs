//! Layout module for keyboard layout rotation
//!
//! Computes the next installed input layout relative to the one the
//! foreground application is using and asks the OS to apply it.

mod rotator;

pub use rotator::{
    next_index, ForegroundTarget, LayoutId, LayoutPlatform, LayoutRotator, LayoutSwitch,
    RotatorError, SwitchOutcome, MAX_LAYOUTS,
};
