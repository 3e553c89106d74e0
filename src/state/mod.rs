//! State machine module for CapsLock interception
//!
//! Provides an explicit state machine with three states:
//! - Idle: no CapsLock press in progress
//! - CapsDownWithModifier: native CapsLock toggle is passing through
//! - CapsDownNoModifier: CapsLock was swallowed and a layout switch issued

mod machine;

pub use machine::{EventSink, Interceptor, State};
