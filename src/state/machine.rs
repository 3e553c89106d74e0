//! Core interceptor state machine
//!
//! Tracks one CapsLock key-down/key-up pair at a time and decides whether
//! each CapsLock event is forwarded or suppressed. All other keys pass
//! through untouched.

use std::panic::{self, AssertUnwindSafe};

use tokio::sync::broadcast;

use crate::config::ModifierKey;
use crate::events::InterceptEvent;
use crate::hotkey::{Decision, KeyEvent, ModifierProbe};
use crate::layout::{LayoutSwitch, SwitchOutcome};

/// The three possible interceptor states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// No CapsLock press in progress
    #[default]
    Idle,
    /// CapsLock is down and the modifier was held when it went down
    CapsDownWithModifier,
    /// CapsLock is down without the modifier; a layout switch was issued
    CapsDownNoModifier,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::CapsDownWithModifier => write!(f, "CapsDownWithModifier"),
            State::CapsDownNoModifier => write!(f, "CapsDownNoModifier"),
        }
    }
}

/// Receives every keyboard event from the platform hook
pub trait EventSink {
    fn handle(&mut self, event: KeyEvent) -> Decision;
}

/// CapsLock interceptor
pub struct Interceptor<P, S> {
    /// Current state
    state: State,
    /// Modifier that restores native CapsLock
    modifier: ModifierKey,
    /// Live modifier sampling
    probe: P,
    /// Layout rotation
    switcher: S,
    /// Channel for emitting intercept events
    event_tx: broadcast::Sender<InterceptEvent>,
}

impl<P: ModifierProbe, S: LayoutSwitch> Interceptor<P, S> {
    /// Create a new interceptor in the Idle state
    pub fn new(
        modifier: ModifierKey,
        probe: P,
        switcher: S,
        event_tx: broadcast::Sender<InterceptEvent>,
    ) -> Self {
        Self {
            state: State::Idle,
            modifier,
            probe,
            switcher,
            event_tx,
        }
    }

    /// Get the current state
    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    fn on_caps_down(&mut self) -> Decision {
        match self.state {
            State::Idle => {
                if self.probe.is_held(self.modifier) {
                    self.state = State::CapsDownWithModifier;
                    self.emit(InterceptEvent::NativeCapsLock);
                    Decision::Forward
                } else {
                    self.state = State::CapsDownNoModifier;
                    self.switch_layout();
                    Decision::Suppress
                }
            }
            // Auto-repeat keeps the decision made on the first key-down.
            State::CapsDownWithModifier => Decision::Forward,
            State::CapsDownNoModifier => Decision::Suppress,
        }
    }

    fn on_caps_up(&mut self) -> Decision {
        let decision = match self.state {
            State::CapsDownWithModifier => Decision::Forward,
            State::CapsDownNoModifier => Decision::Suppress,
            State::Idle => {
                self.emit(InterceptEvent::UnmatchedKeyUp);
                Decision::Suppress
            }
        };
        self.state = State::Idle;
        decision
    }

    /// Run the switcher; a panic counts as a failed switch so the
    /// key-down/key-up pair is still suppressed as a whole
    fn switch_layout(&mut self) {
        let switcher = &mut self.switcher;
        let result = match panic::catch_unwind(AssertUnwindSafe(|| switcher.switch_layout())) {
            Ok(result) => result,
            Err(_) => {
                self.emit(InterceptEvent::SwitchFailed {
                    reason: "layout switcher panicked".to_string(),
                });
                return;
            }
        };

        let event = match result {
            Ok(SwitchOutcome::Switched { from, to, count }) => InterceptEvent::LayoutSwitched {
                from: Some(from),
                to: Some(to),
                count,
            },
            Ok(SwitchOutcome::ChordSent) => InterceptEvent::LayoutSwitched {
                from: None,
                to: None,
                count: 0,
            },
            Ok(SwitchOutcome::NoForeground) => InterceptEvent::SwitchSkipped {
                reason: "no foreground window".to_string(),
            },
            Ok(SwitchOutcome::NoLayouts) => InterceptEvent::SwitchSkipped {
                reason: "no installed layouts".to_string(),
            },
            Err(e) => InterceptEvent::SwitchFailed {
                reason: e.to_string(),
            },
        };
        self.emit(event);
    }

    /// Emit an event without blocking; having no receivers is fine
    fn emit(&self, event: InterceptEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl<P: ModifierProbe, S: LayoutSwitch> EventSink for Interceptor<P, S> {
    fn handle(&mut self, event: KeyEvent) -> Decision {
        if !event.is_caps_lock() {
            return Decision::Forward;
        }

        if event.kind.is_down() {
            self.on_caps_down()
        } else {
            self.on_caps_up()
        }
    }
}
