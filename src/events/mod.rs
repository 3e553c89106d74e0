//! Events module for interceptor notifications
//!
//! The hook thread must return quickly, so it only pushes these events
//! onto a broadcast channel; the async side does the logging.

use serde::{Deserialize, Serialize};

/// Events emitted by the interceptor for every CapsLock decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterceptEvent {
    /// CapsLock pressed alone; a layout switch was performed
    LayoutSwitched {
        /// Layout index the switch started from, if it was computed
        from: Option<usize>,
        /// Layout index switched to, if it was computed
        to: Option<usize>,
        /// Number of installed layouts seen
        count: usize,
    },

    /// CapsLock pressed alone but there was nothing to switch
    SwitchSkipped {
        /// Why the switch was a no-op
        reason: String,
    },

    /// The layout change could not be dispatched
    SwitchFailed {
        /// Error description
        reason: String,
    },

    /// CapsLock pressed with the modifier; native toggle passed through
    NativeCapsLock,

    /// CapsLock key-up with no matching key-down; suppressed
    UnmatchedKeyUp,
}

impl std::fmt::Display for InterceptEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterceptEvent::LayoutSwitched { from, to, count } => match (from, to) {
                (Some(from), Some(to)) => {
                    write!(f, "LAYOUT_SWITCHED ({} -> {} of {})", from, to, count)
                }
                _ => write!(f, "LAYOUT_SWITCHED"),
            },
            InterceptEvent::SwitchSkipped { reason } => write!(f, "SWITCH_SKIPPED ({})", reason),
            InterceptEvent::SwitchFailed { reason } => write!(f, "SWITCH_FAILED ({})", reason),
            InterceptEvent::NativeCapsLock => write!(f, "NATIVE_CAPS_LOCK"),
            InterceptEvent::UnmatchedKeyUp => write!(f, "UNMATCHED_KEY_UP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = InterceptEvent::LayoutSwitched {
            from: Some(1),
            to: Some(2),
            count: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("layout_switched"));
        assert!(json.contains("\"count\":3"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"unmatched_key_up"}"#;
        let event: InterceptEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, InterceptEvent::UnmatchedKeyUp);
    }

    #[test]
    fn test_display() {
        let event = InterceptEvent::LayoutSwitched {
            from: Some(2),
            to: Some(0),
            count: 3,
        };
        assert_eq!(event.to_string(), "LAYOUT_SWITCHED (2 -> 0 of 3)");
        assert_eq!(InterceptEvent::NativeCapsLock.to_string(), "NATIVE_CAPS_LOCK");
    }
}
