//! Layout rotation algorithm
//!
//! The installed layout list is queried fresh on every switch because
//! layouts can be added or removed while the daemon runs. The only state
//! kept between switches is the last computed index, used when the current
//! layout cannot be found in the list.

use tracing::trace;

use crate::config::{NoForegroundPolicy, SwitchStrategy};
use crate::platform::PlatformError;

/// Maximum number of installed layouts considered for rotation
pub const MAX_LAYOUTS: usize = 16;

/// OS input layout identifier (an `HKL` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(pub u64);

impl LayoutId {
    /// Locale identifier stored in the low word
    pub fn locale(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Compare locales only; the high word encodes the device variant
    pub fn same_locale(self, other: LayoutId) -> bool {
        self.locale() == other.locale()
    }
}

impl std::fmt::Display for LayoutId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// The foreground window and the thread that owns its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundTarget {
    /// Window handle, stored as an integer so the target is `Send`
    pub window: isize,
    pub thread_id: u32,
}

/// OS services needed to rotate layouts
pub trait LayoutPlatform {
    /// Current foreground window, if any
    fn foreground(&self) -> Option<ForegroundTarget>;

    /// Layout active on the target's input thread
    fn current_layout(&self, target: &ForegroundTarget) -> LayoutId;

    /// Layout active on the calling thread
    fn process_layout(&self) -> LayoutId;

    /// Installed layouts in system order, at most `max` of them
    fn installed_layouts(&self, max: usize) -> Vec<LayoutId>;

    /// Ask the target window to switch layout. Must not wait for the target.
    fn request_layout_change(
        &self,
        target: &ForegroundTarget,
        layout: LayoutId,
    ) -> Result<(), PlatformError>;

    /// Switch the layout for this process only
    fn activate_for_process(&self, layout: LayoutId) -> Result<(), PlatformError>;

    /// Synthesize the system next-layout chord
    fn send_next_layout_chord(&self) -> Result<(), PlatformError>;
}

/// Result of a successful switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// A layout change was dispatched
    Switched { from: usize, to: usize, count: usize },
    /// The next-layout chord was synthesized
    ChordSent,
    /// No foreground window; nothing was done
    NoForeground,
    /// No installed layouts; nothing was done
    NoLayouts,
}

/// Errors that can occur while switching layouts
#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("layout change could not be dispatched: {0}")]
    Dispatch(#[source] PlatformError),
}

/// Something that can switch to the next layout
pub trait LayoutSwitch {
    fn switch_layout(&mut self) -> Result<SwitchOutcome, RotatorError>;
}

/// Index following `current` in a list of `count` layouts
///
/// `count` must be non-zero.
pub fn next_index(current: usize, count: usize) -> usize {
    (current + 1) % count
}

/// Rotates through installed layouts using a `LayoutPlatform`
pub struct LayoutRotator<P> {
    platform: P,
    policy: NoForegroundPolicy,
    strategy: SwitchStrategy,
    /// Index computed by the previous switch
    last_known_index: Option<usize>,
}

impl<P: LayoutPlatform> LayoutRotator<P> {
    pub fn new(platform: P, policy: NoForegroundPolicy, strategy: SwitchStrategy) -> Self {
        Self {
            platform,
            policy,
            strategy,
            last_known_index: None,
        }
    }

    /// Index remembered from the previous switch
    #[cfg(test)]
    pub fn last_known_index(&self) -> Option<usize> {
        self.last_known_index
    }

    /// Switch the foreground application to the next installed layout
    ///
    /// Never blocks on the target application. Missing foreground window,
    /// an empty layout list and an unknown current layout are all handled
    /// locally; only a refused dispatch is reported as an error.
    pub fn switch_to_next_layout(&mut self) -> Result<SwitchOutcome, RotatorError> {
        if self.strategy == SwitchStrategy::Chord {
            self.platform
                .send_next_layout_chord()
                .map_err(RotatorError::Dispatch)?;
            return Ok(SwitchOutcome::ChordSent);
        }

        let target = self.platform.foreground();
        let current = match (&target, self.policy) {
            (Some(target), _) => self.platform.current_layout(target),
            (None, NoForegroundPolicy::ProcessScoped) => self.platform.process_layout(),
            (None, NoForegroundPolicy::Skip) => {
                trace!("no foreground window, skipping layout switch");
                return Ok(SwitchOutcome::NoForeground);
            }
        };

        let mut layouts = self.platform.installed_layouts(MAX_LAYOUTS);
        layouts.truncate(MAX_LAYOUTS);
        if layouts.is_empty() {
            trace!("no installed layouts, skipping layout switch");
            return Ok(SwitchOutcome::NoLayouts);
        }

        let count = layouts.len();
        let from = layouts
            .iter()
            .position(|layout| layout.same_locale(current))
            .or(self.last_known_index)
            .unwrap_or(0);
        let to = next_index(from, count);
        self.last_known_index = Some(to);

        let next = layouts[to];
        trace!(%current, %next, from, to, count, "rotating layout");

        let dispatched = match target {
            Some(target) => self.platform.request_layout_change(&target, next),
            None => self.platform.activate_for_process(next),
        };
        dispatched.map_err(RotatorError::Dispatch)?;

        Ok(SwitchOutcome::Switched { from, to, count })
    }
}

impl<P: LayoutPlatform> LayoutSwitch for LayoutRotator<P> {
    fn switch_layout(&mut self) -> Result<SwitchOutcome, RotatorError> {
        self.switch_to_next_layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    const EN: LayoutId = LayoutId(0x0409_0409);
    const FR: LayoutId = LayoutId(0x040c_040c);
    const DE: LayoutId = LayoutId(0x0407_0407);

    const TARGET: ForegroundTarget = ForegroundTarget {
        window: 0x1234,
        thread_id: 42,
    };

    #[derive(Default)]
    struct FakePlatform {
        foreground: Option<ForegroundTarget>,
        current: Cell<Option<LayoutId>>,
        process: Option<LayoutId>,
        layouts: RefCell<Vec<LayoutId>>,
        requested: RefCell<Vec<LayoutId>>,
        activated: RefCell<Vec<LayoutId>>,
        chords: Cell<usize>,
        fail_dispatch: bool,
    }

    impl FakePlatform {
        fn with_layouts(layouts: Vec<LayoutId>, current: LayoutId) -> Self {
            Self {
                foreground: Some(TARGET),
                current: Cell::new(Some(current)),
                layouts: RefCell::new(layouts),
                ..Default::default()
            }
        }
    }

    impl LayoutPlatform for &FakePlatform {
        fn foreground(&self) -> Option<ForegroundTarget> {
            self.foreground
        }

        fn current_layout(&self, target: &ForegroundTarget) -> LayoutId {
            assert_eq!(*target, TARGET);
            self.current.get().unwrap_or(LayoutId(0))
        }

        fn process_layout(&self) -> LayoutId {
            self.process.unwrap_or(LayoutId(0))
        }

        fn installed_layouts(&self, max: usize) -> Vec<LayoutId> {
            self.layouts.borrow().iter().copied().take(max).collect()
        }

        fn request_layout_change(
            &self,
            _target: &ForegroundTarget,
            layout: LayoutId,
        ) -> Result<(), PlatformError> {
            if self.fail_dispatch {
                return Err(PlatformError::Win32 {
                    call: "PostMessageW",
                    code: 1400,
                });
            }
            self.requested.borrow_mut().push(layout);
            Ok(())
        }

        fn activate_for_process(&self, layout: LayoutId) -> Result<(), PlatformError> {
            self.activated.borrow_mut().push(layout);
            Ok(())
        }

        fn send_next_layout_chord(&self) -> Result<(), PlatformError> {
            self.chords.set(self.chords.get() + 1);
            Ok(())
        }
    }

    fn rotator(platform: &FakePlatform) -> LayoutRotator<&FakePlatform> {
        LayoutRotator::new(platform, NoForegroundPolicy::Skip, SwitchStrategy::Rotate)
    }

    #[test]
    fn test_next_index_wraps() {
        assert_eq!(next_index(0, 1), 0);
        assert_eq!(next_index(0, 3), 1);
        assert_eq!(next_index(2, 3), 0);
    }

    #[test]
    fn test_two_layouts_toggle() {
        for i in 0..2 {
            assert_eq!(next_index(next_index(i, 2), 2), i);
            assert_ne!(next_index(i, 2), i);
        }
    }

    #[test]
    fn test_two_installed_layouts_alternate() {
        let platform = FakePlatform::with_layouts(vec![EN, FR], EN);
        let mut rotator = rotator(&platform);

        for _ in 0..3 {
            rotator.switch_to_next_layout().unwrap();
            let requested = *platform.requested.borrow().last().unwrap();
            platform.current.set(Some(requested));
        }

        assert_eq!(*platform.requested.borrow(), vec![FR, EN, FR]);
    }

    #[test]
    fn test_rotation_scenario_wraps_around() {
        let platform = FakePlatform::with_layouts(vec![EN, FR, DE], FR);
        let mut rotator = rotator(&platform);

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 1, to: 2, count: 3 });

        platform.current.set(Some(DE));
        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 2, to: 0, count: 3 });

        assert_eq!(*platform.requested.borrow(), vec![DE, EN]);
    }

    #[test]
    fn test_matches_on_locale_bits_only() {
        let platform = FakePlatform::with_layouts(vec![EN, FR], LayoutId(0xf00d_040c));
        let mut rotator = rotator(&platform);

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 1, to: 0, count: 2 });
    }

    #[test]
    fn test_missing_layout_falls_back_to_zero_then_last_index() {
        let platform = FakePlatform::with_layouts(vec![EN, FR, DE], LayoutId(0x0411_0411));
        let mut rotator = rotator(&platform);

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 0, to: 1, count: 3 });
        assert_eq!(rotator.last_known_index(), Some(1));

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 1, to: 2, count: 3 });
    }

    #[test]
    fn test_empty_list_is_noop() {
        let platform = FakePlatform::with_layouts(Vec::new(), EN);
        let mut rotator = rotator(&platform);

        assert_eq!(rotator.switch_to_next_layout().unwrap(), SwitchOutcome::NoLayouts);
        assert!(platform.requested.borrow().is_empty());
        assert_eq!(rotator.last_known_index(), None);
    }

    #[test]
    fn test_list_truncated_to_max() {
        let layouts: Vec<LayoutId> = (0..20).map(|i| LayoutId(0x0400 + i)).collect();
        let platform = FakePlatform::with_layouts(layouts, LayoutId(0x0400 + 15));
        let mut rotator = rotator(&platform);

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 15, to: 0, count: MAX_LAYOUTS });
    }

    #[test]
    fn test_no_foreground_skips_by_default() {
        let platform = FakePlatform {
            layouts: RefCell::new(vec![EN, FR]),
            ..Default::default()
        };
        let mut rotator = rotator(&platform);

        assert_eq!(rotator.switch_to_next_layout().unwrap(), SwitchOutcome::NoForeground);
        assert!(platform.activated.borrow().is_empty());
    }

    #[test]
    fn test_no_foreground_process_scoped_policy() {
        let platform = FakePlatform {
            process: Some(EN),
            layouts: RefCell::new(vec![EN, FR]),
            ..Default::default()
        };
        let mut rotator = LayoutRotator::new(
            &platform,
            NoForegroundPolicy::ProcessScoped,
            SwitchStrategy::Rotate,
        );

        let outcome = rotator.switch_to_next_layout().unwrap();
        assert_eq!(outcome, SwitchOutcome::Switched { from: 0, to: 1, count: 2 });
        assert_eq!(*platform.activated.borrow(), vec![FR]);
        assert!(platform.requested.borrow().is_empty());
    }

    #[test]
    fn test_chord_strategy() {
        let platform = FakePlatform::with_layouts(vec![EN, FR], EN);
        let mut rotator = LayoutRotator::new(&platform, NoForegroundPolicy::Skip, SwitchStrategy::Chord);

        assert_eq!(rotator.switch_to_next_layout().unwrap(), SwitchOutcome::ChordSent);
        assert_eq!(platform.chords.get(), 1);
        assert!(platform.requested.borrow().is_empty());
    }

    #[test]
    fn test_dispatch_failure_still_advances_index() {
        let platform = FakePlatform {
            fail_dispatch: true,
            ..FakePlatform::with_layouts(vec![EN, FR], EN)
        };
        let mut rotator = rotator(&platform);

        assert!(matches!(
            rotator.switch_to_next_layout(),
            Err(RotatorError::Dispatch(_))
        ));
        assert_eq!(rotator.last_known_index(), Some(1));
    }
}
