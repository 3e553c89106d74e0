//! Configuration loading and management
//!
//! Configuration is read once at startup from command-line flags (and one
//! environment variable) and never changes afterwards.

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

/// Environment variable consulted when no modifier flag is given
pub const MODIFIER_ENV_VAR: &str = "CAPSLAYOUT_MODIFIER";

/// Modifier key that restores native CapsLock behavior when held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModifierKey {
    /// Alt (VK_MENU)
    #[default]
    Alt,
    /// Shift (VK_SHIFT)
    Shift,
    /// Ctrl (VK_CONTROL)
    Ctrl,
}

impl ModifierKey {
    /// Windows virtual-key code covering both the left and right key
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn vk_code(self) -> i32 {
        match self {
            ModifierKey::Alt => 0x12,
            ModifierKey::Shift => 0x10,
            ModifierKey::Ctrl => 0x11,
        }
    }
}

impl fmt::Display for ModifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierKey::Alt => write!(f, "Alt"),
            ModifierKey::Shift => write!(f, "Shift"),
            ModifierKey::Ctrl => write!(f, "Ctrl"),
        }
    }
}

impl FromStr for ModifierKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alt" => Ok(ModifierKey::Alt),
            "shift" => Ok(ModifierKey::Shift),
            "ctrl" | "control" => Ok(ModifierKey::Ctrl),
            _ => Err(ConfigError::InvalidModifier(s.to_string())),
        }
    }
}

/// What to do when no foreground window can be found at switch time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoForegroundPolicy {
    /// Do nothing
    #[default]
    Skip,
    /// Change the layout for this process only
    ProcessScoped,
}

/// How a layout switch is carried out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwitchStrategy {
    /// Compute the next installed layout and ask the foreground window to use it
    #[default]
    Rotate,
    /// Synthesize the system's own next-layout chord (Win+Space)
    Chord,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Modifier that keeps CapsLock's native toggle
    pub modifier: ModifierKey,

    /// Behavior when there is no foreground window
    pub no_foreground: NoForegroundPolicy,

    /// Layout switching strategy
    pub strategy: SwitchStrategy,
}

/// Errors produced while reading configuration
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("invalid modifier '{0}' (expected alt, shift or ctrl)")]
    InvalidModifier(String),
}

impl Config {
    /// Load configuration from the process arguments and environment
    pub fn load() -> Result<Self, ConfigError> {
        let env_modifier = std::env::var(MODIFIER_ENV_VAR).ok();
        let args = decode_args(std::env::args_os().skip(1))?;
        Self::from_args(args, env_modifier.as_deref())
    }

    /// Build configuration from flags, falling back to `env_modifier`
    ///
    /// The first modifier flag wins; later ones are ignored.
    pub fn from_args<I, S>(args: I, env_modifier: Option<&str>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Config::default();
        let mut modifier: Option<ModifierKey> = None;

        for arg in args {
            let raw = arg.as_ref();
            let flag = raw.trim_start_matches('-').to_ascii_lowercase();
            if flag.len() == raw.len() {
                return Err(ConfigError::UnknownFlag(raw.to_string()));
            }

            match flag.as_str() {
                "alt" | "shift" | "ctrl" => {
                    if modifier.is_none() {
                        modifier = Some(flag.parse()?);
                    }
                }
                "process-fallback" => config.no_foreground = NoForegroundPolicy::ProcessScoped,
                "chord" => config.strategy = SwitchStrategy::Chord,
                _ => return Err(ConfigError::UnknownFlag(raw.to_string())),
            }
        }

        config.modifier = match (modifier, env_modifier) {
            (Some(m), _) => m,
            (None, Some(value)) => value.parse()?,
            (None, None) => ModifierKey::default(),
        };

        Ok(config)
    }
}

/// Convert raw arguments to strings; one that is not valid Unicode is an unknown flag
fn decode_args<I>(args: I) -> Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            arg.into_string()
                .map_err(|raw| ConfigError::UnknownFlag(raw.to_string_lossy().into_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_args(Vec::<String>::new(), None).unwrap();
        assert_eq!(config.modifier, ModifierKey::Alt);
        assert_eq!(config.no_foreground, NoForegroundPolicy::Skip);
        assert_eq!(config.strategy, SwitchStrategy::Rotate);
    }

    #[test]
    fn test_first_modifier_flag_wins() {
        let config = Config::from_args(["-Shift", "-ctrl"], None).unwrap();
        assert_eq!(config.modifier, ModifierKey::Shift);
    }

    #[test]
    fn test_double_dash_and_extra_flags() {
        let config = Config::from_args(["--ctrl", "-process-fallback", "-chord"], None).unwrap();
        assert_eq!(config.modifier, ModifierKey::Ctrl);
        assert_eq!(config.no_foreground, NoForegroundPolicy::ProcessScoped);
        assert_eq!(config.strategy, SwitchStrategy::Chord);
    }

    #[test]
    fn test_env_modifier_used_without_flag() {
        let config = Config::from_args(Vec::<String>::new(), Some("control")).unwrap();
        assert_eq!(config.modifier, ModifierKey::Ctrl);

        let config = Config::from_args(["-alt"], Some("shift")).unwrap();
        assert_eq!(config.modifier, ModifierKey::Alt);
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(
            Config::from_args(["-meta"], None),
            Err(ConfigError::UnknownFlag("-meta".to_string()))
        );
        assert_eq!(
            Config::from_args(["shift"], None),
            Err(ConfigError::UnknownFlag("shift".to_string()))
        );
        assert_eq!(
            Config::from_args(Vec::<String>::new(), Some("hyper")),
            Err(ConfigError::InvalidModifier("hyper".to_string()))
        );
    }

    #[test]
    fn test_decode_args() {
        let args = decode_args([OsString::from("-shift"), OsString::from("-chord")]).unwrap();
        assert_eq!(args, vec!["-shift".to_string(), "-chord".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_argument_is_unknown_flag() {
        use std::os::unix::ffi::OsStringExt;

        let raw = OsString::from_vec(vec![b'-', 0xff]);
        assert_eq!(
            decode_args([raw]),
            Err(ConfigError::UnknownFlag("-\u{fffd}".to_string()))
        );
    }

    #[test]
    fn test_modifier_vk_codes() {
        assert_eq!(ModifierKey::Alt.vk_code(), 0x12);
        assert_eq!(ModifierKey::Shift.vk_code(), 0x10);
        assert_eq!(ModifierKey::Ctrl.vk_code(), 0x11);
        assert_eq!(ModifierKey::Ctrl.to_string(), "Ctrl");
    }
}
