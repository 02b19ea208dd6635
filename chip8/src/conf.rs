//! VM configuration.
use std::time::Duration;

use crate::constants::*;
#[cfg(feature = "serde")]
use crate::error::Chip8Result;

/// VM Configuration Parameters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Chip8Conf {
    /// Instruction rate of the runtime. Unthrottled when not set.
    pub clock_frequency: Option<Hz>,
    /// Fixed seed for `Cxnn (RND Vx, byte)`, for reproducible runs.
    pub seed: Option<u64>,
    /// Start the runtime in single step mode.
    pub debug: bool,
    pub quirks: Quirks,
}

/// Behaviours where historical interpreters disagree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Quirks {
    /// `8xy6 (SHR)` and `8xyE (SHL)` shift VY into VX, as the COSMAC VIP did.
    ///
    /// Otherwise VX is shifted in place and VY is ignored.
    pub shift_reads_vy: bool,
    /// Sprite pixels that fall past the right or bottom edge are dropped.
    ///
    /// Otherwise they wrap around to the opposite edge.
    pub clip_sprites: bool,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

#[cfg(feature = "serde")]
impl Chip8Conf {
    /// Parse a YAML configuration document.
    ///
    /// ```yaml
    /// clock_frequency: 500
    /// seed: 42
    /// quirks:
    ///   shift_reads_vy: true
    /// ```
    pub fn from_yaml_str(source: &str) -> Chip8Result<Self> {
        let conf = serde_yaml::from_str(source)?;
        log::debug!("loaded configuration: {conf:?}");
        Ok(conf)
    }

    /// Read a YAML configuration file.
    pub fn from_file(filepath: impl AsRef<std::path::Path>) -> Chip8Result<Self> {
        let source = std::fs::read_to_string(filepath.as_ref())?;
        Self::from_yaml_str(&source)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);

        let interval: Duration = Hz(0).into();
        assert!(interval.is_zero());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_parse_yaml() {
        let conf = Chip8Conf::from_yaml_str(concat!(
            "clock_frequency: 500\n",
            "seed: 7\n",
            "quirks:\n",
            "  clip_sprites: true\n",
        ))
        .unwrap();

        assert_eq!(conf.clock_frequency, Some(Hz(500)));
        assert_eq!(conf.seed, Some(7));
        assert!(!conf.debug);
        assert!(conf.quirks.clip_sprites);
        assert!(!conf.quirks.shift_reads_vy);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_parse_empty_is_default() {
        let conf = Chip8Conf::from_yaml_str("{}").unwrap();
        assert_eq!(conf, Chip8Conf::default());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_unknown_field() {
        let result = Chip8Conf::from_yaml_str("turbo: true");
        assert!(matches!(result, Err(crate::error::Chip8Error::Config(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_missing_file() {
        let result = Chip8Conf::from_file("does/not/exist.yaml");
        assert!(matches!(result, Err(crate::error::Chip8Error::Io(_))));
    }
}
