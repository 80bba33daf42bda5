use std::str::FromStr;

/// Validation mode (spec.md §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Reject on any detected threat. Default.
    #[default]
    Enforce,
    /// Always report `valid=true`, but still record and emit threats.
    Audit,
}

/// Error returned when switching to a mode that isn't `enforce` or `audit`.
#[derive(Debug, thiserror::Error)]
#[error("invalid validator mode: {0:?}")]
pub struct InvalidMode(pub String);

impl FromStr for Mode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enforce" => Ok(Mode::Enforce),
            "audit" => Ok(Mode::Audit),
            other => Err(InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!("enforce".parse::<Mode>().unwrap(), Mode::Enforce);
        assert_eq!("audit".parse::<Mode>().unwrap(), Mode::Audit);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!("lenient".parse::<Mode>().is_err());
    }

    #[test]
    fn default_is_enforce() {
        assert_eq!(Mode::default(), Mode::Enforce);
    }
}
