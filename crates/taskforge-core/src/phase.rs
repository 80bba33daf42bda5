use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A project phase, shared by the Task Store (`Task::phase`) and the State
/// Journal (`current_phase`). Closed set per spec.md §3/§4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Requirements gathering and exploration.
    Research,
    /// Scoping and sequencing work.
    Planning,
    /// Interfaces, schemas, and architecture.
    Design,
    /// Writing code.
    Implementation,
    /// Writing and running tests.
    Testing,
    /// Final acceptance / sign-off.
    Validation,
}

impl Phase {
    /// All phases, in the canonical order used for default project config.
    pub const ALL: [Phase; 6] = [
        Phase::Research,
        Phase::Planning,
        Phase::Design,
        Phase::Implementation,
        Phase::Testing,
        Phase::Validation,
    ];

    /// The lower-case wire name for this phase (matches `serde` rename).
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Planning => "planning",
            Phase::Design => "design",
            Phase::Implementation => "implementation",
            Phase::Testing => "testing",
            Phase::Validation => "validation",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string does not name a known phase.
#[derive(Debug, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Normalization (to lower case) survives even when the validator
        // later rejects the value in enforce mode — see spec.md §4.A.
        match s.to_lowercase().as_str() {
            "research" => Ok(Phase::Research),
            "planning" => Ok(Phase::Planning),
            "design" => Ok(Phase::Design),
            "implementation" => Ok(Phase::Implementation),
            "testing" => Ok(Phase::Testing),
            "validation" => Ok(Phase::Validation),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("RESEARCH".parse::<Phase>().unwrap(), Phase::Research);
        assert_eq!("Implementation".parse::<Phase>().unwrap(), Phase::Implementation);
    }

    #[test]
    fn rejects_unknown_phase() {
        assert!("deployment".parse::<Phase>().is_err());
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(Phase::Testing.to_string(), "testing");
    }

    #[test]
    fn all_covers_six_phases() {
        assert_eq!(Phase::ALL.len(), 6);
    }
}
