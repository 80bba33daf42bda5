use serde::{Deserialize, Serialize};

/// The broad family a detected threat belongs to (spec.md §4.A, "Threat taxonomy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreatType {
    /// Attempted override of the agent's instructions via embedded phrasing.
    PromptInjection,
    /// Zero-width or bidi-override code points hiding content from a reviewer.
    UnicodeObfuscation,
    /// Attempted escape from an allowed directory via `..`, encoding, or NUL.
    PathTraversal,
    /// A shell command outside the allowlist, or one using chaining/substitution.
    CommandUnsafe,
}

/// A single detected threat, as returned in `ValidationResult::threats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    /// The broad family (`promptInjection`, `unicodeObfuscation`, ...).
    #[serde(rename = "type")]
    pub threat_type: ThreatType,
    /// A finer-grained tag within the family, e.g. `rtlOverride` within
    /// `unicodeObfuscation`, or `chaining` within `commandUnsafe`.
    pub category: String,
    /// The literal pattern or rule that matched, when one exists verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_pattern: Option<String>,
}

impl Threat {
    /// Construct a threat with no literal matched pattern (e.g. a structural
    /// check like "disallowed verb" rather than a substring hit).
    pub fn new(threat_type: ThreatType, category: impl Into<String>) -> Self {
        Self {
            threat_type,
            category: category.into(),
            blocked_pattern: None,
        }
    }

    /// Construct a threat that records the literal pattern that matched.
    pub fn with_pattern(
        threat_type: ThreatType,
        category: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            threat_type,
            category: category.into(),
            blocked_pattern: Some(pattern.into()),
        }
    }
}
