use uuid::Uuid;

/// A process-unique identifier generated at supervisor startup and carried on
/// every write to the task store and state journal; used as the author tag
/// in conflict records (spec.md §3, "Session id").
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id for a newly started supervisor process.
    pub fn generate() -> Self {
        Self(format!("session-{}", Uuid::new_v4()))
    }

    /// Wrap an existing string as a session id (used when restoring a
    /// session id carried over from a prior run, e.g. in tests).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("session-"));
    }

    #[test]
    fn from_raw_roundtrips() {
        let id = SessionId::from_raw("fixed-id");
        assert_eq!(id.as_str(), "fixed-id");
        assert_eq!(id.to_string(), "fixed-id");
    }
}
