//! Error types for the arena service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Lifecycle code returns `anyhow::Result` and the
//! HTTP layer downcasts to [`ArenaError`] to pick a status code.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific arena scenarios
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("Missing or invalid credentials: {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    #[error("Conflict: {reason}")]
    Conflict {
        reason: String,
        match_id: Option<String>,
        status: Option<String>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Match {match_id} has timed out")]
    Timeout { match_id: String },

    #[error("Upstream call failed: {message}")]
    Upstream { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl ArenaError {
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
            match_id: None,
            status: None,
        }
    }

    pub fn match_not_found(match_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Match",
            id: match_id.to_string(),
        }
    }

    pub fn agent_not_found(agent_id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Agent",
            id: agent_id.to_string(),
        }
    }

    pub fn lock_poisoned(what: &str) -> Self {
        Self::Internal {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = ArenaError::match_not_found("abc").into();
        match err.downcast_ref::<ArenaError>() {
            Some(ArenaError::NotFound { entity, id }) => {
                assert_eq!(*entity, "Match");
                assert_eq!(id, "abc");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_display_is_abstract() {
        let err = ArenaError::Upstream {
            message: "judge returned 529".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream call failed: judge returned 529");
    }
}
