// Error taxonomy for draft progression, submissions, and scoring.

use thiserror::Error;

/// Broad category of a [`DraftError`], for callers that map failures onto
/// their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    Conflict,
    Invariant,
}

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    /// An event, team, or player that the operation names does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The event's lifecycle state forbids the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input (duplicate entries, out-of-range slot, incomplete order).
    #[error("validation error for `{field}`: {message}")]
    Validation { field: String, message: String },

    /// The operation collides with something already recorded.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored progression state disagrees with its derivation. This indicates
    /// a bug or corrupted storage rather than bad input.
    #[error("draft invariant violated: {0}")]
    Invariant(String),
}

impl DraftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DraftError::NotFound { .. } => ErrorKind::NotFound,
            DraftError::InvalidState(_) => ErrorKind::InvalidState,
            DraftError::Validation { .. } => ErrorKind::Validation,
            DraftError::Conflict(_) => ErrorKind::Conflict,
            DraftError::Invariant(_) => ErrorKind::Invariant,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DraftError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DraftError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type DraftResult<T> = Result<T, DraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            DraftError::not_found("player", 7).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DraftError::InvalidState("paused".into()).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            DraftError::validation("slot", "out of range").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            DraftError::Conflict("already drafted".into()).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn display_includes_context() {
        let err = DraftError::not_found("team", 3);
        assert_eq!(err.to_string(), "team not found: 3");

        let err = DraftError::validation("team_order", "team 2 listed twice");
        assert_eq!(
            err.to_string(),
            "validation error for `team_order`: team 2 listed twice"
        );
    }
}
