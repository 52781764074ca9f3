//! Typed error hierarchy for taskboard.
//!
//! - `StoreError`: failures of a task store call as seen by the board
//! - `RelocateError`: drag coordinates that do not address a task
//!
//! The server side renders its own `ApiError` (see `store::api`); the
//! database layer and the binary use `anyhow` with context.

use thiserror::Error;

use crate::models::Lane;

/// Errors from a task store call.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl StoreError {
    /// Map an HTTP status and error message to the matching kind.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 409 | 422 => Self::Validation(message),
            401 | 403 => Self::Auth(message),
            404 => Self::NotFound(message),
            _ => Self::Server { status, message },
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors from a relocation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelocateError {
    #[error("No task at index {index} in lane {lane} (lane has {len})")]
    IndexOutOfRange { lane: Lane, index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_from_status_maps_kinds() {
        assert!(matches!(
            StoreError::from_status(400, "bad".into()),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            StoreError::from_status(401, "who".into()),
            StoreError::Auth(_)
        ));
        assert!(matches!(
            StoreError::from_status(404, "gone".into()),
            StoreError::NotFound(_)
        ));
        match StoreError::from_status(503, "down".into()) {
            StoreError::Server { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "down");
            }
            other => panic!("Expected Server variant, got {:?}", other),
        }
    }

    #[test]
    fn relocate_error_names_lane_and_bounds() {
        let err = RelocateError::IndexOutOfRange {
            lane: Lane::InProgress,
            index: 4,
            len: 2,
        };
        assert_eq!(
            err.to_string(),
            "No task at index 4 in lane inprogress (lane has 2)"
        );
    }
}
