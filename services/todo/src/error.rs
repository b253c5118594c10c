//! Error taxonomy for todo creation.

use thiserror::Error;

/// Reasons a todo item is rejected before any I/O happens
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("description cannot be empty")]
    EmptyDescription,

    #[error("due date must be in the future")]
    DueDateNotInFuture,
}

/// Errors surfaced by [`crate::TodoService::create_todo`]
///
/// `Publish` and `Serialization` are produced by the event step and are only
/// ever logged by the service; callers of `create_todo` never receive them.
#[derive(Error, Debug)]
pub enum TodoError {
    #[error("todo validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid todo ID {id:?}: {source}")]
    InvalidIdentifier {
        id: String,
        #[source]
        source: uuid::Error,
    },

    #[error("failed to upload file: {0:#}")]
    FileUpload(#[source] anyhow::Error),

    #[error("failed to save todo to repository: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("failed to publish todo event after {attempts} attempt(s): {source:#}")]
    Publish {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to marshal todo event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("todo creation cancelled")]
    Cancelled,
}

impl TodoError {
    /// True when the request itself was at fault rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TodoError::Validation(_) | TodoError::InvalidIdentifier { .. }
        )
    }
}
