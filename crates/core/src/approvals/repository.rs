use async_trait::async_trait;
use thiserror::Error;

use crate::domain::approval::{ApprovalId, ApprovalRequest};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("approval request `{id}` already exists")]
    Duplicate { id: ApprovalId },
    #[error("approval request `{id}` was not found")]
    NotFound { id: ApprovalId },
    #[error("approval request `{id}` is at version {actual}, expected {expected}")]
    Conflict { id: ApprovalId, expected: u32, actual: u32 },
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { id } => Self::NotFound { id },
            RepositoryError::Conflict { id, expected, actual } => {
                Self::ConcurrencyConflict { id, expected, actual }
            }
            other @ (RepositoryError::Duplicate { .. }
            | RepositoryError::Database(_)
            | RepositoryError::Decode(_)) => Self::Persistence(other.to_string()),
        }
    }
}

/// Storage port for approval requests. Each request is its own aggregate;
/// writes after creation go through `update`, which compares versions.
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// All requests, newest submission first.
    async fn list(&self) -> Result<Vec<ApprovalRequest>, RepositoryError>;

    async fn find_by_id(&self, id: &ApprovalId)
        -> Result<Option<ApprovalRequest>, RepositoryError>;

    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError>;

    /// Stores `request` only if the persisted copy is still at
    /// `expected_version`.
    async fn update(
        &self,
        request: ApprovalRequest,
        expected_version: u32,
    ) -> Result<(), RepositoryError>;
}
