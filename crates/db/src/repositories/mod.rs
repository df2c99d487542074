pub mod approval;
pub mod memory;

pub use approval::SqlApprovalRepository;
pub use bushidage_core::approvals::repository::{ApprovalRepository, RepositoryError};
pub use memory::InMemoryApprovalRepository;

pub(crate) fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Database(error.to_string())
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
