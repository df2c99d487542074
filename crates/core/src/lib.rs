pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::{
    ApprovalFilter, ApprovalRepository, ApprovalService, ApprovalSummary, ApprovalValidator,
    Decision, DecisionInput, FlowTemplate, FlowTemplates, NewApprovalRequest, RepositoryError,
    WorkflowEngine,
};
pub use audit::{AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::approval::{
    Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalStep, Identity, Priority,
    RequestType, StepStatus,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};

pub use chrono;
pub use rust_decimal;
