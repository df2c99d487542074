pub mod authority;
pub mod engine;
pub mod repository;
pub mod service;
pub mod templates;

pub use authority::{
    ApprovalValidationFailure, ApprovalValidationInput, ApprovalValidationResult,
    ApprovalValidator, ApproverAuthority,
};
pub use engine::{
    Decision, DecisionOutcome, NewApprovalRequest, StepDecision, WorkflowEngine, WorkflowError,
};
pub use repository::{ApprovalRepository, RepositoryError};
pub use service::{ApprovalFilter, ApprovalService, ApprovalSummary, DecisionInput};
pub use templates::{FlowTemplate, FlowTemplates, TemplateStep};
