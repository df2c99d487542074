use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::templates::{FlowTemplate, FlowTemplates};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::approval::{
    Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalStep, Priority, RequestType,
    StepStatus,
};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovalRequest {
    pub title: String,
    pub request_type: RequestType,
    pub description: String,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub priority: Priority,
}

impl NewApprovalRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::Validation("title is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::Validation("description is required".to_string()));
        }
        if let Some(amount) = self.amount {
            if amount.is_sign_negative() {
                return Err(DomainError::Validation(format!(
                    "amount must not be negative (got {amount})"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn from_approve(approve: bool) -> Self {
        if approve {
            Self::Approve
        } else {
            Self::Reject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// One approver's verdict on the currently pending step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDecision {
    pub decision: Decision,
    pub decided_by: String,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionOutcome {
    Advanced { from_step: u32, to_step: u32 },
    Completed { final_step: u32 },
    Rejected { at_step: u32 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("approval request `{id}` is already {status:?} and accepts no further decisions")]
    TerminalState { id: ApprovalId, status: ApprovalStatus },
    #[error("approval request `{id}` points at step {current_step} outside its {total_steps}-step flow")]
    StepOutOfRange { id: ApprovalId, current_step: u32, total_steps: u32 },
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine {
    templates: FlowTemplates,
}

impl WorkflowEngine {
    pub fn new(templates: FlowTemplates) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &FlowTemplates {
        &self.templates
    }

    pub fn open(
        &self,
        id: ApprovalId,
        draft: NewApprovalRequest,
        applicant: Applicant,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRequest, DomainError> {
        draft.validate()?;
        let template = self.templates.template_for(draft.request_type);
        open_request(id, draft, applicant, &template, now)
    }

    pub fn apply(
        &self,
        request: &mut ApprovalRequest,
        decision: &StepDecision,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, WorkflowError> {
        apply_decision(request, decision, now)
    }

    /// Audit record for a decision that has been stored.
    pub fn decided_event(
        audit: &AuditContext,
        decision: &StepDecision,
        outcome: &DecisionOutcome,
        request: &ApprovalRequest,
    ) -> AuditEvent {
        AuditEvent::from_context(
            audit,
            "approval.decided",
            AuditCategory::Decision,
            AuditOutcome::Success,
        )
        .with_metadata("decision", decision.decision.as_str())
        .with_metadata("outcome", format!("{outcome:?}"))
        .with_metadata("status", request.status.as_str())
        .with_metadata("version", request.version.to_string())
    }

    pub fn decision_rejected_event(
        audit: &AuditContext,
        decision: &StepDecision,
        error: &WorkflowError,
    ) -> AuditEvent {
        AuditEvent::from_context(
            audit,
            "approval.decision_rejected",
            AuditCategory::Decision,
            AuditOutcome::Rejected,
        )
        .with_metadata("decision", decision.decision.as_str())
        .with_metadata("error", error.to_string())
    }
}

pub fn open_request(
    id: ApprovalId,
    draft: NewApprovalRequest,
    applicant: Applicant,
    template: &FlowTemplate,
    now: DateTime<Utc>,
) -> Result<ApprovalRequest, DomainError> {
    if template.steps.is_empty() {
        return Err(DomainError::InvariantViolation(format!(
            "flow template for `{}` has no steps",
            template.request_type.as_str()
        )));
    }

    let steps: Vec<ApprovalStep> = template
        .steps
        .iter()
        .zip(1u32..)
        .map(|(slot, step)| ApprovalStep {
            step,
            approver: slot.approver.clone(),
            role: slot.role.clone(),
            status: if step == 1 { StepStatus::Pending } else { StepStatus::Waiting },
            decided_at: None,
            decided_by: None,
            comment: None,
        })
        .collect();
    let total_steps = u32::try_from(steps.len()).map_err(|_| {
        DomainError::InvariantViolation("flow template is too long".to_string())
    })?;

    Ok(ApprovalRequest {
        id,
        title: draft.title.trim().to_string(),
        request_type: draft.request_type,
        description: draft.description.trim().to_string(),
        amount: draft.amount,
        priority: draft.priority,
        applicant,
        status: ApprovalStatus::Pending,
        current_step: 1,
        total_steps,
        steps,
        version: 1,
        submitted_at: now,
        updated_at: now,
    })
}

pub fn apply_decision(
    request: &mut ApprovalRequest,
    decision: &StepDecision,
    now: DateTime<Utc>,
) -> Result<DecisionOutcome, WorkflowError> {
    if request.status.is_terminal() {
        return Err(WorkflowError::TerminalState {
            id: request.id.clone(),
            status: request.status,
        });
    }

    let out_of_range = || WorkflowError::StepOutOfRange {
        id: request.id.clone(),
        current_step: request.current_step,
        total_steps: request.total_steps,
    };
    let index = request
        .current_step
        .checked_sub(1)
        .and_then(|index| usize::try_from(index).ok())
        .filter(|index| *index < request.steps.len())
        .ok_or_else(out_of_range)?;
    let is_last = index + 1 == request.steps.len();

    let comment =
        decision.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()).map(str::to_string);
    let step = &mut request.steps[index];
    step.status = match decision.decision {
        Decision::Approve => StepStatus::Approved,
        Decision::Reject => StepStatus::Rejected,
    };
    step.decided_at = Some(now);
    step.decided_by = Some(decision.decided_by.clone());
    step.comment = comment;
    request.updated_at = now;

    let from_step = request.current_step;
    let outcome = match decision.decision {
        Decision::Reject => {
            request.status = ApprovalStatus::Rejected;
            DecisionOutcome::Rejected { at_step: from_step }
        }
        Decision::Approve if is_last => {
            request.status = ApprovalStatus::Approved;
            DecisionOutcome::Completed { final_step: from_step }
        }
        Decision::Approve => {
            request.current_step += 1;
            request.steps[index + 1].status = StepStatus::Pending;
            DecisionOutcome::Advanced { from_step, to_step: request.current_step }
        }
    };

    Ok(outcome)
}

pub fn progress_pct(request: &ApprovalRequest) -> f64 {
    request.progress_pct()
}
