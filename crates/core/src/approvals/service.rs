use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::approvals::authority::{ApprovalValidationInput, ApprovalValidator};
use crate::approvals::engine::{Decision, NewApprovalRequest, StepDecision, WorkflowEngine};
use crate::approvals::repository::{ApprovalRepository, RepositoryError};
use crate::approvals::templates::FlowTemplates;
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::WorkflowConfig;
use crate::domain::approval::{
    Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, Identity, RequestType,
};
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub decision: Decision,
    pub actor: Identity,
    pub comment: Option<String>,
    /// Version the caller last saw; a mismatch is reported as a conflict.
    pub expected_version: Option<u32>,
}

impl DecisionInput {
    pub fn new(decision: Decision, actor: Identity) -> Self {
        Self { decision, actor, comment: None, expected_version: None }
    }

    pub fn approve(actor: Identity) -> Self {
        Self::new(Decision::Approve, actor)
    }

    pub fn reject(actor: Identity) -> Self {
        Self::new(Decision::Reject, actor)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_expected_version(mut self, version: u32) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub request_type: Option<RequestType>,
    pub applicant_id: Option<String>,
    /// Approver name or role key the current pending step is waiting on.
    pub awaiting: Option<String>,
}

impl ApprovalFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        if self.status.is_some_and(|status| status != request.status) {
            return false;
        }
        if self.request_type.is_some_and(|kind| kind != request.request_type) {
            return false;
        }
        if let Some(applicant_id) = &self.applicant_id {
            if &request.applicant.id != applicant_id {
                return false;
            }
        }
        if let Some(awaiting) = &self.awaiting {
            if request.is_terminal() {
                return false;
            }
            let key = awaiting.trim().to_ascii_lowercase();
            let Some(step) = request.current() else {
                return false;
            };
            if step.approver.trim().to_ascii_lowercase() != key
                && step.role.trim().to_ascii_lowercase() != key
            {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub by_type: BTreeMap<String, usize>,
}

impl ApprovalSummary {
    pub fn from_requests(requests: &[ApprovalRequest]) -> Self {
        let mut summary = Self { total: requests.len(), ..Self::default() };
        for request in requests {
            match request.status {
                ApprovalStatus::Pending => summary.pending += 1,
                ApprovalStatus::Approved => summary.approved += 1,
                ApprovalStatus::Rejected => summary.rejected += 1,
            }
            *summary.by_type.entry(request.request_type.as_str().to_string()).or_default() += 1;
        }
        summary
    }
}

/// Entry point for submitting and deciding approval requests over an
/// injected repository.
pub struct ApprovalService<R, S> {
    repository: R,
    audit: S,
    engine: WorkflowEngine,
    validator: Option<ApprovalValidator>,
}

impl<R, S> ApprovalService<R, S>
where
    R: ApprovalRepository,
    S: AuditSink,
{
    pub fn new(repository: R, audit: S) -> Self {
        Self {
            repository,
            audit,
            engine: WorkflowEngine::default(),
            validator: Some(ApprovalValidator::with_default_roles()),
        }
    }

    pub fn from_config(repository: R, audit: S, config: &WorkflowConfig) -> Self {
        let engine = WorkflowEngine::new(FlowTemplates::with_overrides(config.templates.clone()));
        let validator = config
            .enforce_approver_authority
            .then(|| ApprovalValidator::new(config.authorities()));
        Self { repository, audit, engine, validator }
    }

    pub fn with_engine(mut self, engine: WorkflowEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_validator(mut self, validator: Option<ApprovalValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn submit(
        &self,
        draft: NewApprovalRequest,
        applicant: &Identity,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let id = ApprovalId(Uuid::new_v4().to_string());
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(id.clone()), correlation_id.clone(), &applicant.name);

        let request =
            match self.engine.open(id.clone(), draft, Applicant::from(applicant), Utc::now()) {
                Ok(request) => request,
                Err(error) => {
                    self.audit.emit(
                        AuditEvent::from_context(
                            &audit,
                            "approval.submission_rejected",
                            AuditCategory::Submission,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
            };

        self.repository.insert(request.clone()).await.map_err(|error| {
            self.persistence_failed(&audit, &error);
            ApplicationError::from(error)
        })?;

        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "approval.submitted",
                AuditCategory::Submission,
                AuditOutcome::Success,
            )
            .with_metadata("request_type", request.request_type.as_str())
            .with_metadata("total_steps", request.total_steps.to_string()),
        );
        info!(
            event_name = "approval.submitted",
            correlation_id = %correlation_id,
            request_id = %request.id,
            request_type = request.request_type.as_str(),
            total_steps = request.total_steps,
            "approval request submitted"
        );

        Ok(request)
    }

    pub async fn decide(
        &self,
        id: &ApprovalId,
        input: DecisionInput,
    ) -> Result<ApprovalRequest, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(id.clone()), correlation_id.clone(), &input.actor.name);
        let mut request = self.get(id).await?;

        if let Some(expected) = input.expected_version {
            if expected != request.version {
                let error = ApplicationError::ConcurrencyConflict {
                    id: id.clone(),
                    expected,
                    actual: request.version,
                };
                self.refused(&audit, "approval.stale_version", &error);
                return Err(error);
            }
        }

        if !request.is_terminal() {
            self.authorize(&request, &input.actor, &audit)?;
        }

        let stored_version = request.version;
        let step_decision = StepDecision {
            decision: input.decision,
            decided_by: input.actor.name.clone(),
            comment: input.comment,
        };
        let outcome = match self.engine.apply(&mut request, &step_decision, Utc::now()) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.audit.emit(WorkflowEngine::decision_rejected_event(
                    &audit,
                    &step_decision,
                    &error,
                ));
                return Err(DomainError::from(error).into());
            }
        };
        request.version = stored_version + 1;

        self.repository.update(request.clone(), stored_version).await.map_err(|error| {
            self.persistence_failed(&audit, &error);
            ApplicationError::from(error)
        })?;

        self.audit.emit(WorkflowEngine::decided_event(&audit, &step_decision, &outcome, &request));

        info!(
            event_name = "approval.decided",
            correlation_id = %correlation_id,
            request_id = %request.id,
            decision = step_decision.decision.as_str(),
            outcome = ?outcome,
            status = request.status.as_str(),
            version = request.version,
            "approval decision recorded"
        );

        Ok(request)
    }

    pub async fn get(&self, id: &ApprovalId) -> Result<ApprovalRequest, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { id: id.clone() })
    }

    pub async fn list(
        &self,
        filter: &ApprovalFilter,
    ) -> Result<Vec<ApprovalRequest>, ApplicationError> {
        let requests = self.repository.list().await?;
        Ok(requests.into_iter().filter(|request| filter.matches(request)).collect())
    }

    pub async fn summary(&self) -> Result<ApprovalSummary, ApplicationError> {
        let requests = self.repository.list().await?;
        Ok(ApprovalSummary::from_requests(&requests))
    }

    pub async fn progress(&self, id: &ApprovalId) -> Result<f64, ApplicationError> {
        Ok(self.get(id).await?.progress_pct())
    }

    fn authorize(
        &self,
        request: &ApprovalRequest,
        actor: &Identity,
        audit: &AuditContext,
    ) -> Result<(), ApplicationError> {
        let (Some(validator), Some(step)) = (&self.validator, request.current()) else {
            return Ok(());
        };

        let result = validator.validate(&ApprovalValidationInput::for_step(actor, step));
        if result.allowed {
            return Ok(());
        }

        let error = ApplicationError::Unauthorized(result.reason);
        self.refused(audit, "approval.decision_unauthorized", &error);
        Err(error)
    }

    fn refused(&self, audit: &AuditContext, event_type: &str, error: &ApplicationError) {
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                event_type,
                AuditCategory::Decision,
                AuditOutcome::Rejected,
            )
            .with_metadata("error_class", error.error_class())
            .with_metadata("error", error.to_string()),
        );
        warn!(
            event_name = event_type,
            correlation_id = %audit.correlation_id,
            error_class = error.error_class(),
            error = %error,
            "approval decision refused"
        );
    }

    fn persistence_failed(&self, audit: &AuditContext, error: &RepositoryError) {
        self.audit.emit(
            AuditEvent::from_context(
                audit,
                "approval.persistence_failed",
                AuditCategory::Persistence,
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string()),
        );
        warn!(
            event_name = "approval.persistence_failed",
            correlation_id = %audit.correlation_id,
            error = %error,
            "approval write was not stored"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ApprovalFilter, ApprovalSummary};
    use crate::approvals::engine::{
        apply_decision, open_request, Decision, NewApprovalRequest, StepDecision,
    };
    use crate::approvals::templates::FlowTemplate;
    use crate::domain::approval::{
        Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, Priority, RequestType,
    };

    fn request(id: &str, request_type: RequestType, applicant_id: &str) -> ApprovalRequest {
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).single().unwrap_or_else(Utc::now);
        open_request(
            ApprovalId(id.to_string()),
            NewApprovalRequest {
                title: format!("{id} title"),
                request_type,
                description: "details".to_string(),
                amount: None,
                priority: Priority::Normal,
            },
            Applicant {
                id: applicant_id.to_string(),
                name: applicant_id.to_string(),
                department: "Engineering".to_string(),
            },
            &FlowTemplate::builtin(request_type),
            now,
        )
        .expect("builtin template opens")
    }

    fn decide(request: &mut ApprovalRequest, decision: Decision) {
        apply_decision(
            request,
            &StepDecision { decision, decided_by: "tester".to_string(), comment: None },
            Utc::now(),
        )
        .expect("decision applies");
    }

    #[test]
    fn filter_matches_status_type_and_applicant() {
        let mut approved = request("a", RequestType::Leave, "u1");
        decide(&mut approved, Decision::Approve);
        decide(&mut approved, Decision::Approve);
        let pending = request("b", RequestType::Expense, "u2");

        let by_status = ApprovalFilter { status: Some(ApprovalStatus::Approved), ..Default::default() };
        assert!(by_status.matches(&approved));
        assert!(!by_status.matches(&pending));

        let by_type = ApprovalFilter { request_type: Some(RequestType::Expense), ..Default::default() };
        assert!(by_type.matches(&pending));
        assert!(!by_type.matches(&approved));

        let by_applicant = ApprovalFilter { applicant_id: Some("u1".to_string()), ..Default::default() };
        assert!(by_applicant.matches(&approved));
        assert!(!by_applicant.matches(&pending));
    }

    #[test]
    fn awaiting_filter_follows_the_current_step() {
        let mut expense = request("c", RequestType::Expense, "u1");
        let for_finance = ApprovalFilter { awaiting: Some("Finance Manager".to_string()), ..Default::default() };
        let for_role = ApprovalFilter { awaiting: Some("finance_manager".to_string()), ..Default::default() };

        assert!(!for_finance.matches(&expense));
        decide(&mut expense, Decision::Approve);
        assert!(for_finance.matches(&expense));
        assert!(for_role.matches(&expense));

        decide(&mut expense, Decision::Reject);
        assert!(!for_finance.matches(&expense), "terminal requests await nobody");
    }

    #[test]
    fn summary_counts_by_status_and_type() {
        let mut rejected = request("a", RequestType::Purchase, "u1");
        decide(&mut rejected, Decision::Reject);
        let requests = vec![
            request("b", RequestType::Leave, "u1"),
            request("c", RequestType::Leave, "u2"),
            rejected,
        ];

        let summary = ApprovalSummary::from_requests(&requests);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.approved, 0);
        assert_eq!(summary.by_type.get("leave"), Some(&2));
        assert_eq!(summary.by_type.get("purchase"), Some(&1));
    }
}
