use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use bushidage_core::approvals::{
    ApprovalFilter, ApprovalRepository, ApprovalService, DecisionInput, FlowTemplate,
    NewApprovalRequest, RepositoryError, TemplateStep,
};
use bushidage_core::audit::{AuditOutcome, InMemoryAuditSink};
use bushidage_core::config::AppConfig;
use bushidage_core::domain::approval::{
    ApprovalId, ApprovalRequest, ApprovalStatus, Identity, Priority, RequestType, StepStatus,
};
use bushidage_core::errors::ApplicationError;
use bushidage_db::{connect_with_settings, migrations, InMemoryApprovalRepository, SqlApprovalRepository};

type ServiceTestResult<T = ()> = Result<T, String>;

fn applicant() -> Identity {
    Identity::new("emp-001", "Tanaka Yui", "Engineering")
}

fn approver(name: &str) -> Identity {
    Identity::new(format!("id-{}", name.to_ascii_lowercase().replace(' ', "-")), name, "Management")
}

fn draft(request_type: RequestType, amount: Option<Decimal>) -> NewApprovalRequest {
    NewApprovalRequest {
        title: format!("{} request", request_type.as_str()),
        request_type,
        description: "Details for the approvers".to_string(),
        amount,
        priority: Priority::Normal,
    }
}

fn memory_service() -> ApprovalService<InMemoryApprovalRepository, InMemoryAuditSink> {
    ApprovalService::new(InMemoryApprovalRepository::default(), InMemoryAuditSink::default())
}

async fn sql_repository() -> SqlApprovalRepository {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    SqlApprovalRepository::new(pool)
}

async fn sql_service() -> ApprovalService<SqlApprovalRepository, InMemoryAuditSink> {
    ApprovalService::new(sql_repository().await, InMemoryAuditSink::default())
}

async fn leave_request_is_approved_end_to_end<R: ApprovalRepository>(
    service: &ApprovalService<R, InMemoryAuditSink>,
) -> ServiceTestResult {
    let submitted = service
        .submit(draft(RequestType::Leave, None), &applicant())
        .await
        .map_err(|error| format!("submit failed: {error}"))?;
    if submitted.total_steps != 2 || submitted.current_step != 1 || submitted.version != 1 {
        return Err(format!("unexpected fresh request: {submitted:?}"));
    }

    let first = service
        .decide(
            &submitted.id,
            DecisionInput::approve(approver("Department Manager")).with_comment("Approved"),
        )
        .await
        .map_err(|error| format!("first decision failed: {error}"))?;
    if first.current_step != 2 || first.status != ApprovalStatus::Pending {
        return Err(format!("first approval should advance: {first:?}"));
    }
    if (first.progress_pct() - 50.0).abs() > f64::EPSILON {
        return Err(format!("mid-flow progress should be 50, got {}", first.progress_pct()));
    }

    let second = service
        .decide(&submitted.id, DecisionInput::approve(approver("HR Director")))
        .await
        .map_err(|error| format!("second decision failed: {error}"))?;
    if second.status != ApprovalStatus::Approved || second.version != 3 {
        return Err(format!("final approval should complete: {second:?}"));
    }
    if second.steps.iter().any(|step| step.status != StepStatus::Approved) {
        return Err("all steps should be approved".to_string());
    }

    let stored = service.get(&submitted.id).await.map_err(|error| error.to_string())?;
    if stored != second {
        return Err("stored request should match the returned one".to_string());
    }
    let progress = service.progress(&submitted.id).await.map_err(|error| error.to_string())?;
    if (progress - 100.0).abs() > f64::EPSILON {
        return Err(format!("approved progress should be 100, got {progress}"));
    }
    Ok(())
}

async fn expense_rejected_at_first_step<R: ApprovalRepository>(
    service: &ApprovalService<R, InMemoryAuditSink>,
) -> ServiceTestResult {
    let submitted = service
        .submit(draft(RequestType::Expense, Some(Decimal::new(500_000, 2))), &applicant())
        .await
        .map_err(|error| format!("submit failed: {error}"))?;

    let rejected = service
        .decide(
            &submitted.id,
            DecisionInput::reject(approver("Department Manager")).with_comment("Over budget"),
        )
        .await
        .map_err(|error| format!("rejection failed: {error}"))?;

    if rejected.status != ApprovalStatus::Rejected || rejected.current_step != 1 {
        return Err(format!("rejection should halt at step 1: {rejected:?}"));
    }
    if rejected.steps[0].comment.as_deref() != Some("Over budget") {
        return Err("rejection comment should be recorded".to_string());
    }
    if rejected.steps[1..].iter().any(|step| step.status != StepStatus::Waiting) {
        return Err("later steps should stay waiting".to_string());
    }

    let again =
        service.decide(&submitted.id, DecisionInput::approve(approver("Department Manager"))).await;
    match again {
        Err(error) if error.error_class() == "invalid_state" => {}
        other => return Err(format!("terminal request accepted a decision: {other:?}")),
    }

    let progress = service.progress(&submitted.id).await.map_err(|error| error.to_string())?;
    if progress != 0.0 {
        return Err(format!("rejected progress should be 0, got {progress}"));
    }
    Ok(())
}

#[tokio::test]
async fn leave_flow_completes_in_memory() -> ServiceTestResult {
    leave_request_is_approved_end_to_end(&memory_service()).await
}

#[tokio::test]
async fn leave_flow_completes_in_sqlite() -> ServiceTestResult {
    leave_request_is_approved_end_to_end(&sql_service().await).await
}

#[tokio::test]
async fn expense_rejection_halts_in_memory() -> ServiceTestResult {
    expense_rejected_at_first_step(&memory_service()).await
}

#[tokio::test]
async fn expense_rejection_halts_in_sqlite() -> ServiceTestResult {
    expense_rejected_at_first_step(&sql_service().await).await
}

#[tokio::test]
async fn deciding_unknown_request_is_not_found() {
    let service = memory_service();

    let error = service
        .decide(&ApprovalId("missing".to_string()), DecisionInput::approve(approver("HR Director")))
        .await
        .expect_err("unknown id");

    assert_eq!(error, ApplicationError::NotFound { id: ApprovalId("missing".to_string()) });
}

#[tokio::test]
async fn invalid_submission_is_not_persisted() {
    let service = memory_service();
    let mut bad = draft(RequestType::Purchase, Some(Decimal::new(-1, 0)));
    bad.title = "   ".to_string();

    let error = service.submit(bad, &applicant()).await.expect_err("validation");

    assert_eq!(error.error_class(), "validation");
    assert!(service.list(&ApprovalFilter::default()).await.expect("list").is_empty());
}

#[tokio::test]
async fn outsider_cannot_decide_and_request_is_unchanged() {
    let service = memory_service();
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");

    let outsider = Identity::new("emp-009", "Nakamura Sho", "Engineering");
    let error = service
        .decide(&submitted.id, DecisionInput::approve(outsider))
        .await
        .expect_err("unauthorized");

    assert_eq!(error.error_class(), "unauthorized");
    let stored = service.get(&submitted.id).await.expect("get");
    assert_eq!(stored, submitted);
}

#[tokio::test]
async fn lower_ranked_role_cannot_act_for_higher_step() {
    let service = memory_service();
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");
    service
        .decide(&submitted.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect("first step");

    let manager = Identity::new("emp-010", "Kobayashi Mei", "Sales").with_role("department_manager");
    let error = service
        .decide(&submitted.id, DecisionInput::approve(manager))
        .await
        .expect_err("insufficient rank");

    assert!(matches!(error, ApplicationError::Unauthorized(ref reason) if reason.contains("hr_director")));
}

#[tokio::test]
async fn higher_ranked_role_may_stand_in() {
    let service = memory_service();
    let submitted =
        service.submit(draft(RequestType::Hiring, None), &applicant()).await.expect("submit");

    let general_manager =
        Identity::new("emp-100", "Yamamoto Hana", "Executive").with_role("general_manager");
    let decided = service
        .decide(&submitted.id, DecisionInput::approve(general_manager))
        .await
        .expect("stand-in decision");

    assert_eq!(decided.current_step, 2);
    assert_eq!(decided.steps[0].decided_by.as_deref(), Some("Yamamoto Hana"));
}

#[tokio::test]
async fn authority_check_can_be_disabled_by_config() {
    let mut config = AppConfig::default();
    config.workflow.enforce_approver_authority = false;
    let service = ApprovalService::from_config(
        InMemoryApprovalRepository::default(),
        InMemoryAuditSink::default(),
        &config.workflow,
    );
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");

    let anyone = Identity::new("emp-009", "Nakamura Sho", "Engineering");
    let decided =
        service.decide(&submitted.id, DecisionInput::reject(anyone)).await.expect("decision");

    assert_eq!(decided.status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn configured_template_overrides_builtin_flow() {
    let mut config = AppConfig::default();
    config.workflow.templates.push(FlowTemplate {
        request_type: RequestType::Leave,
        steps: vec![TemplateStep::new("Team Lead", "department_manager")],
    });
    let service = ApprovalService::from_config(
        InMemoryApprovalRepository::default(),
        InMemoryAuditSink::default(),
        &config.workflow,
    );

    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");
    assert_eq!(submitted.total_steps, 1);

    let decided = service
        .decide(&submitted.id, DecisionInput::approve(approver("Team Lead")))
        .await
        .expect("single step approval");
    assert_eq!(decided.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let service = sql_service().await;
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");
    service
        .decide(
            &submitted.id,
            DecisionInput::approve(approver("Department Manager")).with_expected_version(1),
        )
        .await
        .expect("fresh version");

    let error = service
        .decide(&submitted.id, DecisionInput::approve(approver("HR Director")).with_expected_version(1))
        .await
        .expect_err("stale version");

    assert_eq!(
        error,
        ApplicationError::ConcurrencyConflict { id: submitted.id.clone(), expected: 1, actual: 2 }
    );
    let stored = service.get(&submitted.id).await.expect("get");
    assert_eq!(stored.current_step, 2);
    assert_eq!(stored.status, ApprovalStatus::Pending);
}

/// Lets one competing decision land between the service's read and write.
struct RacingRepository {
    inner: InMemoryApprovalRepository,
    raced: AtomicBool,
}

#[async_trait]
impl ApprovalRepository for RacingRepository {
    async fn list(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.inner.list().await
    }

    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        self.inner.insert(request).await
    }

    async fn update(
        &self,
        request: ApprovalRequest,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut competing = self
                .inner
                .find_by_id(&request.id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound { id: request.id.clone() })?;
            competing.version += 1;
            self.inner.update(competing, expected_version).await?;
        }
        self.inner.update(request, expected_version).await
    }
}

#[tokio::test]
async fn lost_race_surfaces_conflict_without_retry() {
    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(
        RacingRepository { inner: InMemoryApprovalRepository::default(), raced: AtomicBool::new(false) },
        audit.clone(),
    );
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");

    let error = service
        .decide(&submitted.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect_err("lost race");

    assert_eq!(error.error_class(), "concurrency_conflict");
    let stored = service.get(&submitted.id).await.expect("get");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.current_step, 1, "the losing decision must not be applied");
    let types: Vec<String> = audit.events().into_iter().map(|event| event.event_type).collect();
    assert_eq!(types, vec!["approval.submitted", "approval.persistence_failed"]);
    assert!(audit
        .events()
        .iter()
        .any(|event| event.event_type == "approval.persistence_failed"
            && event.outcome == AuditOutcome::Failed));
    assert!(
        audit.events().iter().all(|event| event.event_type != "approval.decided"),
        "a decision that was not stored must not be audited as decided"
    );
}

#[tokio::test]
async fn list_filters_and_summary_cover_all_states() {
    let service = sql_service().await;
    let leave = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("leave");
    let expense = service
        .submit(draft(RequestType::Expense, Some(Decimal::new(120_00, 2))), &applicant())
        .await
        .expect("expense");
    let other = Identity::new("emp-002", "Sato Ken", "Sales");
    let purchase = service.submit(draft(RequestType::Purchase, None), &other).await.expect("purchase");

    service
        .decide(&leave.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect("leave step 1");
    service.decide(&leave.id, DecisionInput::approve(approver("HR Director"))).await.expect("leave step 2");
    service
        .decide(&expense.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect("expense step 1");
    service
        .decide(&purchase.id, DecisionInput::reject(approver("Department Manager")))
        .await
        .expect("purchase rejected");

    let pending = service
        .list(&ApprovalFilter { status: Some(ApprovalStatus::Pending), ..ApprovalFilter::default() })
        .await
        .expect("pending");
    assert_eq!(pending.iter().map(|request| &request.id).collect::<Vec<_>>(), vec![&expense.id]);

    let awaiting_finance = service
        .list(&ApprovalFilter { awaiting: Some("finance_manager".to_string()), ..ApprovalFilter::default() })
        .await
        .expect("awaiting");
    assert_eq!(awaiting_finance.len(), 1);

    let mine = service
        .list(&ApprovalFilter { applicant_id: Some("emp-001".to_string()), ..ApprovalFilter::default() })
        .await
        .expect("mine");
    assert_eq!(mine.len(), 2);

    let summary = service.summary().await.expect("summary");
    assert_eq!((summary.total, summary.pending, summary.approved, summary.rejected), (3, 1, 1, 1));
    assert_eq!(summary.by_type.get("purchase"), Some(&1));
}

#[tokio::test]
async fn audit_trail_records_submissions_and_decisions() {
    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(InMemoryApprovalRepository::default(), audit.clone());
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");
    service
        .decide(&submitted.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect("decide");
    let _ = service
        .decide(&submitted.id, DecisionInput::approve(Identity::new("x", "Stranger", "None")))
        .await;

    let types: Vec<String> = audit.events().into_iter().map(|event| event.event_type).collect();
    assert_eq!(
        types,
        vec!["approval.submitted", "approval.decided", "approval.decision_unauthorized"]
    );
    assert!(audit.events().iter().all(|event| event.request_id.as_ref() == Some(&submitted.id)));
}

#[tokio::test]
async fn store_refusing_the_version_swap_leaves_no_decided_event() {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    sqlx::query(
        "CREATE TRIGGER hold_version_two BEFORE UPDATE ON approval_request
         WHEN NEW.version = 2
         BEGIN SELECT RAISE(IGNORE); END",
    )
    .execute(&pool)
    .await
    .expect("trigger");

    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(SqlApprovalRepository::new(pool), audit.clone());
    let submitted = service.submit(draft(RequestType::Leave, None), &applicant()).await.expect("submit");

    let error = service
        .decide(&submitted.id, DecisionInput::approve(approver("Department Manager")))
        .await
        .expect_err("update is held back");

    assert_eq!(error.error_class(), "concurrency_conflict");
    let trail: Vec<(String, AuditOutcome)> =
        audit.events().into_iter().map(|event| (event.event_type, event.outcome)).collect();
    assert_eq!(
        trail,
        vec![
            ("approval.submitted".to_string(), AuditOutcome::Success),
            ("approval.persistence_failed".to_string(), AuditOutcome::Failed),
        ]
    );
    let stored = service.get(&submitted.id).await.expect("get");
    assert_eq!((stored.version, stored.current_step), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_during_concurrent_decisions_always_see_whole_requests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("approvals.db").display());
    let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let service = ApprovalService::new(SqlApprovalRepository::new(pool.clone()), InMemoryAuditSink::default())
        .with_validator(None);
    let reader = Arc::new(SqlApprovalRepository::new(pool.clone()));
    let done = Arc::new(AtomicBool::new(false));

    let mut ids = Vec::new();
    for _ in 0..10 {
        let request =
            service.submit(draft(RequestType::Hiring, None), &applicant()).await.expect("submit");
        ids.push(request.id);
    }

    let mut readers = Vec::new();
    for worker in 0..3 {
        let reader = Arc::clone(&reader);
        let done = Arc::clone(&done);
        let ids = ids.clone();
        readers.push(tokio::spawn(async move {
            let mut failures = Vec::new();
            let mut round = 0usize;
            while !done.load(Ordering::SeqCst) {
                let id = &ids[(round + worker) % ids.len()];
                if let Err(error) = reader.find_by_id(id).await {
                    failures.push(format!("find_by_id: {error}"));
                }
                if round % 10 == 0 {
                    if let Err(error) = reader.list().await {
                        failures.push(format!("list: {error}"));
                    }
                }
                round += 1;
                tokio::task::yield_now().await;
            }
            failures
        }));
    }

    for id in &ids {
        for _ in 0..3 {
            service.decide(id, DecisionInput::approve(approver("Board"))).await.expect("decide");
        }
    }
    done.store(true, Ordering::SeqCst);

    let mut failures = Vec::new();
    for handle in readers {
        failures.extend(handle.await.expect("reader task"));
    }
    assert!(failures.is_empty(), "reads saw partial requests: {:?}", &failures[..failures.len().min(3)]);

    let approved = service
        .list(&ApprovalFilter { status: Some(ApprovalStatus::Approved), ..ApprovalFilter::default() })
        .await
        .expect("list");
    assert_eq!(approved.len(), ids.len());
    pool.close().await;
}
