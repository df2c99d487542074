use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use bushidage_core::approvals::engine::{
    Decision, NewApprovalRequest, StepDecision, WorkflowEngine,
};
use bushidage_core::domain::approval::{
    Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, Priority, RequestType,
};

use bushidage_core::errors::DomainError;
use thiserror::Error;

use crate::repositories::{ApprovalRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("demo request `{id}` could not be built: {source}")]
    Build { id: &'static str, source: DomainError },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Deterministic demo requests, one per request type, each parked in a
/// different lifecycle state.
const DEMO_REQUESTS: &[DemoRequestContract] = &[
    DemoRequestContract {
        id: "apr-demo-leave-001",
        request_type: RequestType::Leave,
        title: "Annual leave, 3-5 June",
        description: "Three days of annual leave for a family trip",
        amount_cents: None,
        priority: Priority::Normal,
        applicant: ("emp-001", "Tanaka Yui", "Engineering"),
        decisions: &[],
        expected_status: ApprovalStatus::Pending,
        expected_step: 1,
    },
    DemoRequestContract {
        id: "apr-demo-expense-001",
        request_type: RequestType::Expense,
        title: "Client dinner in Osaka",
        description: "Dinner with the Kansai distributor team",
        amount_cents: Some(1_280_000),
        priority: Priority::High,
        applicant: ("emp-002", "Sato Ken", "Sales"),
        decisions: &[Decision::Approve],
        expected_status: ApprovalStatus::Pending,
        expected_step: 2,
    },
    DemoRequestContract {
        id: "apr-demo-purchase-001",
        request_type: RequestType::Purchase,
        title: "Replacement laptops",
        description: "Four laptops for the support desk refresh",
        amount_cents: Some(56_000_000),
        priority: Priority::Normal,
        applicant: ("emp-003", "Suzuki Aoi", "Support"),
        decisions: &[Decision::Approve, Decision::Approve, Decision::Approve],
        expected_status: ApprovalStatus::Approved,
        expected_step: 3,
    },
    DemoRequestContract {
        id: "apr-demo-hiring-001",
        request_type: RequestType::Hiring,
        title: "Second data engineer",
        description: "Backfill headcount for the analytics platform",
        amount_cents: None,
        priority: Priority::Urgent,
        applicant: ("emp-004", "Ito Ren", "Data"),
        decisions: &[Decision::Approve, Decision::Reject],
        expected_status: ApprovalStatus::Rejected,
        expected_step: 2,
    },
];

struct DemoRequestContract {
    id: &'static str,
    request_type: RequestType,
    title: &'static str,
    description: &'static str,
    amount_cents: Option<i64>,
    priority: Priority,
    applicant: (&'static str, &'static str, &'static str),
    decisions: &'static [Decision],
    expected_status: ApprovalStatus,
    expected_step: u32,
}

impl DemoRequestContract {
    fn submitted_at(&self, index: usize) -> DateTime<Utc> {
        let base = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).single().unwrap_or_default();
        base + Duration::hours(i64::try_from(index).unwrap_or_default())
    }

    fn build(
        &self,
        engine: &WorkflowEngine,
        index: usize,
    ) -> Result<ApprovalRequest, SeedError> {
        let submitted_at = self.submitted_at(index);
        let (id, name, department) = self.applicant;
        let mut request = engine
            .open(
                ApprovalId(self.id.to_string()),
                NewApprovalRequest {
                    title: self.title.to_string(),
                    request_type: self.request_type,
                    description: self.description.to_string(),
                    amount: self.amount_cents.map(|cents| Decimal::new(cents, 2)),
                    priority: self.priority,
                },
                Applicant {
                    id: id.to_string(),
                    name: name.to_string(),
                    department: department.to_string(),
                },
                submitted_at,
            )
            .map_err(|source| SeedError::Build { id: self.id, source })?;

        for (offset, decision) in self.decisions.iter().enumerate() {
            let decided_by =
                request.current().map(|step| step.approver.clone()).unwrap_or_default();
            let decided_at =
                submitted_at + Duration::minutes(30 * (i64::try_from(offset).unwrap_or(0) + 1));
            engine
                .apply(
                    &mut request,
                    &StepDecision { decision: *decision, decided_by, comment: None },
                    decided_at,
                )
                .map_err(|error| SeedError::Build { id: self.id, source: error.into() })?;
            request.version += 1;
        }

        Ok(request)
    }

    fn matches(&self, request: &ApprovalRequest) -> bool {
        request.request_type == self.request_type
            && request.status == self.expected_status
            && request.current_step == self.expected_step
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoSeedInfo {
    pub request_id: &'static str,
    pub request_type: &'static str,
    pub status: &'static str,
    pub inserted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub requests: Vec<DemoSeedInfo>,
}

impl SeedResult {
    pub fn inserted_count(&self) -> usize {
        self.requests.iter().filter(|info| info.inserted).count()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&'static str> {
        self.checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
    }
}

/// Demo dataset covering every request type. Built through the workflow
/// engine with the builtin templates, so seeded rows obey the same
/// invariants as live ones.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Inserts any demo request not already stored. Existing rows are left alone.
    pub async fn load<R>(repository: &R) -> Result<SeedResult, SeedError>
    where
        R: ApprovalRepository + ?Sized,
    {
        let engine = WorkflowEngine::default();
        let mut requests = Vec::with_capacity(DEMO_REQUESTS.len());

        for (index, contract) in DEMO_REQUESTS.iter().enumerate() {
            let id = ApprovalId(contract.id.to_string());
            let inserted = match repository.find_by_id(&id).await? {
                Some(_) => false,
                None => {
                    repository.insert(contract.build(&engine, index)?).await?;
                    true
                }
            };

            requests.push(DemoSeedInfo {
                request_id: contract.id,
                request_type: contract.request_type.as_str(),
                status: contract.expected_status.as_str(),
                inserted,
            });
        }

        Ok(SeedResult { requests })
    }

    pub async fn verify<R>(repository: &R) -> Result<VerificationResult, SeedError>
    where
        R: ApprovalRepository + ?Sized,
    {
        let mut checks = Vec::with_capacity(DEMO_REQUESTS.len());
        for contract in DEMO_REQUESTS {
            let stored = repository.find_by_id(&ApprovalId(contract.id.to_string())).await?;
            checks.push((contract.id, stored.is_some_and(|request| contract.matches(&request))));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}
