use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl std::fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Leave,
    Expense,
    Purchase,
    Hiring,
}

impl RequestType {
    pub const ALL: [RequestType; 4] = [Self::Leave, Self::Expense, Self::Purchase, Self::Hiring];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Expense => "expense",
            Self::Purchase => "purchase",
            Self::Hiring => "hiring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "expense" => Some(Self::Expense),
            "purchase" => Some(Self::Purchase),
            "hiring" => Some(Self::Hiring),
            _ => None,
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            DomainError::Validation(format!(
                "unsupported request type `{}` (expected leave|expense|purchase|hiring)",
                value.trim()
            ))
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" | "medium" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Pending => false,
            Self::Approved | Self::Rejected => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" => Some(Self::Waiting),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// The acting user, as supplied by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub department: String,
    pub role: Option<String>,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), name: name.into(), department: department.into(), role: None }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: String,
    pub name: String,
    pub department: String,
}

impl From<&Identity> for Applicant {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            department: identity.department.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub step: u32,
    pub approver: String,
    pub role: String,
    pub status: StepStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<String>,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub title: String,
    pub request_type: RequestType,
    pub description: String,
    pub amount: Option<Decimal>,
    pub priority: Priority,
    pub applicant: Applicant,
    pub status: ApprovalStatus,
    pub current_step: u32,
    pub total_steps: u32,
    pub steps: Vec<ApprovalStep>,
    pub version: u32,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The step at `current_step`, if the counter points inside the flow.
    pub fn current(&self) -> Option<&ApprovalStep> {
        let index = usize::try_from(self.current_step).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    pub fn progress_pct(&self) -> f64 {
        match self.status {
            ApprovalStatus::Rejected => 0.0,
            ApprovalStatus::Approved => 100.0,
            ApprovalStatus::Pending => {
                if self.total_steps == 0 {
                    return 0.0;
                }
                f64::from(self.current_step.saturating_sub(1)) / f64::from(self.total_steps)
                    * 100.0
            }
        }
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let violation = |message: String| {
            Err(DomainError::InvariantViolation(format!("request `{}`: {message}", self.id)))
        };

        if usize::try_from(self.total_steps).ok() != Some(self.steps.len()) {
            return violation(format!(
                "total_steps {} does not match {} recorded steps",
                self.total_steps,
                self.steps.len()
            ));
        }
        if self.current_step == 0 || self.current_step > self.total_steps {
            return violation(format!(
                "current_step {} outside 1..={}",
                self.current_step, self.total_steps
            ));
        }

        let expected_at = |position: u32| match self.status {
            ApprovalStatus::Pending if position == self.current_step => StepStatus::Pending,
            ApprovalStatus::Rejected if position == self.current_step => StepStatus::Rejected,
            ApprovalStatus::Approved => StepStatus::Approved,
            _ if position < self.current_step => StepStatus::Approved,
            _ => StepStatus::Waiting,
        };

        for (index, step) in self.steps.iter().enumerate() {
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if step.step != position {
                return violation(format!("step at position {position} is numbered {}", step.step));
            }
            let expected = expected_at(position);
            if step.status != expected {
                return violation(format!(
                    "step {position} is {} but {} request at step {} requires {}",
                    step.status.as_str(),
                    self.status.as_str(),
                    self.current_step,
                    expected.as_str()
                ));
            }
        }

        if self.status == ApprovalStatus::Approved && self.current_step != self.total_steps {
            return violation(format!(
                "approved request stopped at step {} of {}",
                self.current_step, self.total_steps
            ));
        }

        Ok(())
    }
}
