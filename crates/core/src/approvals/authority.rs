use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::approval::{ApprovalStep, Identity};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAuthority {
    pub role: String,
    pub role_rank: u8,
}

impl ApproverAuthority {
    pub fn new(role: impl Into<String>, role_rank: u8) -> Self {
        Self { role: role.into(), role_rank }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValidationInput {
    pub actor_name: String,
    pub actor_role: Option<String>,
    pub step_approver: String,
    pub required_role: String,
}

impl ApprovalValidationInput {
    pub fn for_step(actor: &Identity, step: &ApprovalStep) -> Self {
        Self {
            actor_name: actor.name.clone(),
            actor_role: actor.role.clone(),
            step_approver: step.approver.clone(),
            required_role: step.role.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalValidationFailure {
    MissingActorRole { actor_name: String, required_role: String },
    UnknownActorRole { actor_role: String },
    UnknownRequiredRole { required_role: String },
    InsufficientRoleAuthority { actor_role: String, required_role: String },
}

impl ApprovalValidationFailure {
    fn reason(&self) -> String {
        match self {
            Self::MissingActorRole { actor_name, required_role } => {
                format!("`{actor_name}` is not the designated approver and has no role to act as `{required_role}`")
            }
            Self::UnknownActorRole { actor_role } => format!("unknown actor role `{actor_role}`"),
            Self::UnknownRequiredRole { required_role } => {
                format!("unknown required role `{required_role}`")
            }
            Self::InsufficientRoleAuthority { actor_role, required_role } => {
                format!("actor role `{actor_role}` does not satisfy required role `{required_role}`")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<ApprovalValidationFailure>,
}

impl ApprovalValidationResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: ApprovalValidationFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

/// Decides whether an actor may act on a step: either they are the named
/// approver, or their role ranks at least as high as the step's role.
#[derive(Clone, Debug, Default)]
pub struct ApprovalValidator {
    authorities: HashMap<String, ApproverAuthority>,
}

impl ApprovalValidator {
    pub fn new(authorities: Vec<ApproverAuthority>) -> Self {
        let authorities = authorities
            .into_iter()
            .map(|authority| (normalize_key(&authority.role), authority))
            .collect();

        Self { authorities }
    }

    pub fn with_default_roles() -> Self {
        Self::new(default_authorities())
    }

    pub fn validate(&self, input: &ApprovalValidationInput) -> ApprovalValidationResult {
        if normalize_key(&input.actor_name) == normalize_key(&input.step_approver) {
            return ApprovalValidationResult::allow(format!(
                "`{}` is the designated approver",
                input.actor_name
            ));
        }

        let Some(actor_role) = input.actor_role.as_deref().filter(|role| !role.trim().is_empty())
        else {
            return ApprovalValidationResult::deny(ApprovalValidationFailure::MissingActorRole {
                actor_name: input.actor_name.clone(),
                required_role: input.required_role.clone(),
            });
        };

        let Some(actor_authority) = self.authorities.get(&normalize_key(actor_role)) else {
            return ApprovalValidationResult::deny(ApprovalValidationFailure::UnknownActorRole {
                actor_role: actor_role.to_string(),
            });
        };

        let Some(required_authority) = self.authorities.get(&normalize_key(&input.required_role))
        else {
            return ApprovalValidationResult::deny(ApprovalValidationFailure::UnknownRequiredRole {
                required_role: input.required_role.clone(),
            });
        };

        if actor_authority.role_rank < required_authority.role_rank {
            return ApprovalValidationResult::deny(
                ApprovalValidationFailure::InsufficientRoleAuthority {
                    actor_role: actor_role.to_string(),
                    required_role: input.required_role.clone(),
                },
            );
        }

        ApprovalValidationResult::allow(format!(
            "`{}` acting as `{}` may decide for `{}`",
            input.actor_name, actor_role, input.required_role
        ))
    }
}

pub fn default_authorities() -> Vec<ApproverAuthority> {
    vec![
        ApproverAuthority::new("department_manager", 1),
        ApproverAuthority::new("hr_director", 2),
        ApproverAuthority::new("finance_manager", 2),
        ApproverAuthority::new("procurement_manager", 2),
        ApproverAuthority::new("general_manager", 3),
    ]
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
