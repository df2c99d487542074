use std::collections::HashMap;

use tokio::sync::RwLock;

use bushidage_core::domain::approval::{ApprovalId, ApprovalRequest};

use super::{ApprovalRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryApprovalRepository {
    approvals: RwLock<HashMap<String, ApprovalRequest>>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn list(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let mut requests: Vec<ApprovalRequest> = approvals.values().cloned().collect();
        requests.sort_by(|a, b| {
            b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(requests)
    }

    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals.get(&id.0).cloned())
    }

    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        if approvals.contains_key(&request.id.0) {
            return Err(RepositoryError::Duplicate { id: request.id });
        }
        approvals.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn update(
        &self,
        request: ApprovalRequest,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        let Some(stored) = approvals.get_mut(&request.id.0) else {
            return Err(RepositoryError::NotFound { id: request.id });
        };
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                id: request.id,
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = request;
        Ok(())
    }
}
