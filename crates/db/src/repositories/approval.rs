use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use bushidage_core::domain::approval::{
    Applicant, ApprovalId, ApprovalRequest, ApprovalStatus, ApprovalStep, Priority, RequestType,
    StepStatus,
};

use super::{database_error, decode_error, ApprovalRepository, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, title, request_type, description, amount, priority,
    applicant_id, applicant_name, applicant_department, status, current_step, total_steps,
    version, submitted_at, updated_at";

const STEP_COLUMNS: &str =
    "request_id, step, approver, role, status, decided_at, decided_by, comment";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn steps_for(
    tx: &mut Transaction<'_, Sqlite>,
    id: &ApprovalId,
) -> Result<Vec<ApprovalStep>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {STEP_COLUMNS} FROM approval_step WHERE request_id = ? ORDER BY step ASC"
    ))
    .bind(&id.0)
    .fetch_all(&mut **tx)
    .await
    .map_err(database_error)?;

    rows.iter().map(row_to_step).collect()
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode_error(format!("{column} `{raw}`: {error}")))
}

fn to_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| decode_error(format!("{column} out of range: {value}")))
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let step: i64 = row.try_get("step").map_err(decode_error)?;
    let approver: String = row.try_get("approver").map_err(decode_error)?;
    let role: String = row.try_get("role").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let decided_at_str: Option<String> = row.try_get("decided_at").map_err(decode_error)?;
    let decided_by: Option<String> = row.try_get("decided_by").map_err(decode_error)?;
    let comment: Option<String> = row.try_get("comment").map_err(decode_error)?;

    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| decode_error(format!("unknown step status `{status_str}`")))?;
    let decided_at =
        decided_at_str.as_deref().map(|raw| parse_timestamp("decided_at", raw)).transpose()?;

    Ok(ApprovalStep {
        step: to_u32("step", step)?,
        approver,
        role,
        status,
        decided_at,
        decided_by,
        comment,
    })
}

fn row_to_request(
    row: &SqliteRow,
    steps: Vec<ApprovalStep>,
) -> Result<ApprovalRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let title: String = row.try_get("title").map_err(decode_error)?;
    let request_type_str: String = row.try_get("request_type").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let amount_str: Option<String> = row.try_get("amount").map_err(decode_error)?;
    let priority_str: String = row.try_get("priority").map_err(decode_error)?;
    let applicant_id: String = row.try_get("applicant_id").map_err(decode_error)?;
    let applicant_name: String = row.try_get("applicant_name").map_err(decode_error)?;
    let applicant_department: String =
        row.try_get("applicant_department").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let current_step: i64 = row.try_get("current_step").map_err(decode_error)?;
    let total_steps: i64 = row.try_get("total_steps").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let submitted_at_str: String = row.try_get("submitted_at").map_err(decode_error)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_error)?;

    let request = ApprovalRequest {
        id: ApprovalId(id),
        title,
        request_type: RequestType::parse(&request_type_str)
            .ok_or_else(|| decode_error(format!("unknown request type `{request_type_str}`")))?,
        description,
        amount: amount_str
            .as_deref()
            .map(|raw| {
                Decimal::from_str(raw)
                    .map_err(|error| decode_error(format!("amount `{raw}`: {error}")))
            })
            .transpose()?,
        priority: Priority::parse(&priority_str)
            .ok_or_else(|| decode_error(format!("unknown priority `{priority_str}`")))?,
        applicant: Applicant {
            id: applicant_id,
            name: applicant_name,
            department: applicant_department,
        },
        status: ApprovalStatus::parse(&status_str)
            .ok_or_else(|| decode_error(format!("unknown approval status `{status_str}`")))?,
        current_step: to_u32("current_step", current_step)?,
        total_steps: to_u32("total_steps", total_steps)?,
        steps,
        version: to_u32("version", version)?,
        submitted_at: parse_timestamp("submitted_at", &submitted_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    };

    request.check_invariants().map_err(decode_error)?;
    Ok(request)
}

async fn upsert_steps(
    tx: &mut Transaction<'_, Sqlite>,
    request: &ApprovalRequest,
) -> Result<(), RepositoryError> {
    for step in &request.steps {
        sqlx::query(
            "INSERT INTO approval_step (request_id, step, approver, role, status,
                                        decided_at, decided_by, comment)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(request_id, step) DO UPDATE SET
                 approver = excluded.approver,
                 role = excluded.role,
                 status = excluded.status,
                 decided_at = excluded.decided_at,
                 decided_by = excluded.decided_by,
                 comment = excluded.comment",
        )
        .bind(&request.id.0)
        .bind(i64::from(step.step))
        .bind(&step.approver)
        .bind(&step.role)
        .bind(step.status.as_str())
        .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&step.decided_by)
        .bind(&step.comment)
        .execute(&mut **tx)
        .await
        .map_err(database_error)?;
    }

    Ok(())
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn list(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        // Requests and steps must come from the same snapshot.
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM approval_request ORDER BY submitted_at DESC, id ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(database_error)?;

        let step_rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step ORDER BY request_id ASC, step ASC"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(database_error)?;
        tx.commit().await.map_err(database_error)?;

        let mut steps_by_request: HashMap<String, Vec<ApprovalStep>> = HashMap::new();
        for row in &step_rows {
            let request_id: String = row.try_get("request_id").map_err(decode_error)?;
            steps_by_request.entry(request_id).or_default().push(row_to_step(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(decode_error)?;
                row_to_request(row, steps_by_request.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn find_by_id(
        &self,
        id: &ApprovalId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM approval_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(database_error)?;

        let Some(row) = row else {
            tx.commit().await.map_err(database_error)?;
            return Ok(None);
        };

        let steps = steps_for(&mut tx, id).await?;
        tx.commit().await.map_err(database_error)?;

        row_to_request(&row, steps).map(Some)
    }

    async fn insert(&self, request: ApprovalRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let inserted = sqlx::query(
            "INSERT INTO approval_request (id, title, request_type, description, amount, priority,
                                           applicant_id, applicant_name, applicant_department,
                                           status, current_step, total_steps, version,
                                           submitted_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(request.request_type.as_str())
        .bind(&request.description)
        .bind(request.amount.map(|amount| amount.to_string()))
        .bind(request.priority.as_str())
        .bind(&request.applicant.id)
        .bind(&request.applicant.name)
        .bind(&request.applicant.department)
        .bind(request.status.as_str())
        .bind(i64::from(request.current_step))
        .bind(i64::from(request.total_steps))
        .bind(i64::from(request.version))
        .bind(request.submitted_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            let duplicate = error
                .as_database_error()
                .is_some_and(|db_error| db_error.is_unique_violation());
            if duplicate {
                return Err(RepositoryError::Duplicate { id: request.id });
            }
            return Err(database_error(error));
        }

        upsert_steps(&mut tx, &request).await?;
        tx.commit().await.map_err(database_error)?;

        Ok(())
    }

    async fn update(
        &self,
        request: ApprovalRequest,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(database_error)?;

        let result = sqlx::query(
            "UPDATE approval_request SET
                 title = ?,
                 description = ?,
                 amount = ?,
                 priority = ?,
                 status = ?,
                 current_step = ?,
                 total_steps = ?,
                 version = ?,
                 updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.amount.map(|amount| amount.to_string()))
        .bind(request.priority.as_str())
        .bind(request.status.as_str())
        .bind(i64::from(request.current_step))
        .bind(i64::from(request.total_steps))
        .bind(i64::from(request.version))
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(database_error)?;

        if result.rows_affected() == 0 {
            let stored: Option<i64> =
                sqlx::query_scalar("SELECT version FROM approval_request WHERE id = ?")
                    .bind(&request.id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(database_error)?;
            tx.rollback().await.map_err(database_error)?;

            return match stored {
                None => Err(RepositoryError::NotFound { id: request.id }),
                Some(actual) => Err(RepositoryError::Conflict {
                    id: request.id,
                    expected: expected_version,
                    actual: to_u32("version", actual)?,
                }),
            };
        }

        upsert_steps(&mut tx, &request).await?;
        tx.commit().await.map_err(database_error)?;

        Ok(())
    }
}
