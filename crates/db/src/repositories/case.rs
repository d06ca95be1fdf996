use std::collections::BTreeMap;

use sqlx::Row;

use caseflow_core::domain::case::{CaseId, CaseSnapshot, TaskCompletion};
use caseflow_core::domain::journey::{JourneyId, TenantId};
use caseflow_core::domain::vendor::{SenderId, VendorId};

use super::{decode_error, parse_timestamp, CaseRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCaseRepository {
    pool: DbPool,
}

impl SqlCaseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_case(row: &sqlx::sqlite::SqliteRow) -> Result<CaseSnapshot, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode_error)?;
    let journey_id: String = row.try_get("journey_id").map_err(decode_error)?;
    let sender_id: String = row.try_get("sender_id").map_err(decode_error)?;
    let vendor_id: Option<String> = row.try_get("vendor_id").map_err(decode_error)?;
    let responsible_id: Option<String> = row.try_get("responsible_id").map_err(decode_error)?;
    let state: String = row.try_get("state").map_err(decode_error)?;
    let fields_json: String = row.try_get("fields_json").map_err(decode_error)?;
    let completions_json: String =
        row.try_get("task_completions_json").map_err(decode_error)?;
    let active: bool = row.try_get("active").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let fields: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&fields_json).map_err(decode_error)?;
    let task_completions: Vec<TaskCompletion> =
        serde_json::from_str(&completions_json).map_err(decode_error)?;

    Ok(CaseSnapshot {
        id: CaseId(id),
        tenant_id: TenantId(tenant_id),
        journey_id: JourneyId(journey_id),
        sender_id: SenderId(sender_id),
        vendor_id: vendor_id.map(VendorId),
        responsible_id,
        state,
        fields,
        task_completions,
        active,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl CaseRepository for SqlCaseRepository {
    async fn find_by_id(&self, id: &CaseId) -> Result<Option<CaseSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, journey_id, sender_id, vendor_id, responsible_id, state,
                    fields_json, task_completions_json, active, created_at, updated_at
             FROM journey_case WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_case).transpose()
    }

    async fn find_active_for_sender(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        sender_id: &SenderId,
    ) -> Result<Option<CaseSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, journey_id, sender_id, vendor_id, responsible_id, state,
                    fields_json, task_completions_json, active, created_at, updated_at
             FROM journey_case
             WHERE tenant_id = ? AND journey_id = ? AND sender_id = ? AND active = 1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&tenant_id.0)
        .bind(&journey_id.0)
        .bind(&sender_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_case).transpose()
    }

    async fn save(&self, case: CaseSnapshot) -> Result<(), RepositoryError> {
        let fields_json = serde_json::to_string(&case.fields)
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;
        let completions_json = serde_json::to_string(&case.task_completions)
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO journey_case (id, tenant_id, journey_id, sender_id, vendor_id,
                                       responsible_id, state, fields_json, task_completions_json,
                                       active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 vendor_id = excluded.vendor_id,
                 responsible_id = excluded.responsible_id,
                 state = excluded.state,
                 fields_json = excluded.fields_json,
                 task_completions_json = excluded.task_completions_json,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&case.id.0)
        .bind(&case.tenant_id.0)
        .bind(&case.journey_id.0)
        .bind(&case.sender_id.0)
        .bind(case.vendor_id.as_ref().map(|id| id.0.as_str()))
        .bind(&case.responsible_id)
        .bind(&case.state)
        .bind(fields_json)
        .bind(completions_json)
        .bind(case.active)
        .bind(case.created_at.to_rfc3339())
        .bind(case.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use caseflow_core::domain::case::{CaseSnapshot, TaskCompletion};
    use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, StateMachine, TenantId};
    use caseflow_core::domain::vendor::SenderId;

    use super::SqlCaseRepository;
    use crate::repositories::{
        CaseRepository, JourneyTemplateRepository, SqlJourneyTemplateRepository,
    };
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        SqlJourneyTemplateRepository::new(pool.clone())
            .save(JourneyTemplate {
                id: JourneyId("jt-1".to_string()),
                key: "field_service".to_string(),
                name: "Field service".to_string(),
                description: String::new(),
                sector: None,
                is_crm_style: false,
                default_state_machine: StateMachine {
                    states: vec!["new".to_string(), "visit".to_string()],
                    default_state: "new".to_string(),
                },
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("parent template");
        pool
    }

    fn sample_case(state: &str) -> CaseSnapshot {
        CaseSnapshot::open(
            TenantId("tenant-a".to_string()),
            JourneyId("jt-1".to_string()),
            SenderId("+5511933334444".to_string()),
            state,
        )
    }

    #[tokio::test]
    async fn save_and_find_by_id_keeps_fields_and_completions() {
        let repo = SqlCaseRepository::new(setup().await);
        let mut case = sample_case("visit");
        case.responsible_id = Some("tech-7".to_string());
        case.fields.insert("address".to_string(), json!("Rua Augusta, 10"));
        case.task_completions.push(TaskCompletion {
            task_id: "photo".to_string(),
            completed: true,
            attachment: Some("media/photo.jpg".to_string()),
            completed_by: Some("tech-7".to_string()),
            completed_at: None,
        });

        repo.save(case.clone()).await.expect("save");
        let found = repo.find_by_id(&case.id).await.expect("find").expect("exists");

        assert_eq!(found.state, "visit");
        assert_eq!(found.responsible_id.as_deref(), Some("tech-7"));
        assert_eq!(found.fields, case.fields);
        assert_eq!(found.task_completions, case.task_completions);
    }

    #[tokio::test]
    async fn find_active_for_sender_skips_closed_cases() {
        let repo = SqlCaseRepository::new(setup().await);

        let mut closed = sample_case("visit");
        closed.active = false;
        closed.created_at = Utc::now() + Duration::minutes(5);
        repo.save(closed).await.expect("save closed");

        let open = sample_case("new");
        repo.save(open.clone()).await.expect("save open");

        let found = repo
            .find_active_for_sender(&open.tenant_id, &open.journey_id, &open.sender_id)
            .await
            .expect("find")
            .expect("active case");
        assert_eq!(found.id, open.id);

        let other_sender = repo
            .find_active_for_sender(
                &open.tenant_id,
                &open.journey_id,
                &SenderId("+5511900000000".to_string()),
            )
            .await
            .expect("find");
        assert!(other_sender.is_none());
    }

    #[tokio::test]
    async fn save_upserts_state_changes() {
        let repo = SqlCaseRepository::new(setup().await);
        let mut case = sample_case("new");
        repo.save(case.clone()).await.expect("save");

        case.state = "visit".to_string();
        case.updated_at = Utc::now();
        repo.save(case.clone()).await.expect("upsert");

        let found = repo.find_by_id(&case.id).await.expect("find").expect("exists");
        assert_eq!(found.state, "visit");
    }
}
