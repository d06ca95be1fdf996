use sqlx::Row;

use caseflow_core::domain::journey::{
    JourneyId, JourneyTemplate, StateMachine, TenantId, TenantJourney,
};
use caseflow_core::journey_config::JourneyConfig;

use super::{
    decode_error, parse_timestamp, JourneyTemplateRepository, RepositoryError,
    TenantJourneyRepository,
};
use crate::DbPool;

const TEMPLATE_COLUMNS: &str = "id, key, name, description, sector, is_crm_style,
    state_machine_json, created_at, updated_at";

pub struct SqlJourneyTemplateRepository {
    pool: DbPool,
}

impl SqlJourneyTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<JourneyTemplate, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let key: String = row.try_get("key").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let sector: Option<String> = row.try_get("sector").map_err(decode_error)?;
    let is_crm_style: bool = row.try_get("is_crm_style").map_err(decode_error)?;
    let machine_json: String = row.try_get("state_machine_json").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let default_state_machine: StateMachine =
        serde_json::from_str(&machine_json).map_err(decode_error)?;

    Ok(JourneyTemplate {
        id: JourneyId(id),
        key,
        name,
        description,
        sector,
        is_crm_style,
        default_state_machine,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl JourneyTemplateRepository for SqlJourneyTemplateRepository {
    async fn find_by_id(&self, id: &JourneyId) -> Result<Option<JourneyTemplate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM journey_template WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<JourneyTemplate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM journey_template WHERE key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    async fn list(&self) -> Result<Vec<JourneyTemplate>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM journey_template ORDER BY key ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }

    async fn save(&self, template: JourneyTemplate) -> Result<(), RepositoryError> {
        let machine_json = serde_json::to_string(&template.default_state_machine)
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO journey_template (id, key, name, description, sector, is_crm_style,
                                           state_machine_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 key = excluded.key,
                 name = excluded.name,
                 description = excluded.description,
                 sector = excluded.sector,
                 is_crm_style = excluded.is_crm_style,
                 state_machine_json = excluded.state_machine_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&template.id.0)
        .bind(&template.key)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.sector)
        .bind(template.is_crm_style)
        .bind(machine_json)
        .bind(template.created_at.to_rfc3339())
        .bind(template.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlTenantJourneyRepository {
    pool: DbPool,
}

impl SqlTenantJourneyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_activation(row: &sqlx::sqlite::SqliteRow) -> Result<TenantJourney, RepositoryError> {
    let tenant_id: String = row.try_get("tenant_id").map_err(decode_error)?;
    let journey_id: String = row.try_get("journey_id").map_err(decode_error)?;
    let enabled: bool = row.try_get("enabled").map_err(decode_error)?;
    let config_json: String = row.try_get("config_json").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let document: serde_json::Value = serde_json::from_str(&config_json).map_err(decode_error)?;
    let config = JourneyConfig::from_document(document).map_err(decode_error)?;

    Ok(TenantJourney {
        tenant_id: TenantId(tenant_id),
        journey_id: JourneyId(journey_id),
        enabled,
        config,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl TenantJourneyRepository for SqlTenantJourneyRepository {
    async fn find(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<Option<TenantJourney>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, journey_id, enabled, config_json, updated_at
             FROM tenant_journey WHERE tenant_id = ? AND journey_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&journey_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_activation).transpose()
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<TenantJourney>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT tenant_id, journey_id, enabled, config_json, updated_at
             FROM tenant_journey WHERE tenant_id = ? ORDER BY journey_id ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_activation).collect()
    }

    async fn save(&self, activation: TenantJourney) -> Result<(), RepositoryError> {
        let document = activation
            .config
            .to_document()
            .map_err(|error| RepositoryError::Encode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO tenant_journey (tenant_id, journey_id, enabled, config_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, journey_id) DO UPDATE SET
                 enabled = excluded.enabled,
                 config_json = excluded.config_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&activation.tenant_id.0)
        .bind(&activation.journey_id.0)
        .bind(activation.enabled)
        .bind(document.to_string())
        .bind(activation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use caseflow_core::domain::journey::{
        JourneyId, JourneyTemplate, StateMachine, TenantId, TenantJourney,
    };
    use caseflow_core::journey_config::JourneyConfig;

    use super::{SqlJourneyTemplateRepository, SqlTenantJourneyRepository};
    use crate::repositories::{JourneyTemplateRepository, TenantJourneyRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_template(id: &str, key: &str) -> JourneyTemplate {
        let now = Utc::now();
        JourneyTemplate {
            id: JourneyId(id.to_string()),
            key: key.to_string(),
            name: "Vehicle claims".to_string(),
            description: "Claims opened from the messaging channel".to_string(),
            sector: Some("insurance".to_string()),
            is_crm_style: false,
            default_state_machine: StateMachine {
                states: vec!["new".to_string(), "inspection".to_string(), "closed".to_string()],
                default_state: "new".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn template_save_and_find_by_id_and_key() {
        let repo = SqlJourneyTemplateRepository::new(setup().await);
        let template = sample_template("jt-1", "vehicle_claims");

        repo.save(template.clone()).await.expect("save");

        let by_id = repo
            .find_by_id(&JourneyId("jt-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(by_id.key, "vehicle_claims");
        assert_eq!(by_id.default_state_machine, template.default_state_machine);
        assert_eq!(by_id.sector.as_deref(), Some("insurance"));

        let by_key = repo.find_by_key("vehicle_claims").await.expect("find").expect("exists");
        assert_eq!(by_key.id, template.id);
        assert!(repo.find_by_key("missing").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn template_save_upserts_state_machine() {
        let repo = SqlJourneyTemplateRepository::new(setup().await);
        let mut template = sample_template("jt-1", "vehicle_claims");
        repo.save(template.clone()).await.expect("save");

        template.default_state_machine.states.push("reopened".to_string());
        repo.save(template.clone()).await.expect("upsert");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].default_state_machine.states.len(), 4);
    }

    #[tokio::test]
    async fn activation_round_trips_config_document() {
        let pool = setup().await;
        SqlJourneyTemplateRepository::new(pool.clone())
            .save(sample_template("jt-1", "vehicle_claims"))
            .await
            .expect("save template");
        let repo = SqlTenantJourneyRepository::new(pool);

        let mut activation =
            TenantJourney::new(TenantId("tenant-a".to_string()), JourneyId("jt-1".to_string()));
        activation.enabled = true;
        activation.config = JourneyConfig::from_document(json!({
            "automation": {"onText": {"createCase": true, "initialState": "inspection"}},
            "statusConfigs": {"inspection": {"requiredCaseFields": ["plate"]}},
            "branding": {"color": "teal"}
        }))
        .expect("config");
        repo.save(activation.clone()).await.expect("save");

        let found = repo
            .find(&activation.tenant_id, &activation.journey_id)
            .await
            .expect("find")
            .expect("exists");
        assert!(found.enabled);
        assert_eq!(found.config, activation.config);

        let listed = repo.list_for_tenant(&activation.tenant_id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert!(repo
            .list_for_tenant(&TenantId("tenant-b".to_string()))
            .await
            .expect("list")
            .is_empty());
    }
}
