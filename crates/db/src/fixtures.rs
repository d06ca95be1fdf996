use chrono::Utc;
use serde_json::Value;

use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, TenantId};
use caseflow_core::domain::vendor::SenderId;
use caseflow_core::errors::ApplicationError;
use caseflow_core::flows::automation::{InboundEvent, InboundEventKind};
use caseflow_core::flows::states::StateMachineBuilder;

use crate::connection::DbPool;
use crate::repositories::{
    RepositoryError, SqlCaseRepository, SqlJourneyTemplateRepository, SqlTenantJourneyRepository,
    SqlVendorRepository,
};
use crate::services::{
    CatalogService, DispatchStatus, EventDispatcher, JourneyConfigEditor,
    RepositoryVendorResolver, TemplateDraft,
};

pub const DEMO_TENANT: &str = "tenant-demo";
pub const DEMO_SENDER: &str = "+5511900000001";

/// Demo journeys seeded for local runs and contract tests.
const DEMO_JOURNEYS: &[DemoJourneyContract] = &[
    DemoJourneyContract {
        key: "vehicle_claims",
        name: "Vehicle Claims",
        description: "Insurance claim intake with field inspection",
        sector: "insurance",
        is_crm_style: false,
        states: &[
            "New",
            "Inspection Scheduled",
            "In Inspection",
            "Awaiting Documents",
            "Approved",
            "Closed",
        ],
        default_state: "new",
        config: r#"{
            "automation": {
                "onText": {"createCase": true, "initialState": "new"},
                "onImage": {"initialState": "awaiting_documents", "createDefaultPendencies": true},
                "onLocation": {"nextState": "in_inspection"},
                "ocr": {"enabled": true, "provider": "textract"}
            },
            "statusConfigs": {
                "inspection_scheduled": {
                    "responsibleId": "inspector-1",
                    "requiredCaseFields": ["address", "plate"],
                    "mandatoryTasks": [{"id": "confirm_slot", "description": "Confirm inspection slot"}]
                },
                "in_inspection": {
                    "mandatoryTasks": [
                        {"id": "vehicle_photos", "description": "Vehicle photos", "requireAttachment": true}
                    ]
                }
            }
        }"#,
        template_label: "template-vehicle-claims",
        activation_label: "activation-vehicle-claims",
    },
    DemoJourneyContract {
        key: "sales_pipeline",
        name: "Sales Pipeline",
        description: "Lead to deal pipeline worked as a kanban board",
        sector: "sales",
        is_crm_style: true,
        states: &["Lead", "Qualified", "Proposal", "Negotiation", "Won", "Lost"],
        default_state: "lead",
        config: r#"{
            "automation": {
                "onText": {"createCase": true},
                "conversations": {"requireVendor": true, "autoCreateVendor": true}
            },
            "statusConfigs": {
                "qualified": {"requiredCaseFields": ["company_name", "budget"]}
            }
        }"#,
        template_label: "template-sales-pipeline",
        activation_label: "activation-sales-pipeline",
    },
];

/// Builds an in-memory template with canonical states; the first state is the default.
pub fn template_with_states(id: &str, key: &str, states: &[&str]) -> JourneyTemplate {
    let now = Utc::now();
    JourneyTemplate {
        id: JourneyId(id.to_string()),
        key: key.to_string(),
        name: key.replace('_', " "),
        description: String::new(),
        sector: None,
        is_crm_style: false,
        default_state_machine: StateMachineBuilder::from_labels(states, "").build(),
        created_at: now,
        updated_at: now,
    }
}

/// Demo catalog: two journeys enabled for [`DEMO_TENANT`] and one case opened by a text
/// message from [`DEMO_SENDER`]. Loading twice leaves the same data behind.
pub struct DemoCatalog;

impl DemoCatalog {
    pub async fn load(pool: &DbPool, min_states: usize) -> Result<SeedResult, ApplicationError> {
        let catalog =
            CatalogService::new(SqlJourneyTemplateRepository::new(pool.clone()), min_states);
        let editor = JourneyConfigEditor::new(
            SqlJourneyTemplateRepository::new(pool.clone()),
            SqlTenantJourneyRepository::new(pool.clone()),
        );
        let tenant_id = TenantId(DEMO_TENANT.to_string());

        let mut journeys_seeded = Vec::with_capacity(DEMO_JOURNEYS.len());
        for journey in DEMO_JOURNEYS {
            let template = catalog.save_template(journey.draft()).await?;
            let patch: Value = serde_json::from_str(journey.config)
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
            editor.apply_patch(&tenant_id, &template.id, &patch).await?;
            editor.set_enabled(&tenant_id, &template.id, true).await?;

            journeys_seeded.push(JourneySeedInfo {
                key: journey.key,
                journey_id: template.id.0.clone(),
                states: template.default_state_machine.states.len(),
            });
        }

        let dispatcher = EventDispatcher::new(
            SqlJourneyTemplateRepository::new(pool.clone()),
            SqlTenantJourneyRepository::new(pool.clone()),
            SqlCaseRepository::new(pool.clone()),
            RepositoryVendorResolver::new(SqlVendorRepository::new(pool.clone())),
        );
        let claims_id = journeys_seeded
            .first()
            .map(|seeded| JourneyId(seeded.journey_id.clone()))
            .ok_or_else(|| ApplicationError::Configuration("demo catalog is empty".to_string()))?;
        let outcome = dispatcher
            .dispatch(
                &claims_id,
                &InboundEvent {
                    tenant_id,
                    sender_id: SenderId(DEMO_SENDER.to_string()),
                    kind: InboundEventKind::Text { body: "My car was hit at the parking lot".to_string() },
                },
            )
            .await?;

        Ok(SeedResult {
            tenant_id: DEMO_TENANT,
            journeys_seeded,
            case_opened: outcome.status == DispatchStatus::CaseCreated,
        })
    }

    /// Verify that seed data exists and matches the demo contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for journey in DEMO_JOURNEYS {
            let row = sqlx::query_as::<_, (String, String, bool)>(
                "SELECT id, state_machine_json, is_crm_style FROM journey_template WHERE key = ?1",
            )
            .bind(journey.key)
            .fetch_optional(pool)
            .await?;
            let Some((journey_id, machine_json, is_crm_style)) = row else {
                checks.push((journey.template_label, false));
                checks.push((journey.activation_label, false));
                continue;
            };

            let machine: Value = serde_json::from_str(&machine_json)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            let states_match = machine
                .get("states")
                .and_then(Value::as_array)
                .map(|states| states.len() == journey.states.len())
                .unwrap_or(false);
            let default_matches =
                machine.get("default").and_then(Value::as_str) == Some(journey.default_state);
            checks.push((
                journey.template_label,
                states_match && default_matches && is_crm_style == journey.is_crm_style,
            ));

            let activation = sqlx::query_as::<_, (bool, String)>(
                "SELECT enabled, config_json FROM tenant_journey WHERE tenant_id = ?1 AND journey_id = ?2",
            )
            .bind(DEMO_TENANT)
            .bind(&journey_id)
            .fetch_optional(pool)
            .await?;
            let activation_ok = match activation {
                Some((enabled, config_json)) => {
                    let config: Value = serde_json::from_str(&config_json)
                        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
                    enabled && config_gates_match(&config, journey.config)?
                }
                None => false,
            };
            checks.push((journey.activation_label, activation_ok));
        }

        let open_cases: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM journey_case c
             JOIN journey_template t ON t.id = c.journey_id
             WHERE c.tenant_id = ?1 AND c.sender_id = ?2 AND c.active = 1
               AND t.key = 'vehicle_claims' AND c.state = 'new' AND c.vendor_id IS NOT NULL",
        )
        .bind(DEMO_TENANT)
        .bind(DEMO_SENDER)
        .fetch_one(pool)
        .await?;
        checks.push(("case-demo-sender", open_cases == 1));

        let vendors: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM vendor WHERE tenant_id = ?1 AND sender_id = ?2",
        )
        .bind(DEMO_TENANT)
        .bind(DEMO_SENDER)
        .fetch_one(pool)
        .await?;
        checks.push(("vendor-demo-sender", vendors == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove everything the demo catalog owns.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM journey_case WHERE tenant_id = ?1")
            .bind(DEMO_TENANT)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vendor WHERE tenant_id = ?1")
            .bind(DEMO_TENANT)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tenant_journey WHERE tenant_id = ?1")
            .bind(DEMO_TENANT)
            .execute(&mut *tx)
            .await?;
        for journey in DEMO_JOURNEYS {
            sqlx::query("DELETE FROM journey_template WHERE key = ?1")
                .bind(journey.key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Every gated state in the seed document is present in the stored one.
fn config_gates_match(stored: &Value, seed_json: &str) -> Result<bool, RepositoryError> {
    let seed: Value = serde_json::from_str(seed_json)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let Some(expected) = seed.get("statusConfigs").and_then(Value::as_object) else {
        return Ok(true);
    };
    let actual = stored.get("statusConfigs").and_then(Value::as_object);
    Ok(expected
        .keys()
        .all(|state| actual.is_some_and(|gates| gates.contains_key(state))))
}

#[derive(Debug, Clone, Copy)]
struct DemoJourneyContract {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    sector: &'static str,
    is_crm_style: bool,
    states: &'static [&'static str],
    default_state: &'static str,
    config: &'static str,
    template_label: &'static str,
    activation_label: &'static str,
}

impl DemoJourneyContract {
    fn draft(&self) -> TemplateDraft {
        TemplateDraft {
            key: self.key.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            sector: Some(self.sector.to_string()),
            is_crm_style: self.is_crm_style,
            states: self.states.iter().map(|state| state.to_string()).collect(),
            default_state: self.default_state.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tenant_id: &'static str,
    pub journeys_seeded: Vec<JourneySeedInfo>,
    pub case_opened: bool,
}

#[derive(Debug)]
pub struct JourneySeedInfo {
    pub key: &'static str,
    pub journey_id: String,
    pub states: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
