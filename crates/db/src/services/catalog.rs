use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use caseflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use caseflow_core::domain::journey::{JourneyId, JourneyTemplate};
use caseflow_core::errors::{ApplicationError, DomainError};
use caseflow_core::flows::states::{validate_for_catalog, StateMachineBuilder};
use caseflow_core::keys::canonicalize;

use crate::repositories::JourneyTemplateRepository;

/// Operator input for creating or replacing a journey template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub is_crm_style: bool,
    pub states: Vec<String>,
    #[serde(default)]
    pub default_state: String,
}

/// Catalog writes. Every persisted state machine passes [`validate_for_catalog`].
pub struct CatalogService<T, S = TracingAuditSink> {
    templates: T,
    min_states: usize,
    audit: S,
}

impl<T> CatalogService<T> {
    pub fn new(templates: T, min_states: usize) -> Self {
        Self { templates, min_states, audit: TracingAuditSink }
    }
}

impl<T, S> CatalogService<T, S>
where
    T: JourneyTemplateRepository,
    S: AuditSink,
{
    pub fn with_audit<U: AuditSink>(self, audit: U) -> CatalogService<T, U> {
        CatalogService { templates: self.templates, min_states: self.min_states, audit }
    }

    /// Creates the template, or replaces the one already stored under the same key.
    pub async fn save_template(
        &self,
        draft: TemplateDraft,
    ) -> Result<JourneyTemplate, ApplicationError> {
        let label = draft.key.clone();
        let result = self.save_draft(draft).await;
        self.record("catalog.template_saved", &label, &result);
        result
    }

    async fn save_draft(&self, draft: TemplateDraft) -> Result<JourneyTemplate, ApplicationError> {
        let key = canonicalize(&draft.key);
        if key.is_empty() {
            return Err(DomainError::InvalidTemplateKey { raw: draft.key }.into());
        }

        let builder = StateMachineBuilder::from_labels(&draft.states, &draft.default_state);
        let requested_default = canonicalize(&draft.default_state);
        if !requested_default.is_empty() && !builder.states().contains(&requested_default) {
            return Err(DomainError::DefaultStateNotInStates { state: requested_default }.into());
        }
        let machine = builder.build();
        validate_for_catalog(&machine, self.min_states)?;

        let now = Utc::now();
        let existing = self.templates.find_by_key(&key).await?;
        let template = JourneyTemplate {
            id: existing
                .as_ref()
                .map(|template| template.id.clone())
                .unwrap_or_else(|| JourneyId(uuid::Uuid::new_v4().to_string())),
            key,
            name: draft.name.trim().to_string(),
            description: draft.description.trim().to_string(),
            sector: draft.sector.map(|sector| sector.trim().to_string()).filter(|s| !s.is_empty()),
            is_crm_style: draft.is_crm_style,
            default_state_machine: machine,
            created_at: existing.as_ref().map(|template| template.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.templates.save(template.clone()).await?;

        info!(
            event_name = "catalog.template_saved",
            journey_id = %template.id.0,
            key = %template.key,
            states = template.default_state_machine.states.len(),
            replaced = existing.is_some(),
            "journey template saved"
        );
        Ok(template)
    }

    pub async fn append_state(
        &self,
        journey_id: &JourneyId,
        label: &str,
    ) -> Result<JourneyTemplate, ApplicationError> {
        self.edit(journey_id, |builder| match builder.append(label) {
            Some(_) => Ok(()),
            None => {
                let key = canonicalize(label);
                if key.is_empty() {
                    Err(DomainError::EmptyStateKey { raw: label.to_string() })
                } else {
                    Err(DomainError::DuplicateState { state: key })
                }
            }
        })
        .await
    }

    pub async fn remove_state(
        &self,
        journey_id: &JourneyId,
        label: &str,
    ) -> Result<JourneyTemplate, ApplicationError> {
        self.edit(journey_id, |builder| {
            if builder.remove(label) {
                Ok(())
            } else {
                Err(DomainError::UnknownState { state: canonicalize(label) })
            }
        })
        .await
    }

    pub async fn move_state(
        &self,
        journey_id: &JourneyId,
        from: usize,
        to: usize,
    ) -> Result<JourneyTemplate, ApplicationError> {
        self.edit(journey_id, |builder| {
            if builder.move_state(from, to) {
                Ok(())
            } else {
                Err(DomainError::InvariantViolation(format!(
                    "state position {from} is out of range for {} states",
                    builder.states().len()
                )))
            }
        })
        .await
    }

    pub async fn set_default_state(
        &self,
        journey_id: &JourneyId,
        label: &str,
    ) -> Result<JourneyTemplate, ApplicationError> {
        self.edit(journey_id, |builder| {
            let key = canonicalize(label);
            if !builder.states().contains(&key) {
                return Err(DomainError::UnknownState { state: key });
            }
            builder.set_default(&key);
            Ok(())
        })
        .await
    }

    async fn edit<F>(
        &self,
        journey_id: &JourneyId,
        change: F,
    ) -> Result<JourneyTemplate, ApplicationError>
    where
        F: FnOnce(&mut StateMachineBuilder) -> Result<(), DomainError>,
    {
        let result = self.apply_edit(journey_id, change).await;
        self.record("catalog.states_edited", &journey_id.0, &result);
        result
    }

    async fn apply_edit<F>(
        &self,
        journey_id: &JourneyId,
        change: F,
    ) -> Result<JourneyTemplate, ApplicationError>
    where
        F: FnOnce(&mut StateMachineBuilder) -> Result<(), DomainError>,
    {
        let mut template = self.templates.find_by_id(journey_id).await?.ok_or_else(|| {
            ApplicationError::NotFound { entity: "journey", id: journey_id.0.clone() }
        })?;

        let mut builder = StateMachineBuilder::from_machine(&template.default_state_machine);
        change(&mut builder)?;
        let machine = builder.build();
        validate_for_catalog(&machine, self.min_states)?;

        template.default_state_machine = machine;
        template.updated_at = Utc::now();
        self.templates.save(template.clone()).await?;

        info!(
            event_name = "catalog.template_saved",
            journey_id = %template.id.0,
            key = %template.key,
            states = template.default_state_machine.states.len(),
            replaced = true,
            "journey template state list edited"
        );
        Ok(template)
    }

    fn record(
        &self,
        event_type: &str,
        subject: &str,
        result: &Result<JourneyTemplate, ApplicationError>,
    ) {
        let context = AuditContext::generated("catalog");
        let event = match result {
            Ok(template) => AuditEvent::new(
                &context,
                event_type,
                AuditCategory::Catalog,
                AuditOutcome::Success,
            )
            .with_metadata("journey_id", template.id.0.clone())
            .with_metadata("key", template.key.clone())
            .with_metadata("states", template.default_state_machine.states.join(",")),
            Err(ApplicationError::Domain(error)) => AuditEvent::new(
                &context,
                "catalog.edit_rejected",
                AuditCategory::Catalog,
                AuditOutcome::Rejected,
            )
            .with_metadata("subject", subject)
            .with_metadata("error", error.to_string()),
            Err(error) => AuditEvent::new(
                &context,
                "catalog.edit_failed",
                AuditCategory::Persistence,
                AuditOutcome::Failed,
            )
            .with_metadata("subject", subject)
            .with_metadata("error", error.to_string()),
        };
        self.audit.emit(event);
    }
}
