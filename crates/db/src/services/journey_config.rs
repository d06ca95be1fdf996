use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use caseflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, TenantId, TenantJourney};
use caseflow_core::errors::{ApplicationError, DomainError};
use caseflow_core::journey_config::{JourneyConfig, StatusConfig};

use crate::repositories::{JourneyTemplateRepository, TenantJourneyRepository};

/// Read-merge-write editor for tenant journey configuration.
///
/// Every call re-reads the stored activation, so concurrent edits to different branches
/// both survive; concurrent edits to the same leaf resolve as last write wins.
pub struct JourneyConfigEditor<T, A, S = TracingAuditSink> {
    templates: T,
    activations: A,
    audit: S,
}

impl<T, A> JourneyConfigEditor<T, A> {
    pub fn new(templates: T, activations: A) -> Self {
        Self { templates, activations, audit: TracingAuditSink }
    }
}

impl<T, A, S> JourneyConfigEditor<T, A, S>
where
    T: JourneyTemplateRepository,
    A: TenantJourneyRepository,
    S: AuditSink,
{
    pub fn with_audit<U: AuditSink>(self, audit: U) -> JourneyConfigEditor<T, A, U> {
        JourneyConfigEditor { templates: self.templates, activations: self.activations, audit }
    }

    pub async fn load(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<TenantJourney, ApplicationError> {
        self.template(journey_id).await?;
        self.stored_activation(tenant_id, journey_id).await
    }

    /// Merges `patch` onto the stored document. `null` removes a key.
    ///
    /// State keys introduced by the patch must belong to the journey; references that were
    /// already dangling before the patch are left alone.
    pub async fn apply_patch(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        patch: &Value,
    ) -> Result<TenantJourney, ApplicationError> {
        let template = self.template(journey_id).await?;
        let mut activation = self.stored_activation(tenant_id, journey_id).await?;

        let patched =
            activation.config.apply_patch(patch).map_err(DomainError::from).and_then(|next| {
                ensure_no_new_unknown_states(&activation.config, &next, &template)?;
                Ok(next)
            });
        let next = match patched {
            Ok(next) => next,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        &context(tenant_id, journey_id),
                        "config.patch_rejected",
                        AuditCategory::Configuration,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        activation.config = next;
        activation.updated_at = Utc::now();
        self.activations.save(activation.clone()).await?;

        info!(
            event_name = "config.patch_applied",
            tenant_id = %tenant_id.0,
            journey_id = %journey_id.0,
            gated_states = activation.config.status_configs.len(),
            "journey configuration patch applied"
        );
        self.audit.emit(
            AuditEvent::new(
                &context(tenant_id, journey_id),
                "config.patch_applied",
                AuditCategory::Configuration,
                AuditOutcome::Success,
            )
            .with_metadata(
                "gated_states",
                activation.config.status_configs.keys().cloned().collect::<Vec<_>>().join(","),
            ),
        );
        Ok(activation)
    }

    /// Replaces the exit gate of one state. An empty gate removes it.
    pub async fn set_status_config(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        state: &str,
        status_config: StatusConfig,
    ) -> Result<TenantJourney, ApplicationError> {
        let patch = JourneyConfig::status_config_patch(state, &status_config)?;
        self.apply_patch(tenant_id, journey_id, &patch).await
    }

    pub async fn set_enabled(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
        enabled: bool,
    ) -> Result<TenantJourney, ApplicationError> {
        let mut activation = self.load(tenant_id, journey_id).await?;
        activation.enabled = enabled;
        activation.updated_at = Utc::now();
        self.activations.save(activation.clone()).await?;

        info!(
            event_name = "config.activation_changed",
            tenant_id = %tenant_id.0,
            journey_id = %journey_id.0,
            enabled,
            "journey activation updated"
        );
        self.audit.emit(
            AuditEvent::new(
                &context(tenant_id, journey_id),
                "config.activation_changed",
                AuditCategory::Configuration,
                AuditOutcome::Success,
            )
            .with_metadata("enabled", enabled.to_string()),
        );
        Ok(activation)
    }

    async fn stored_activation(
        &self,
        tenant_id: &TenantId,
        journey_id: &JourneyId,
    ) -> Result<TenantJourney, ApplicationError> {
        Ok(self
            .activations
            .find(tenant_id, journey_id)
            .await?
            .unwrap_or_else(|| TenantJourney::new(tenant_id.clone(), journey_id.clone())))
    }

    async fn template(&self, journey_id: &JourneyId) -> Result<JourneyTemplate, ApplicationError> {
        self.templates
            .find_by_id(journey_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "journey",
                id: journey_id.0.clone(),
            })
    }
}

fn context(tenant_id: &TenantId, journey_id: &JourneyId) -> AuditContext {
    AuditContext::generated("config-editor").for_journey(tenant_id.clone(), journey_id.clone())
}

fn ensure_no_new_unknown_states(
    before: &JourneyConfig,
    after: &JourneyConfig,
    template: &JourneyTemplate,
) -> Result<(), DomainError> {
    let machine = &template.default_state_machine;
    let already_dangling: HashSet<(String, String)> = before
        .unknown_state_references(machine)
        .into_iter()
        .map(|reference| (reference.path, reference.state))
        .collect();

    match after
        .unknown_state_references(machine)
        .into_iter()
        .find(|reference| {
            !already_dangling.contains(&(reference.path.clone(), reference.state.clone()))
        }) {
        Some(reference) => Err(DomainError::UnknownStateReference {
            path: reference.path,
            state: reference.state,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use caseflow_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use caseflow_core::domain::journey::{JourneyId, JourneyTemplate, TenantId, TenantJourney};
    use caseflow_core::errors::{ApplicationError, DomainError};
    use caseflow_core::journey_config::{JourneyConfig, MandatoryTask, StatusConfig};

    use super::JourneyConfigEditor;
    use crate::fixtures::template_with_states;
    use crate::repositories::{
        InMemoryJourneyTemplateRepository, InMemoryTenantJourneyRepository,
        JourneyTemplateRepository, RepositoryError, TenantJourneyRepository,
    };

    #[derive(Default)]
    struct CountingTemplates {
        inner: InMemoryJourneyTemplateRepository,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl JourneyTemplateRepository for CountingTemplates {
        async fn find_by_id(
            &self,
            id: &JourneyId,
        ) -> Result<Option<JourneyTemplate>, RepositoryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }

        async fn find_by_key(&self, key: &str) -> Result<Option<JourneyTemplate>, RepositoryError> {
            self.inner.find_by_key(key).await
        }

        async fn list(&self) -> Result<Vec<JourneyTemplate>, RepositoryError> {
            self.inner.list().await
        }

        async fn save(&self, template: JourneyTemplate) -> Result<(), RepositoryError> {
            self.inner.save(template).await
        }
    }

    type Editor = JourneyConfigEditor<
        Arc<InMemoryJourneyTemplateRepository>,
        Arc<InMemoryTenantJourneyRepository>,
    >;

    async fn editor() -> (Editor, Arc<InMemoryTenantJourneyRepository>) {
        let templates = Arc::new(InMemoryJourneyTemplateRepository::default());
        templates
            .save(template_with_states("jt-1", "claims", &["new", "in_progress", "done"]))
            .await
            .expect("template");
        let activations = Arc::new(InMemoryTenantJourneyRepository::default());
        (JourneyConfigEditor::new(templates, activations.clone()), activations)
    }

    fn ids() -> (TenantId, JourneyId) {
        (TenantId("tenant-a".to_string()), JourneyId("jt-1".to_string()))
    }

    #[tokio::test]
    async fn first_patch_creates_disabled_activation_lazily() {
        let (editor, activations) = editor().await;
        let (tenant, journey) = ids();

        let activation = editor
            .apply_patch(&tenant, &journey, &json!({"automation": {"onText": {"createCase": true}}}))
            .await
            .expect("patch");

        assert!(!activation.enabled);
        assert!(activation.config.automation.on_text.create_case);
        let stored = activations.find(&tenant, &journey).await.expect("find").expect("stored");
        assert_eq!(stored.config, activation.config);
    }

    #[tokio::test]
    async fn sequential_patches_to_different_branches_both_survive() {
        let (editor, _) = editor().await;
        let (tenant, journey) = ids();

        editor
            .apply_patch(&tenant, &journey, &json!({"automation": {"onText": {"createCase": true}}}))
            .await
            .expect("first");
        let activation = editor
            .apply_patch(
                &tenant,
                &journey,
                &json!({"statusConfigs": {"in_progress": {"requiredCaseFields": ["address"]}}}),
            )
            .await
            .expect("second");

        assert!(activation.config.automation.on_text.create_case);
        assert_eq!(
            activation
                .config
                .status_config("in_progress")
                .map(|gate| gate.required_case_fields.clone()),
            Some(vec!["address".to_string()])
        );
    }

    #[tokio::test]
    async fn patch_introducing_unknown_state_is_rejected() {
        let (editor, activations) = editor().await;
        let (tenant, journey) = ids();

        let error = editor
            .apply_patch(
                &tenant,
                &journey,
                &json!({"automation": {"onLocation": {"nextState": "Archived"}}}),
            )
            .await
            .expect_err("archived is not a journey state");

        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::UnknownStateReference {
                path: "automation.onLocation.nextState".to_string(),
                state: "archived".to_string(),
            })
        );
        assert!(activations.find(&tenant, &journey).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn existing_dangling_reference_does_not_block_unrelated_edits() {
        let (editor, activations) = editor().await;
        let (tenant, journey) = ids();

        let mut stale = TenantJourney::new(tenant.clone(), journey.clone());
        stale.config = JourneyConfig::from_document(
            json!({"automation": {"onText": {"initialState": "removed_state"}}}),
        )
        .expect("config");
        activations.save(stale).await.expect("seed");

        let activation = editor
            .apply_patch(&tenant, &journey, &json!({"automation": {"ocr": {"enabled": true}}}))
            .await
            .expect("unrelated edit");
        assert!(activation.config.automation.ocr.enabled);
    }

    #[tokio::test]
    async fn set_status_config_replaces_and_clearing_prunes() {
        let (editor, _) = editor().await;
        let (tenant, journey) = ids();

        editor
            .set_status_config(
                &tenant,
                &journey,
                "In Progress",
                StatusConfig {
                    responsible_id: Some("agent-1".to_string()),
                    required_case_fields: vec!["Address".to_string(), "phone".to_string()],
                    mandatory_tasks: vec![MandatoryTask::new("visit", "Visit")],
                },
            )
            .await
            .expect("set");

        let activation = editor
            .set_status_config(
                &tenant,
                &journey,
                "in_progress",
                StatusConfig {
                    responsible_id: None,
                    required_case_fields: vec!["phone".to_string()],
                    mandatory_tasks: Vec::new(),
                },
            )
            .await
            .expect("replace");
        let gate = activation.config.status_config("in_progress").expect("gate");
        assert_eq!(gate.required_case_fields, vec!["phone"]);
        assert!(gate.mandatory_tasks.is_empty());
        assert!(gate.responsible_id.is_none());

        let activation = editor
            .set_status_config(&tenant, &journey, "in_progress", StatusConfig::default())
            .await
            .expect("clear");
        assert!(activation.config.status_configs.is_empty());
    }

    #[tokio::test]
    async fn raw_patch_with_state_labels_edits_the_canonical_gate() {
        let (editor, activations) = editor().await;
        let (tenant, journey) = ids();
        editor
            .set_status_config(
                &tenant,
                &journey,
                "in_progress",
                StatusConfig {
                    required_case_fields: vec!["phone".to_string()],
                    mandatory_tasks: vec![MandatoryTask::new("call", "Call the customer")],
                    ..StatusConfig::default()
                },
            )
            .await
            .expect("seed gate");

        let activation = editor
            .apply_patch(
                &tenant,
                &journey,
                &json!({"statusConfigs": {
                    "In Progress": {"requiredCaseFields": ["plate"], "mandatoryTasks": []}
                }}),
            )
            .await
            .expect("replace");
        let gate = activation.config.status_config("in_progress").expect("gate");
        assert_eq!(gate.required_case_fields, vec!["plate"]);
        assert!(gate.mandatory_tasks.is_empty());

        editor
            .apply_patch(&tenant, &journey, &json!({"statusConfigs": {"In Progress": null}}))
            .await
            .expect("prune");
        let stored = activations.find(&tenant, &journey).await.expect("find").expect("stored");
        assert!(stored.config.status_configs.is_empty());
    }

    #[tokio::test]
    async fn applied_and_rejected_patches_are_audited() {
        let (editor, _) = editor().await;
        let sink = InMemoryAuditSink::default();
        let editor = editor.with_audit(sink.clone());
        let (tenant, journey) = ids();

        editor
            .apply_patch(
                &tenant,
                &journey,
                &json!({"statusConfigs": {"done": {"requiredCaseFields": ["x"]}}}),
            )
            .await
            .expect("patch");
        editor
            .apply_patch(
                &tenant,
                &journey,
                &json!({"automation": {"onText": {"initialState": "gone"}}}),
            )
            .await
            .expect_err("unknown state");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "config.patch_applied");
        assert_eq!(events[0].category, AuditCategory::Configuration);
        assert_eq!(events[0].metadata.get("gated_states").map(String::as_str), Some("done"));
        assert_eq!(events[1].event_type, "config.patch_rejected");
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
        assert_eq!(events[1].tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn patch_reads_the_template_once() {
        let templates = Arc::new(CountingTemplates::default());
        templates
            .save(template_with_states("jt-1", "claims", &["new", "in_progress", "done"]))
            .await
            .expect("template");
        let editor = JourneyConfigEditor::new(
            templates.clone(),
            Arc::new(InMemoryTenantJourneyRepository::default()),
        );
        let (tenant, journey) = ids();

        editor
            .apply_patch(&tenant, &journey, &json!({"automation": {"ocr": {"enabled": true}}}))
            .await
            .expect("patch");

        assert_eq!(templates.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gate_for_unknown_state_is_rejected() {
        let (editor, _) = editor().await;
        let (tenant, journey) = ids();

        let error = editor
            .set_status_config(
                &tenant,
                &journey,
                "archived",
                StatusConfig { required_case_fields: vec!["x".to_string()], ..StatusConfig::default() },
            )
            .await
            .expect_err("unknown state");

        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::UnknownStateReference { .. })
        ));
    }

    #[tokio::test]
    async fn set_enabled_toggles_without_touching_config() {
        let (editor, _) = editor().await;
        let (tenant, journey) = ids();
        editor
            .apply_patch(&tenant, &journey, &json!({"automation": {"onText": {"createCase": true}}}))
            .await
            .expect("patch");

        let activation = editor.set_enabled(&tenant, &journey, true).await.expect("enable");

        assert!(activation.enabled);
        assert!(activation.config.automation.on_text.create_case);
    }

    #[tokio::test]
    async fn unknown_journey_is_not_found() {
        let (editor, _) = editor().await;

        let error = editor
            .set_enabled(&TenantId("tenant-a".to_string()), &JourneyId("missing".to_string()), true)
            .await
            .expect_err("missing journey");

        assert!(matches!(error, ApplicationError::NotFound { entity: "journey", .. }));
    }
}
