use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use caseflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use caseflow_core::domain::case::CaseSnapshot;
use caseflow_core::domain::journey::JourneyId;
use caseflow_core::errors::{ApplicationError, DomainError};
use caseflow_core::flows::automation::{
    AutomationDecision, FollowUp, IgnoreReason, InboundEvent, VendorResolver,
};
use caseflow_core::flows::engine::{gate_audit_event, WorkflowEngine};

use crate::repositories::{CaseRepository, JourneyTemplateRepository, TenantJourneyRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    CaseCreated,
    EventAttached,
    Transitioned,
    TransitionBlocked,
    Ignored,
    Refused,
}

/// What happened to one inbound event. `case` is the case as stored afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    pub decision: AutomationDecision,
    pub case: Option<CaseSnapshot>,
}

/// Owns case mutation for inbound events: asks the workflow engine what to do and
/// applies the answer to the case store.
///
/// Every decision, gate verdict and case write is reported to the audit sink.
pub struct EventDispatcher<T, A, C, R, S = TracingAuditSink> {
    templates: T,
    activations: A,
    cases: C,
    vendors: R,
    audit: S,
}

impl<T, A, C, R> EventDispatcher<T, A, C, R> {
    pub fn new(templates: T, activations: A, cases: C, vendors: R) -> Self {
        Self { templates, activations, cases, vendors, audit: TracingAuditSink }
    }
}

impl<T, A, C, R, S> EventDispatcher<T, A, C, R, S>
where
    T: JourneyTemplateRepository,
    A: TenantJourneyRepository,
    C: CaseRepository,
    R: VendorResolver,
    S: AuditSink,
{
    pub fn with_audit<U: AuditSink>(self, audit: U) -> EventDispatcher<T, A, C, R, U> {
        EventDispatcher {
            templates: self.templates,
            activations: self.activations,
            cases: self.cases,
            vendors: self.vendors,
            audit,
        }
    }

    pub async fn dispatch(
        &self,
        journey_id: &JourneyId,
        event: &InboundEvent,
    ) -> Result<DispatchOutcome, ApplicationError> {
        let activation = match self.activations.find(&event.tenant_id, journey_id).await? {
            Some(activation) if activation.enabled => activation,
            _ => {
                return Ok(DispatchOutcome {
                    status: DispatchStatus::Ignored,
                    decision: AutomationDecision::Ignored { reason: IgnoreReason::JourneyDisabled },
                    case: None,
                })
            }
        };
        let template = self.templates.find_by_id(journey_id).await?.ok_or_else(|| {
            ApplicationError::NotFound { entity: "journey", id: journey_id.0.clone() }
        })?;
        let existing = self
            .cases
            .find_active_for_sender(&event.tenant_id, journey_id, &event.sender_id)
            .await?;

        let audit = AuditContext::generated("dispatcher")
            .for_journey(event.tenant_id.clone(), journey_id.clone());
        let audit = match &existing {
            Some(case) => audit.for_case(case.id.clone()),
            None => audit,
        };

        let engine = WorkflowEngine::new(&template.default_state_machine, &activation.config);
        let decision = engine
            .decide_with_audit(event, existing.as_ref(), &self.vendors, &self.audit, &audit)
            .await?;

        let (status, case) = match &decision {
            AutomationDecision::CreateCase { initial_state, vendor, follow_ups } => {
                let mut case = CaseSnapshot::open(
                    event.tenant_id.clone(),
                    journey_id.clone(),
                    event.sender_id.clone(),
                    initial_state.clone(),
                );
                case.vendor_id = vendor.as_ref().map(|link| link.vendor_id.clone());
                case.responsible_id = assigned_responsible(follow_ups);
                self.save_case(&audit, "case.created", &case).await?;
                info!(
                    event_name = "dispatch.case_created",
                    tenant_id = %event.tenant_id.0,
                    journey_id = %journey_id.0,
                    case_id = %case.id.0,
                    state = %case.state,
                    "case opened from inbound event"
                );
                (DispatchStatus::CaseCreated, Some(case))
            }
            AutomationDecision::AttachToCase { .. } => {
                let mut case = require_existing(existing)?;
                case.updated_at = Utc::now();
                self.save_case(&audit, "case.touched", &case).await?;
                (DispatchStatus::EventAttached, Some(case))
            }
            AutomationDecision::RequestTransition { to, gate, follow_ups, .. } => {
                let mut case = require_existing(existing)?;
                self.audit.emit(gate_audit_event(&audit, gate));
                if gate.allowed {
                    case.state = to.clone();
                    if let Some(actor_id) = assigned_responsible(follow_ups) {
                        case.responsible_id = Some(actor_id);
                    }
                    case.updated_at = Utc::now();
                    self.save_case(&audit, "case.transitioned", &case).await?;
                    info!(
                        event_name = "dispatch.transition_committed",
                        case_id = %case.id.0,
                        to = %case.state,
                        "case moved by automation"
                    );
                    (DispatchStatus::Transitioned, Some(case))
                } else {
                    warn!(
                        event_name = "dispatch.transition_blocked",
                        case_id = %case.id.0,
                        state = %gate.state,
                        missing_fields = gate.missing_fields.len(),
                        incomplete_tasks = gate.incomplete_tasks.len(),
                        "automation transition held by exit gate"
                    );
                    (DispatchStatus::TransitionBlocked, Some(case))
                }
            }
            AutomationDecision::Ignored { .. } => (DispatchStatus::Ignored, existing),
            AutomationDecision::Refused { .. } => (DispatchStatus::Refused, None),
        };

        Ok(DispatchOutcome { status, decision, case })
    }

    async fn save_case(
        &self,
        audit: &AuditContext,
        event_type: &str,
        case: &CaseSnapshot,
    ) -> Result<(), ApplicationError> {
        let audit = audit.clone().for_case(case.id.clone());
        match self.cases.save(case.clone()).await {
            Ok(()) => {
                self.audit.emit(
                    AuditEvent::new(
                        &audit,
                        event_type,
                        AuditCategory::Persistence,
                        AuditOutcome::Success,
                    )
                    .with_metadata("state", case.state.clone()),
                );
                Ok(())
            }
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        &audit,
                        "case.save_failed",
                        AuditCategory::Persistence,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }
}

fn assigned_responsible(follow_ups: &[FollowUp]) -> Option<String> {
    follow_ups.iter().find_map(|follow_up| match follow_up {
        FollowUp::AssignResponsible { actor_id } => Some(actor_id.clone()),
        _ => None,
    })
}

fn require_existing(existing: Option<CaseSnapshot>) -> Result<CaseSnapshot, ApplicationError> {
    existing.ok_or_else(|| {
        DomainError::InvariantViolation("case decision without an open case".to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use caseflow_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use caseflow_core::domain::case::TaskCompletion;
    use caseflow_core::domain::journey::{JourneyId, TenantId};
    use caseflow_core::domain::vendor::SenderId;
    use caseflow_core::flows::automation::{AutomationDecision, InboundEvent, InboundEventKind};

    use super::{DispatchStatus, EventDispatcher};
    use crate::fixtures::template_with_states;
    use crate::repositories::{
        CaseRepository, InMemoryCaseRepository, InMemoryJourneyTemplateRepository,
        InMemoryTenantJourneyRepository, InMemoryVendorRepository, JourneyTemplateRepository,
        VendorRepository,
    };
    use crate::services::{JourneyConfigEditor, RepositoryVendorResolver};

    struct Harness {
        dispatcher: EventDispatcher<
            Arc<InMemoryJourneyTemplateRepository>,
            Arc<InMemoryTenantJourneyRepository>,
            Arc<InMemoryCaseRepository>,
            RepositoryVendorResolver<Arc<InMemoryVendorRepository>>,
            InMemoryAuditSink,
        >,
        editor: JourneyConfigEditor<
            Arc<InMemoryJourneyTemplateRepository>,
            Arc<InMemoryTenantJourneyRepository>,
        >,
        cases: Arc<InMemoryCaseRepository>,
        vendors: Arc<InMemoryVendorRepository>,
        audit: InMemoryAuditSink,
    }

    async fn harness() -> Harness {
        let templates = Arc::new(InMemoryJourneyTemplateRepository::default());
        templates
            .save(template_with_states(
                "jt-field",
                "field_service",
                &["new", "in_progress", "ready_for_review", "done"],
            ))
            .await
            .expect("template");
        let activations = Arc::new(InMemoryTenantJourneyRepository::default());
        let cases = Arc::new(InMemoryCaseRepository::default());
        let vendors = Arc::new(InMemoryVendorRepository::default());
        let audit = InMemoryAuditSink::default();

        Harness {
            dispatcher: EventDispatcher::new(
                templates.clone(),
                activations.clone(),
                cases.clone(),
                RepositoryVendorResolver::new(vendors.clone()),
            )
            .with_audit(audit.clone()),
            editor: JourneyConfigEditor::new(templates, activations),
            cases,
            vendors,
            audit,
        }
    }

    fn tenant() -> TenantId {
        TenantId("tenant-a".to_string())
    }

    fn journey() -> JourneyId {
        JourneyId("jt-field".to_string())
    }

    fn event(kind: InboundEventKind) -> InboundEvent {
        InboundEvent {
            tenant_id: tenant(),
            sender_id: SenderId("+5511944445555".to_string()),
            kind,
        }
    }

    async fn configure(harness: &Harness, patch: serde_json::Value) {
        harness.editor.apply_patch(&tenant(), &journey(), &patch).await.expect("patch");
        harness.editor.set_enabled(&tenant(), &journey(), true).await.expect("enable");
    }

    #[tokio::test]
    async fn disabled_or_missing_activation_is_ignored() {
        let harness = harness().await;
        let text = event(InboundEventKind::Text { body: "hi".to_string() });

        let outcome = harness.dispatcher.dispatch(&journey(), &text).await.expect("dispatch");
        assert_eq!(outcome.status, DispatchStatus::Ignored);

        harness
            .editor
            .apply_patch(&tenant(), &journey(), &json!({"automation": {"onText": {"createCase": true}}}))
            .await
            .expect("patch");
        let outcome = harness.dispatcher.dispatch(&journey(), &text).await.expect("dispatch");
        assert_eq!(outcome.status, DispatchStatus::Ignored, "activation is still disabled");
    }

    #[tokio::test]
    async fn text_creates_case_with_vendor_and_responsible() {
        let harness = harness().await;
        configure(
            &harness,
            json!({
                "automation": {"onText": {"createCase": true, "initialState": "in_progress"}},
                "statusConfigs": {
                    "in_progress": {"responsibleId": "agent-3", "requiredCaseFields": ["address"]}
                }
            }),
        )
        .await;

        let text = event(InboundEventKind::Text { body: "need a visit".to_string() });
        let outcome = harness.dispatcher.dispatch(&journey(), &text).await.expect("dispatch");

        assert_eq!(outcome.status, DispatchStatus::CaseCreated);
        let case = outcome.case.expect("case");
        assert_eq!(case.state, "in_progress");
        assert_eq!(case.responsible_id.as_deref(), Some("agent-3"));
        let vendor = harness
            .vendors
            .find_by_sender(&tenant(), &text.sender_id)
            .await
            .expect("find")
            .expect("vendor auto-created");
        assert_eq!(case.vendor_id, Some(vendor.id));

        let second = harness.dispatcher.dispatch(&journey(), &text).await.expect("dispatch");
        assert_eq!(second.status, DispatchStatus::EventAttached);
        assert_eq!(second.case.map(|attached| attached.id), Some(case.id));
    }

    #[tokio::test]
    async fn refused_event_stores_nothing() {
        let harness = harness().await;
        configure(
            &harness,
            json!({
                "automation": {
                    "onText": {"createCase": true},
                    "conversations": {"requireVendor": true, "autoCreateVendor": false}
                }
            }),
        )
        .await;

        let text = event(InboundEventKind::Text { body: "hello".to_string() });
        let outcome = harness.dispatcher.dispatch(&journey(), &text).await.expect("dispatch");

        assert_eq!(outcome.status, DispatchStatus::Refused);
        assert!(outcome.decision.is_refusal());
        let events = harness.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "automation.refused");
        assert_eq!(events[0].category, AuditCategory::Automation);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("sender_id"), Some(&text.sender_id.0));
        assert!(harness
            .cases
            .find_active_for_sender(&tenant(), &journey(), &text.sender_id)
            .await
            .expect("find")
            .is_none());
    }

    #[tokio::test]
    async fn location_transition_waits_for_gate_then_commits() {
        let harness = harness().await;
        configure(
            &harness,
            json!({
                "automation": {
                    "onImage": {"initialState": "in_progress"},
                    "onLocation": {"nextState": "ready_for_review"}
                },
                "statusConfigs": {
                    "in_progress": {
                        "requiredCaseFields": ["address"],
                        "mandatoryTasks": [{"id": "visit", "description": "Visit site"}]
                    },
                    "ready_for_review": {"responsibleId": "reviewer-1", "requiredCaseFields": ["notes"]}
                }
            }),
        )
        .await;

        let image = event(InboundEventKind::Image {
            media_ref: "media/1.jpg".to_string(),
            caption: None,
        });
        let created = harness.dispatcher.dispatch(&journey(), &image).await.expect("dispatch");
        assert_eq!(created.status, DispatchStatus::CaseCreated);
        let case_id = created.case.expect("case").id;

        let location = event(InboundEventKind::Location { latitude: -23.5, longitude: -46.6 });
        let blocked = harness.dispatcher.dispatch(&journey(), &location).await.expect("dispatch");
        assert_eq!(blocked.status, DispatchStatus::TransitionBlocked);
        assert!(matches!(
            blocked.decision,
            AutomationDecision::RequestTransition { ref gate, .. } if !gate.allowed
        ));
        let stored = harness.cases.find_by_id(&case_id).await.expect("find").expect("case");
        assert_eq!(stored.state, "in_progress");
        let blocked_gate = harness
            .audit
            .events()
            .into_iter()
            .find(|event| event.event_type == "gate.exit_blocked")
            .expect("blocked gate audited");
        assert_eq!(blocked_gate.case_id.as_ref(), Some(&case_id));
        let metadata = &blocked_gate.metadata;
        assert_eq!(metadata.get("missing_fields").map(String::as_str), Some("address"));
        assert_eq!(metadata.get("incomplete_tasks").map(String::as_str), Some("visit"));

        let mut ready = stored;
        ready.fields.insert("address".to_string(), json!("Rua Harmonia, 55"));
        ready.task_completions.push(TaskCompletion {
            task_id: "visit".to_string(),
            completed: true,
            attachment: None,
            completed_by: Some("tech-1".to_string()),
            completed_at: None,
        });
        harness.cases.save(ready).await.expect("save");

        let moved = harness.dispatcher.dispatch(&journey(), &location).await.expect("dispatch");
        assert_eq!(moved.status, DispatchStatus::Transitioned);
        let case = moved.case.expect("case");
        assert_eq!(case.state, "ready_for_review");
        assert_eq!(case.responsible_id.as_deref(), Some("reviewer-1"));

        let event_types: Vec<String> =
            harness.audit.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(
            event_types,
            vec![
                "automation.decided",
                "case.created",
                "automation.decided",
                "gate.exit_blocked",
                "automation.decided",
                "gate.exit_allowed",
                "case.transitioned",
            ]
        );
    }
}
