use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::case::CaseId;
use crate::domain::journey::{JourneyId, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Catalog,
    Configuration,
    Automation,
    Gate,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub tenant_id: Option<TenantId>,
    pub journey_id: Option<JourneyId>,
    pub case_id: Option<CaseId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    /// Context with a fresh correlation id.
    pub fn generated(actor: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), actor)
    }

    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            tenant_id: None,
            journey_id: None,
            case_id: None,
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }

    pub fn for_journey(mut self, tenant_id: TenantId, journey_id: JourneyId) -> Self {
        self.tenant_id = Some(tenant_id);
        self.journey_id = Some(journey_id);
        self
    }

    pub fn for_case(mut self, case_id: CaseId) -> Self {
        self.case_id = Some(case_id);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub tenant_id: Option<TenantId>,
    pub journey_id: Option<JourneyId>,
    pub case_id: Option<CaseId>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            tenant_id: context.tenant_id.clone(),
            journey_id: context.journey_id.clone(),
            case_id: context.case_id.clone(),
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: context.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn emit(&self, event: AuditEvent) {
        self.as_ref().emit(event);
    }
}

/// Writes audit events to the log. Rejections and failures go out at warn level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let tenant_id = event.tenant_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();
        let journey_id = event.journey_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();
        let case_id = event.case_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                tenant_id,
                journey_id,
                case_id,
                metadata = %metadata,
                "audit"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                tenant_id,
                journey_id,
                case_id,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    };
    use crate::domain::case::CaseId;
    use crate::domain::journey::{JourneyId, TenantId};

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("req-123", "workflow-engine")
            .for_journey(TenantId("tenant-a".to_owned()), JourneyId("claims".to_owned()))
            .for_case(CaseId("case-42".to_owned()));

        sink.emit(
            AuditEvent::new(
                &context,
                "gate.exit_allowed",
                AuditCategory::Gate,
                AuditOutcome::Success,
            )
            .with_metadata("state", "review"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].actor, "workflow-engine");
        assert_eq!(events[0].tenant_id.as_ref().map(|id| id.0.as_str()), Some("tenant-a"));
        assert_eq!(events[0].case_id.as_ref().map(|id| id.0.as_str()), Some("case-42"));
        assert_eq!(events[0].metadata.get("state").map(String::as_str), Some("review"));
    }

    #[test]
    fn context_without_scope_leaves_ids_empty() {
        let event = AuditEvent::new(
            &AuditContext::new("req-9", "cli"),
            "system.migrated",
            AuditCategory::System,
            AuditOutcome::Success,
        );

        assert!(event.tenant_id.is_none());
        assert!(event.journey_id.is_none());
        assert!(event.case_id.is_none());
    }

    #[test]
    fn shared_sink_collects_events_from_every_handle() {
        let sink = InMemoryAuditSink::default();
        let shared: Arc<dyn AuditSink> = Arc::new(sink.clone());

        shared.emit(AuditEvent::new(
            &AuditContext::generated("catalog"),
            "catalog.template_saved",
            AuditCategory::Catalog,
            AuditOutcome::Success,
        ));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Catalog);
        assert!(!events[0].correlation_id.is_empty());
    }
}
