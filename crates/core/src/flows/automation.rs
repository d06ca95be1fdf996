//! Maps inbound channel events onto case creation or case transition decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::case::{CaseId, CaseSnapshot};
use crate::domain::journey::{StateMachine, TenantId};
use crate::domain::vendor::{SenderId, Vendor, VendorId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::gates::{can_leave_state, GateVerdict};
use crate::journey_config::JourneyConfig;

/// Lookup and optional creation of the actor behind a sender. Owned by the caller.
#[async_trait]
pub trait VendorResolver: Send + Sync {
    async fn resolve(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Option<Vendor>, ApplicationError>;

    async fn create_from_sender(
        &self,
        tenant_id: &TenantId,
        sender_id: &SenderId,
    ) -> Result<Vendor, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub tenant_id: TenantId,
    pub sender_id: SenderId,
    pub kind: InboundEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEventKind {
    Text { body: String },
    Image { media_ref: String, caption: Option<String> },
    Location { latitude: f64, longitude: f64 },
}

impl InboundEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Location { .. } => "location",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorLink {
    pub vendor_id: VendorId,
    pub created: bool,
}

/// Side work the case-management caller should perform along with the decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FollowUp {
    SeedDefaultPendencies,
    RunOcr { provider: String },
    AssignResponsible { actor_id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    TextCaseCreationDisabled,
    LocationCaseCreationDisabled,
    JourneyDisabled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationRefusal {
    /// A vendor is required, none exists and auto-creation is off.
    VendorUnresolved { sender_id: SenderId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AutomationDecision {
    CreateCase { initial_state: String, vendor: Option<VendorLink>, follow_ups: Vec<FollowUp> },
    AttachToCase { case_id: CaseId, follow_ups: Vec<FollowUp> },
    /// Commit only when `gate.allowed`; the gate was evaluated on `from`.
    RequestTransition {
        case_id: CaseId,
        from: String,
        to: String,
        gate: GateVerdict,
        follow_ups: Vec<FollowUp>,
    },
    Ignored { reason: IgnoreReason },
    Refused { refusal: AutomationRefusal },
}

impl AutomationDecision {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateCase { .. } => "create_case",
            Self::AttachToCase { .. } => "attach_to_case",
            Self::RequestTransition { .. } => "request_transition",
            Self::Ignored { .. } => "ignored",
            Self::Refused { .. } => "refused",
        }
    }

    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }

    /// Converts a refusal into the domain error that names the failed precondition.
    pub fn ensure_not_refused(&self) -> Result<(), DomainError> {
        match self {
            Self::Refused { refusal: AutomationRefusal::VendorUnresolved { sender_id } } => {
                Err(DomainError::VendorRequired { sender_id: sender_id.0.clone() })
            }
            _ => Ok(()),
        }
    }

    pub fn follow_ups(&self) -> &[FollowUp] {
        match self {
            Self::CreateCase { follow_ups, .. }
            | Self::AttachToCase { follow_ups, .. }
            | Self::RequestTransition { follow_ups, .. } => follow_ups,
            Self::Ignored { .. } | Self::Refused { .. } => &[],
        }
    }
}

/// Evaluates one journey's automation rules. Configuration is passed in, never fetched.
#[derive(Clone, Copy, Debug)]
pub struct AutomationEvaluator<'a> {
    machine: &'a StateMachine,
    config: &'a JourneyConfig,
}

impl<'a> AutomationEvaluator<'a> {
    pub fn new(machine: &'a StateMachine, config: &'a JourneyConfig) -> Self {
        Self { machine, config }
    }

    /// Total over event kind x existing case. Only vendor store failures are errors;
    /// business refusals come back as [`AutomationDecision::Refused`].
    pub async fn decide<R>(
        &self,
        event: &InboundEvent,
        existing_case: Option<&CaseSnapshot>,
        vendors: &R,
    ) -> Result<AutomationDecision, ApplicationError>
    where
        R: VendorResolver + ?Sized,
    {
        let automation = &self.config.automation;

        let decision = match (&event.kind, existing_case) {
            (InboundEventKind::Text { .. }, Some(case)) => AutomationDecision::AttachToCase {
                case_id: case.id.clone(),
                follow_ups: Vec::new(),
            },
            (InboundEventKind::Text { .. }, None) => {
                if !automation.on_text.create_case {
                    AutomationDecision::Ignored { reason: IgnoreReason::TextCaseCreationDisabled }
                } else {
                    self.create_case(event, &automation.on_text.initial_state, Vec::new(), vendors)
                        .await?
                }
            }
            (InboundEventKind::Image { .. }, Some(case)) => AutomationDecision::AttachToCase {
                case_id: case.id.clone(),
                follow_ups: self.ocr_follow_up().into_iter().collect(),
            },
            (InboundEventKind::Image { .. }, None) => {
                let mut follow_ups = Vec::new();
                if automation.on_image.create_default_pendencies {
                    follow_ups.push(FollowUp::SeedDefaultPendencies);
                }
                follow_ups.extend(self.ocr_follow_up());
                self.create_case(event, &automation.on_image.initial_state, follow_ups, vendors)
                    .await?
            }
            (InboundEventKind::Location { .. }, Some(case)) => self.advance_on_location(case),
            (InboundEventKind::Location { .. }, None) => {
                if !automation.on_location.create_case {
                    AutomationDecision::Ignored {
                        reason: IgnoreReason::LocationCaseCreationDisabled,
                    }
                } else {
                    self.create_case(
                        event,
                        &automation.on_location.initial_state,
                        Vec::new(),
                        vendors,
                    )
                    .await?
                }
            }
        };

        log_decision(event, existing_case, &decision);
        Ok(decision)
    }

    async fn create_case<R>(
        &self,
        event: &InboundEvent,
        requested_state: &str,
        mut follow_ups: Vec<FollowUp>,
        vendors: &R,
    ) -> Result<AutomationDecision, ApplicationError>
    where
        R: VendorResolver + ?Sized,
    {
        let policy = &self.config.automation.conversations;
        let vendor = self.resolve_vendor(event, vendors).await?;

        if vendor.is_none() && policy.require_vendor {
            return Ok(AutomationDecision::Refused {
                refusal: AutomationRefusal::VendorUnresolved { sender_id: event.sender_id.clone() },
            });
        }

        let initial_state = self.machine.resolve_state_or_default(requested_state).to_string();
        follow_ups.extend(self.responsible_follow_up(&initial_state));

        Ok(AutomationDecision::CreateCase { initial_state, vendor, follow_ups })
    }

    async fn resolve_vendor<R>(
        &self,
        event: &InboundEvent,
        vendors: &R,
    ) -> Result<Option<VendorLink>, ApplicationError>
    where
        R: VendorResolver + ?Sized,
    {
        if let Some(vendor) = vendors.resolve(&event.tenant_id, &event.sender_id).await? {
            return Ok(Some(VendorLink { vendor_id: vendor.id, created: false }));
        }

        if !self.config.automation.conversations.auto_create_vendor {
            return Ok(None);
        }

        let vendor = vendors.create_from_sender(&event.tenant_id, &event.sender_id).await?;
        info!(
            event_name = "automation.vendor_created",
            tenant_id = %event.tenant_id.0,
            sender_id = %event.sender_id.0,
            vendor_id = %vendor.id.0,
            "created vendor on first contact"
        );
        Ok(Some(VendorLink { vendor_id: vendor.id, created: true }))
    }

    fn advance_on_location(&self, case: &CaseSnapshot) -> AutomationDecision {
        let attach = || AutomationDecision::AttachToCase {
            case_id: case.id.clone(),
            follow_ups: Vec::new(),
        };

        let next_state = &self.config.automation.on_location.next_state;
        if next_state.is_empty() || *next_state == case.state {
            return attach();
        }
        if !self.machine.contains(next_state) {
            warn!(
                event_name = "automation.next_state_unknown",
                case_id = %case.id.0,
                next_state = %next_state,
                "onLocation.nextState is not part of the journey; leaving case in place"
            );
            return attach();
        }

        let gate = can_leave_state(&case.state, self.config.status_config(&case.state), case);
        AutomationDecision::RequestTransition {
            case_id: case.id.clone(),
            from: case.state.clone(),
            to: next_state.clone(),
            gate,
            follow_ups: self.responsible_follow_up(next_state).into_iter().collect(),
        }
    }

    fn ocr_follow_up(&self) -> Option<FollowUp> {
        let ocr = &self.config.automation.ocr;
        (ocr.enabled && !ocr.provider.is_empty())
            .then(|| FollowUp::RunOcr { provider: ocr.provider.clone() })
    }

    fn responsible_follow_up(&self, state: &str) -> Option<FollowUp> {
        self.config
            .status_config(state)
            .and_then(|status_config| status_config.responsible_id.clone())
            .map(|actor_id| FollowUp::AssignResponsible { actor_id })
    }
}

fn log_decision(
    event: &InboundEvent,
    existing_case: Option<&CaseSnapshot>,
    decision: &AutomationDecision,
) {
    let case_id = existing_case.map(|case| case.id.0.as_str()).unwrap_or("none");
    match decision {
        AutomationDecision::Refused { .. } => warn!(
            event_name = "automation.decision.refused",
            tenant_id = %event.tenant_id.0,
            sender_id = %event.sender_id.0,
            event_kind = event.kind.name(),
            "vendor required but unresolved; event not turned into a case"
        ),
        AutomationDecision::Ignored { reason } => debug!(
            event_name = "automation.decision.ignored",
            tenant_id = %event.tenant_id.0,
            sender_id = %event.sender_id.0,
            event_kind = event.kind.name(),
            reason = ?reason,
            "automation rule does not open a case for this event"
        ),
        other => info!(
            event_name = "automation.decision",
            decision = other.name(),
            tenant_id = %event.tenant_id.0,
            sender_id = %event.sender_id.0,
            case_id = case_id,
            event_kind = event.kind.name(),
            "automation decision reached"
        ),
    }
}
