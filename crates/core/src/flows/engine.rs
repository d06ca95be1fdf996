use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::case::CaseSnapshot;
use crate::domain::journey::StateMachine;
use crate::errors::{ApplicationError, DomainError};
use crate::flows::automation::{
    AutomationDecision, AutomationEvaluator, InboundEvent, VendorResolver,
};
use crate::flows::gates::{can_leave_state, GateVerdict};
use crate::journey_config::JourneyConfig;
use crate::keys::canonicalize;

/// One journey's state machine and tenant configuration, bound together for evaluation.
#[derive(Clone, Copy, Debug)]
pub struct WorkflowEngine<'a> {
    machine: &'a StateMachine,
    config: &'a JourneyConfig,
}

impl<'a> WorkflowEngine<'a> {
    pub fn new(machine: &'a StateMachine, config: &'a JourneyConfig) -> Self {
        Self { machine, config }
    }

    pub fn machine(&self) -> &'a StateMachine {
        self.machine
    }

    pub fn config(&self) -> &'a JourneyConfig {
        self.config
    }

    pub fn initial_state(&self) -> &'a str {
        &self.machine.default_state
    }

    pub fn check_exit(&self, case: &CaseSnapshot) -> GateVerdict {
        can_leave_state(&case.state, self.config.status_config(&case.state), case)
    }

    pub fn check_exit_with_audit<S>(
        &self,
        case: &CaseSnapshot,
        sink: &S,
        audit: &AuditContext,
    ) -> GateVerdict
    where
        S: AuditSink + ?Sized,
    {
        let verdict = self.check_exit(case);
        sink.emit(gate_audit_event(audit, &verdict));
        verdict
    }

    /// Gate verdict for moving `case` to `to`. The target must belong to the journey;
    /// whether the move is allowed depends only on the state being left.
    pub fn check_transition(
        &self,
        case: &CaseSnapshot,
        to: &str,
    ) -> Result<GateVerdict, DomainError> {
        let target = canonicalize(to);
        if !self.machine.contains(&target) {
            return Err(DomainError::UnknownState { state: target });
        }
        Ok(self.check_exit(case))
    }

    pub async fn decide<R>(
        &self,
        event: &InboundEvent,
        existing_case: Option<&CaseSnapshot>,
        vendors: &R,
    ) -> Result<AutomationDecision, ApplicationError>
    where
        R: VendorResolver + ?Sized,
    {
        AutomationEvaluator::new(self.machine, self.config)
            .decide(event, existing_case, vendors)
            .await
    }

    pub async fn decide_with_audit<R, S>(
        &self,
        event: &InboundEvent,
        existing_case: Option<&CaseSnapshot>,
        vendors: &R,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<AutomationDecision, ApplicationError>
    where
        R: VendorResolver + ?Sized,
        S: AuditSink + ?Sized,
    {
        let result = self.decide(event, existing_case, vendors).await;
        match &result {
            Ok(decision) => {
                let (event_type, outcome) = if decision.is_refusal() {
                    ("automation.refused", AuditOutcome::Rejected)
                } else {
                    ("automation.decided", AuditOutcome::Success)
                };
                sink.emit(
                    AuditEvent::new(audit, event_type, AuditCategory::Automation, outcome)
                        .with_metadata("decision", decision.name())
                        .with_metadata("event_kind", event.kind.name())
                        .with_metadata("sender_id", event.sender_id.0.clone()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "automation.failed",
                        AuditCategory::Automation,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

/// Audit record for a gate verdict; blocked verdicts name what is still missing.
pub fn gate_audit_event(audit: &AuditContext, verdict: &GateVerdict) -> AuditEvent {
    if verdict.allowed {
        return AuditEvent::new(
            audit,
            "gate.exit_allowed",
            AuditCategory::Gate,
            AuditOutcome::Success,
        )
        .with_metadata("state", verdict.state.clone());
    }

    AuditEvent::new(audit, "gate.exit_blocked", AuditCategory::Gate, AuditOutcome::Rejected)
        .with_metadata("state", verdict.state.clone())
        .with_metadata("missing_fields", verdict.missing_fields.join(","))
        .with_metadata(
            "incomplete_tasks",
            verdict
                .incomplete_tasks
                .iter()
                .map(|task| task.task_id.as_str())
                .collect::<Vec<_>>()
                .join(","),
        )
}
