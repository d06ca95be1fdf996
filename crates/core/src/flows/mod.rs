pub mod automation;
pub mod engine;
pub mod gates;
pub mod states;

pub use automation::{
    AutomationDecision, AutomationEvaluator, AutomationRefusal, FollowUp, IgnoreReason,
    InboundEvent, InboundEventKind, VendorLink, VendorResolver,
};
pub use engine::{gate_audit_event, WorkflowEngine};
pub use gates::{can_leave_state, GateVerdict, IncompleteTask, TaskBlockReason};
pub use states::{validate_for_catalog, StateMachineBuilder, SEED_STATE};
