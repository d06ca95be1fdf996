pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod journey_config;
pub mod keys;

pub use domain::case::{CaseId, CaseSnapshot, TaskCompletion};
pub use domain::journey::{JourneyId, JourneyTemplate, StateMachine, TenantId, TenantJourney};
pub use domain::vendor::{SenderId, Vendor, VendorId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    can_leave_state, AutomationDecision, AutomationEvaluator, GateVerdict, InboundEvent,
    InboundEventKind, StateMachineBuilder, VendorResolver, WorkflowEngine,
};
pub use journey_config::{JourneyConfig, MandatoryTask, StatusConfig};
