pub mod config;
pub mod gate;
pub mod key;
pub mod migrate;
pub mod seed;
pub mod simulate;

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use caseflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use caseflow_core::config::{AppConfig, LoadOptions};
use caseflow_core::domain::journey::StateMachine;
use caseflow_core::errors::{ApplicationError, DomainError};
use caseflow_core::flows::states::{validate_for_catalog, StateMachineBuilder};
use caseflow_core::journey_config::JourneyConfig;
use caseflow_db::services::TemplateDraft;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
}

/// Error triple shared by commands: class, message, exit code.
pub(crate) type CommandFailure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::report(command, "ok", message, None, 0)
    }

    pub fn success_with_detail(command: &str, message: impl Into<String>, detail: Value) -> Self {
        Self::report(command, "ok", message, Some(detail), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            detail: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn report(
        command: &str,
        status: &str,
        message: impl Into<String>,
        detail: Option<Value>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class: None,
            message: message.into(),
            detail,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(
        command: &str,
        (error_class, message, exit_code): CommandFailure,
    ) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_app_config() -> Result<AppConfig, CommandFailure> {
    AppConfig::load(LoadOptions::default())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn read_json_file<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<T, CommandFailure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ("input_unreadable", format!("cannot read {what} `{}`: {error}", path.display()), 2u8)
    })?;
    serde_json::from_str(&raw).map_err(|error| {
        ("input_invalid", format!("{what} `{}` is not valid: {error}", path.display()), 2)
    })
}

/// Reads a template draft and builds the state machine the catalog would store.
pub(crate) fn load_state_machine(
    path: &Path,
    min_states: usize,
) -> Result<StateMachine, CommandFailure> {
    let draft: TemplateDraft = read_json_file(path, "template")?;
    let machine = StateMachineBuilder::from_labels(&draft.states, &draft.default_state).build();
    validate_for_catalog(&machine, min_states)
        .map_err(|error| ("template_invalid", error.to_string(), 2u8))?;
    Ok(machine)
}

/// Reads a journey configuration document. Without a path the defaults apply.
pub(crate) fn load_journey_config(
    path: Option<&Path>,
    machine: &StateMachine,
) -> Result<JourneyConfig, CommandFailure> {
    let Some(path) = path else {
        return Ok(JourneyConfig::default());
    };
    let document: Value = read_json_file(path, "journey config")?;
    let config = JourneyConfig::from_document(document)
        .map_err(|error| ("config_invalid", error.to_string(), 2u8))?;

    if let Some(reference) = config.unknown_state_references(machine).into_iter().next() {
        return Err((
            "config_invalid",
            format!("`{}` points at unknown state `{}`", reference.path, reference.state),
            2,
        ));
    }
    Ok(config)
}

/// Operator-facing text for a validation refusal, naming what has to change.
pub(crate) fn refusal_message(error: DomainError, audit: &AuditContext) -> String {
    ApplicationError::from(error).into_interface(audit.correlation_id.clone()).user_message()
}

/// Audit record for maintenance commands that touch the database.
pub(crate) fn record_system_event(event_type: &str, failure: Option<&CommandFailure>) {
    let context = AuditContext::generated("cli");
    let event = match failure {
        None => AuditEvent::new(&context, event_type, AuditCategory::System, AuditOutcome::Success),
        Some((error_class, message, _)) => {
            AuditEvent::new(&context, event_type, AuditCategory::System, AuditOutcome::Failed)
                .with_metadata("error_class", *error_class)
                .with_metadata("error", message.clone())
        }
    };
    TracingAuditSink.emit(event);
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CommandFailure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            ("runtime_init", format!("failed to initialize async runtime: {error}"), 3)
        })
}
