use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use caseflow_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use caseflow_core::domain::case::{CaseSnapshot, TaskCompletion};
use caseflow_core::domain::journey::{JourneyId, TenantId};
use caseflow_core::domain::vendor::SenderId;
use caseflow_core::flows::engine::{gate_audit_event, WorkflowEngine};
use caseflow_core::keys::canonicalize;

use crate::commands::{
    load_app_config, load_journey_config, load_state_machine, read_json_file, refusal_message,
    CommandFailure, CommandResult,
};

/// Case data read from a file; only what the exit gate looks at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseInput {
    state: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    task_completions: Vec<TaskCompletion>,
}

pub struct GateArgs<'a> {
    pub template: &'a Path,
    pub config: Option<&'a Path>,
    pub case: &'a Path,
    pub to: Option<&'a str>,
}

pub fn run(args: GateArgs<'_>) -> CommandResult {
    match evaluate(&args) {
        Ok(result) => result,
        Err(failure) => CommandResult::from_failure("gate", failure),
    }
}

fn evaluate(args: &GateArgs<'_>) -> Result<CommandResult, CommandFailure> {
    let app_config = load_app_config()?;
    let machine = load_state_machine(args.template, app_config.catalog.min_states)?;
    let config = load_journey_config(args.config, &machine)?;
    let input: CaseInput = read_json_file(args.case, "case")?;

    let state = canonicalize(&input.state);
    if !machine.contains(&state) {
        return Err((
            "case_invalid",
            format!("case state `{}` is not part of the journey", input.state),
            2,
        ));
    }

    let mut case = CaseSnapshot::open(
        TenantId("cli".to_string()),
        JourneyId("cli".to_string()),
        SenderId("cli".to_string()),
        state,
    );
    case.fields = input.fields;
    case.task_completions = input.task_completions;

    let engine = WorkflowEngine::new(&machine, &config);
    let verdict = match args.to {
        Some(to) => engine
            .check_transition(&case, to)
            .map_err(|error| ("transition_invalid", error.to_string(), 2u8))?,
        None => engine.check_exit(&case),
    };
    let audit = AuditContext::generated("cli");
    TracingAuditSink.emit(gate_audit_event(&audit, &verdict));

    let detail = serde_json::to_value(&verdict)
        .map_err(|error| ("serialization", error.to_string(), 3u8))?;
    Ok(match verdict.ensure_allowed() {
        Ok(()) => CommandResult::report(
            "gate",
            "ok",
            format!("case may leave `{}`", verdict.state),
            Some(detail),
            0,
        ),
        Err(refusal) => CommandResult::report(
            "gate",
            "blocked",
            refusal_message(refusal, &audit),
            Some(detail),
            1,
        ),
    })
}
