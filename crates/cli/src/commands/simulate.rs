use std::path::Path;

use clap::ValueEnum;

use caseflow_core::audit::{AuditContext, TracingAuditSink};
use caseflow_core::domain::case::CaseSnapshot;
use caseflow_core::domain::journey::{JourneyId, TenantId};
use caseflow_core::domain::vendor::{SenderId, Vendor};
use caseflow_core::flows::automation::{InboundEvent, InboundEventKind};
use caseflow_core::flows::engine::WorkflowEngine;
use caseflow_core::keys::canonicalize;
use caseflow_db::repositories::{InMemoryVendorRepository, VendorRepository};
use caseflow_db::services::RepositoryVendorResolver;

use crate::commands::{
    load_app_config, load_journey_config, load_state_machine, refusal_message, runtime,
    CommandFailure, CommandResult,
};

const SIMULATED_TENANT: &str = "simulation";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EventKindArg {
    Text,
    Image,
    Location,
}

pub struct SimulateArgs<'a> {
    pub template: &'a Path,
    pub config: Option<&'a Path>,
    pub event: EventKindArg,
    pub sender: &'a str,
    pub body: &'a str,
    pub media: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub case_state: Option<&'a str>,
    pub known_vendor: bool,
}

/// Runs one inbound event through the automation rules without touching the database.
pub fn run(args: SimulateArgs<'_>) -> CommandResult {
    match simulate(&args) {
        Ok(result) => result,
        Err(failure) => CommandResult::from_failure("simulate", failure),
    }
}

fn simulate(args: &SimulateArgs<'_>) -> Result<CommandResult, CommandFailure> {
    let app_config = load_app_config()?;
    let machine = load_state_machine(args.template, app_config.catalog.min_states)?;
    let config = load_journey_config(args.config, &machine)?;

    let tenant_id = TenantId(SIMULATED_TENANT.to_string());
    let sender_id = SenderId(args.sender.to_string());
    let existing_case = match args.case_state {
        Some(raw) => {
            let state = canonicalize(raw);
            if !machine.contains(&state) {
                return Err((
                    "case_invalid",
                    format!("case state `{raw}` is not part of the journey"),
                    2,
                ));
            }
            Some(CaseSnapshot::open(
                tenant_id.clone(),
                JourneyId(SIMULATED_TENANT.to_string()),
                sender_id.clone(),
                state,
            ))
        }
        None => None,
    };

    let event = InboundEvent {
        tenant_id: tenant_id.clone(),
        sender_id: sender_id.clone(),
        kind: event_kind(args),
    };

    let audit = AuditContext::generated("cli");
    let decision = runtime()?.block_on(async {
        let vendors = InMemoryVendorRepository::default();
        if args.known_vendor {
            vendors
                .save(Vendor::from_sender(tenant_id, sender_id))
                .await
                .map_err(|error| ("vendor_setup", error.to_string(), 3u8))?;
        }
        let resolver = RepositoryVendorResolver::new(vendors);
        WorkflowEngine::new(&machine, &config)
            .decide_with_audit(
                &event,
                existing_case.as_ref(),
                &resolver,
                &TracingAuditSink,
                &audit,
            )
            .await
            .map_err(|error| ("automation", error.to_string(), 4u8))
    })?;

    let detail = serde_json::to_value(&decision)
        .map_err(|error| ("serialization", error.to_string(), 3u8))?;
    Ok(match decision.ensure_not_refused() {
        Ok(()) => CommandResult::success_with_detail(
            "simulate",
            format!("{} event decided as {}", event.kind.name(), decision.name()),
            detail,
        ),
        Err(refusal) => CommandResult::report(
            "simulate",
            "refused",
            refusal_message(refusal, &audit),
            Some(detail),
            1,
        ),
    })
}

fn event_kind(args: &SimulateArgs<'_>) -> InboundEventKind {
    match args.event {
        EventKindArg::Text => InboundEventKind::Text { body: args.body.to_string() },
        EventKindArg::Image => {
            InboundEventKind::Image { media_ref: args.media.to_string(), caption: None }
        }
        EventKindArg::Location => {
            InboundEventKind::Location { latitude: args.latitude, longitude: args.longitude }
        }
    }
}
