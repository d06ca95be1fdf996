use serde_json::json;

use caseflow_db::{connect_with_config, migrations, DemoCatalog};

use crate::commands::{
    load_app_config, record_system_event, runtime, CommandFailure, CommandResult,
};

pub fn run() -> CommandResult {
    let config = match load_app_config() {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return CommandResult::from_failure("seed", failure),
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoCatalog::load(&pool, config.catalog.min_states)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoCatalog::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<_, CommandFailure> = if verification.all_present {
            Ok(seed_result)
        } else {
            Err(("seed_verification", verification_failure_message(&verification.checks), 6u8))
        };
        pool.close().await;
        run_result
    });

    record_system_event("system.seeded", result.as_ref().err());
    match result {
        Ok(seeded) => {
            let journeys = seeded
                .journeys_seeded
                .iter()
                .map(|journey| {
                    json!({
                        "key": journey.key,
                        "journey_id": journey.journey_id,
                        "states": journey.states,
                    })
                })
                .collect::<Vec<_>>();
            CommandResult::success_with_detail(
                "seed",
                format!(
                    "demo catalog loaded for {} ({} journeys)",
                    seeded.tenant_id,
                    seeded.journeys_seeded.len()
                ),
                json!({
                    "tenant_id": seeded.tenant_id,
                    "journeys": journeys,
                    "case_opened": seeded.case_opened,
                }),
            )
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
