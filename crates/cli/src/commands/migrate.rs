use caseflow_db::{connect_with_config, migrations};

use crate::commands::{
    load_app_config, record_system_event, runtime, CommandFailure, CommandResult,
};

pub fn run() -> CommandResult {
    let config = match load_app_config() {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), CommandFailure>(())
    });

    record_system_event("system.migrated", result.as_ref().err());
    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
