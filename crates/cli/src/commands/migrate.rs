use crate::commands::{block_on, load_config, CommandResult};
use dialroute_db::{connect_with_config, migrations};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        block_on(async move {
            let pool = connect_with_config(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            let pending = migrations::pending_versions(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;
            pool.close().await;
            Ok(pending.len())
        })
    });

    match result {
        Ok(0) => CommandResult::success("migrate", "schema already up to date"),
        Ok(applied) => CommandResult::success("migrate", format!("applied {applied} pending migrations")),
        Err(error) => CommandResult::from_step("migrate", error),
    }
}
