use crate::commands::{block_on, load_config, CommandResult};
use dialroute_db::{connect_with_config, migrations, RoutingSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let result = load_config().and_then(|config| {
        block_on(async move {
            let pool = connect_with_config(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

            migrations::run_pending(&pool)
                .await
                .map_err(|error| ("migration", error.to_string(), 5u8))?;

            let seeded = RoutingSeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

            let verification = RoutingSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            pool.close().await;
            if verification.all_present {
                Ok(seeded)
            } else {
                let failed = verification.failed_checks().collect::<Vec<_>>();
                Err(("seed_verification", verification_message(&failed), 6u8))
            }
        })
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(error) => CommandResult::from_step("seed", error),
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded for organization {} domain `{}`: {} routing rules, {} awaiting types, {} schedules",
        seeded.organization_id,
        seeded.domain,
        seeded.routing_configs,
        seeded.awaiting_types,
        seeded.schedules
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(&["menu_option", "entity-demo"]),
            "seed verification failed for checks: menu_option, entity-demo"
        );
    }

    #[test]
    fn verification_message_falls_back_to_generic_text() {
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }
}
