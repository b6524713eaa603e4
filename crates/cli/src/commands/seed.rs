use rise_db::{DemoInventory, SeedResult};

use crate::commands::{open_database, prepare, CommandResult, StepFailure, EXIT_SEED};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seeded = DemoInventory::load(&pool, config.negotiation.default_flexibility)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))?;
        let verification = DemoInventory::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))?;

        let outcome: Result<SeedResult, StepFailure> = if verification.all_present {
            Ok(seeded)
        } else {
            let failed: Vec<&str> = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect();
            Err(("seed_verification", verification_message(&failed), EXIT_SEED))
        };

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", seed_message(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    if seeded.cars_seeded.is_empty() {
        return format!(
            "demo inventory already present ({} cars in catalog)",
            seeded.skipped_existing
        );
    }

    let lines: Vec<String> =
        seeded.cars_seeded.iter().map(|car| format!("  - #{}: {}", car.id, car.label)).collect();
    format!("demo inventory loaded ({} cars):\n{}", seeded.cars_seeded.len(), lines.join("\n"))
}

fn verification_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "demo inventory failed verification".to_string()
    } else {
        format!("demo inventory verification failed for: {}", failed.join(", "))
    }
}
