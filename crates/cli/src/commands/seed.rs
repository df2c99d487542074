use serde_json::json;

use crate::commands::{build_runtime, load_config, open_pool, CommandError, CommandResult};
use bushidage_db::{DemoSeedDataset, SeedResult, SqlApprovalRepository, VerificationResult};

async fn seed_and_verify(
    repository: &SqlApprovalRepository,
) -> Result<(SeedResult, VerificationResult), CommandError> {
    let seed_result = DemoSeedDataset::load(repository)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
    let verification = DemoSeedDataset::verify(repository)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), 5u8))?;
    Ok((seed_result, verification))
}

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let repository = SqlApprovalRepository::new(pool.clone());

        let outcome = seed_and_verify(&repository).await;
        pool.close().await;
        let (seed_result, verification) = outcome?;

        if !verification.all_present {
            let message = verification_message(&verification.failed_checks());
            return Err(("seed_verification", message, 5u8));
        }
        Ok(seed_result)
    });

    match result {
        Ok(seed_result) => {
            let lines: Vec<String> = seed_result
                .requests
                .iter()
                .map(|info| {
                    format!("  - {}: {} ({})", info.request_type, info.request_id, info.status)
                })
                .collect();
            let message = format!(
                "demo dataset ready ({} inserted):\n{}",
                seed_result.inserted_count(),
                lines.join("\n")
            );
            let data = json!({
                "inserted": seed_result.inserted_count(),
                "requests": seed_result.requests.iter().map(|info| json!({
                    "id": info.request_id,
                    "request_type": info.request_type,
                    "status": info.status,
                    "inserted": info.inserted,
                })).collect::<Vec<_>>(),
            });
            CommandResult::success_with_data("seed", message, Some(data))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo requests failed to load".to_string()
    } else {
        format!("demo seed verification failed for: {}", failed_checks.join(", "))
    }
}
