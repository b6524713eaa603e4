use std::str::FromStr;
use std::sync::Arc;

use rise_agent::tools::negotiation::describe_decision;
use rise_core::domain::car::CarId;
use rise_core::negotiation::{ConcessionPolicy, NegotiationError, Negotiator};
use rise_db::SqlCarRepository;
use rust_decimal::Decimal;

use crate::commands::{
    open_database, prepare, CommandResult, StepFailure, EXIT_INVALID_ARGUMENT,
    EXIT_NEGOTIATION_DISABLED, EXIT_NEGOTIATION_FAILED, EXIT_NOT_FOUND,
};

/// Runs one negotiation round against the configured database, as the agent would.
pub fn run(car_id: i64, offer: &str) -> CommandResult {
    let offer = match parse_offer(offer) {
        Ok(offer) => offer,
        Err(message) => {
            return CommandResult::failure(
                "negotiate",
                "invalid_argument",
                message,
                EXIT_INVALID_ARGUMENT,
            )
        }
    };

    let (config, runtime) = match prepare("negotiate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let negotiator = Negotiator::new(
            Arc::new(SqlCarRepository::new(pool.clone())),
            ConcessionPolicy::default(),
        );
        let outcome = negotiator.negotiate(CarId(car_id), offer).await.map_err(classify);
        pool.close().await;
        outcome
    });

    match result {
        Ok(decision) => CommandResult::success_with_data(
            "negotiate",
            describe_decision(&decision),
            serde_json::to_value(&decision).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("negotiate", error_class, message, exit_code)
        }
    }
}

fn parse_offer(raw: &str) -> Result<Decimal, String> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    let offer = Decimal::from_str(&cleaned).map_err(|_| format!("`{raw}` is not a valid offer"))?;
    if offer.is_sign_negative() {
        return Err(format!("offer must not be negative, got {offer}"));
    }
    Ok(offer)
}

fn classify(error: NegotiationError) -> StepFailure {
    let (class, code) = match &error {
        NegotiationError::NotFound(_) => ("not_found", EXIT_NOT_FOUND),
        NegotiationError::Disabled(_) => ("negotiation_disabled", EXIT_NEGOTIATION_DISABLED),
        NegotiationError::InvalidTerms { .. } | NegotiationError::Storage(_) => {
            ("negotiation_failed", EXIT_NEGOTIATION_FAILED)
        }
    };
    (class, error.to_string(), code)
}
