use anyhow::Result;
use async_trait::async_trait;
use rise_core::domain::car::CarId;
use rise_core::negotiation::{NegotiationDecision, NegotiationError, Negotiator};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{arguments, required_decimal, required_integer, Tool};

pub const CAR_NOT_FOUND: &str = "Car not found.";
pub const NEGOTIATION_DISABLED: &str = "Negotiation disabled for this car.";

/// Runs one negotiation round and reports it as a customer-facing sentence.
///
/// Decisions and the two terminal errors are plain strings. Storage and data failures come
/// back as `{"error": ...}` so the model can apologise instead of retrying the call.
pub struct NegotiatePriceTool {
    negotiator: Negotiator,
}

impl NegotiatePriceTool {
    pub fn new(negotiator: Negotiator) -> Self {
        Self { negotiator }
    }
}

#[async_trait]
impl Tool for NegotiatePriceTool {
    fn name(&self) -> &'static str {
        "negotiate_price"
    }

    fn description(&self) -> &'static str {
        "Negotiates the price of a car. Returns whether the offer was accepted or rejected, \
         the final offer, or a counter-offer with the next asking price."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "car_id": { "type": "integer", "description": "The id of the car" },
                "user_offer": { "type": "number", "description": "The customer's offer in dollars" },
            },
            "required": ["car_id", "user_offer"],
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args = arguments(&input)?;
        let car_id = CarId(required_integer(&args, "car_id")?);
        let offer = required_decimal(&args, "user_offer")?;

        match self.negotiator.negotiate(car_id, offer).await {
            Ok(decision) => {
                info!(
                    event_name = "agent.negotiation.decided",
                    car_id = car_id.0,
                    offer = %offer,
                    status = decision.status(),
                    "negotiation round completed"
                );
                Ok(Value::String(describe_decision(&decision)))
            }
            Err(NegotiationError::NotFound(_)) => Ok(Value::String(CAR_NOT_FOUND.to_string())),
            Err(NegotiationError::Disabled(_)) => {
                Ok(Value::String(NEGOTIATION_DISABLED.to_string()))
            }
            Err(error) => {
                warn!(
                    event_name = "agent.negotiation.failed",
                    car_id = car_id.0,
                    error = %error,
                    "negotiation failed"
                );
                Ok(json!({ "error": error.to_string() }))
            }
        }
    }
}

pub fn describe_decision(decision: &NegotiationDecision) -> String {
    match decision {
        NegotiationDecision::Accepted { price } => {
            format!("Negotiate accepted at {}", format_price(*price))
        }
        NegotiationDecision::Rejected { min_acceptable, .. } => format!(
            "Negotiate rejected: Offer too low. Minimum acceptable price is {}.",
            format_price(*min_acceptable)
        ),
        NegotiationDecision::FinalOffer { price } => {
            format!("Negotiate final offer: {}.", format_price(*price))
        }
        NegotiationDecision::CounterOffer { counter_price } => {
            format!("Negotiate counter offer: {}.", format_price(*counter_price))
        }
    }
}

fn format_price(price: Decimal) -> String {
    price.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rise_core::domain::car::NewCar;
    use rise_core::negotiation::{
        ConcessionPolicy, FixedJitter, NegotiationDecision, NegotiationError,
        NegotiationStore, Negotiator,
    };
    use rise_db::repositories::InMemoryCarRepository;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{describe_decision, NegotiatePriceTool};
    use crate::tools::Tool;

    struct BrokenStore;

    #[async_trait::async_trait]
    impl NegotiationStore for BrokenStore {
        async fn apply_offer(
            &self,
            _car_id: rise_core::CarId,
            _offer: Decimal,
            _policy: &ConcessionPolicy,
        ) -> Result<NegotiationDecision, NegotiationError> {
            Err(NegotiationError::Storage("database is locked".to_string()))
        }
    }

    fn listed(enabled: bool) -> NewCar {
        NewCar {
            make: "Toyota".to_string(),
            model: "Camry".to_string(),
            year: 2022,
            color: "White".to_string(),
            mileage: None,
            description: None,
            base_price: Decimal::new(50_000, 0),
            min_price: Decimal::new(42_000, 0),
            negotiation_enabled: enabled,
            negotiation_flexibility: Decimal::new(3, 1),
        }
    }

    async fn tool() -> NegotiatePriceTool {
        let repo = Arc::new(
            InMemoryCarRepository::with_cars(vec![listed(true), listed(false)]).await.expect("seed"),
        );
        let policy = ConcessionPolicy::new(Arc::new(FixedJitter::none()));
        NegotiatePriceTool::new(Negotiator::new(repo, policy))
    }

    #[tokio::test]
    async fn counter_then_accept_in_plain_sentences() {
        let tool = tool().await;

        let counter = tool.execute(json!({ "car_id": 1, "user_offer": 45000 })).await.expect("run");
        assert_eq!(counter, json!("Negotiate counter offer: 47600."));

        let accepted =
            tool.execute(json!({ "car_id": 1, "user_offer": 47600.5 })).await.expect("run");
        assert_eq!(accepted, json!("Negotiate accepted at 47600.5"));
    }

    #[tokio::test]
    async fn low_offer_reports_the_floor() {
        let output = tool().await.execute(json!({ "car_id": 1, "user_offer": 30000 })).await;
        assert_eq!(
            output.expect("run"),
            json!("Negotiate rejected: Offer too low. Minimum acceptable price is 42000.")
        );
    }

    #[tokio::test]
    async fn terminal_errors_are_plain_messages() {
        let tool = tool().await;

        let missing = tool.execute(json!({ "car_id": 99, "user_offer": 1 })).await.expect("run");
        let disabled = tool.execute(json!({ "car_id": 2, "user_offer": 49000 })).await.expect("run");

        assert_eq!(missing, json!("Car not found."));
        assert_eq!(disabled, json!("Negotiation disabled for this car."));
    }

    #[tokio::test]
    async fn storage_failures_become_error_objects() {
        let policy = ConcessionPolicy::new(Arc::new(FixedJitter::none()));
        let tool = NegotiatePriceTool::new(Negotiator::new(Arc::new(BrokenStore), policy));

        let output = tool.execute(json!({ "car_id": 1, "user_offer": 45000 })).await.expect("run");

        assert!(output["error"].as_str().is_some_and(|message| message.contains("locked")));
    }

    #[tokio::test]
    async fn bad_arguments_are_tool_errors() {
        let error = tool().await.execute(json!({ "car_id": "one" })).await.expect_err("bad input");
        assert!(error.to_string().contains("car_id"));
    }

    #[test]
    fn final_offer_sentence_names_the_floor() {
        let text = describe_decision(&NegotiationDecision::FinalOffer { price: Decimal::new(4_200_000, 2) });
        assert_eq!(text, "Negotiate final offer: 42000.");
    }
}
