//! Price negotiation over catalog cars.
//!
//! `policy` holds the pure decision function. Persistence happens behind
//! [`NegotiationStore`], which must load terms, decide, and write a counter-offer as one
//! atomic unit so that concurrent offers on the same car serialize.

pub mod policy;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::car::CarId;

pub use policy::{ConcessionPolicy, FixedJitter, JitterSource, UniformJitter};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationTerms {
    pub base_price: Decimal,
    pub min_price: Decimal,
    /// `None` until the first counter-offer; read as `base_price`.
    pub current_price: Option<Decimal>,
    pub enabled: bool,
    pub flexibility: Decimal,
}

impl NegotiationTerms {
    pub fn asking_price(&self) -> Decimal {
        self.current_price.unwrap_or(self.base_price)
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.min_price <= Decimal::ZERO {
            return Err("min_price must be positive");
        }
        if self.min_price > self.base_price {
            return Err("min_price must not exceed base_price");
        }
        let asking = self.asking_price();
        if asking < self.min_price || asking > self.base_price {
            return Err("current_price must lie between min_price and base_price");
        }
        if self.flexibility <= Decimal::ZERO || self.flexibility > Decimal::ONE {
            return Err("negotiation_flexibility must be in (0, 1]");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NegotiationDecision {
    Accepted { price: Decimal },
    Rejected { reason: String, min_acceptable: Decimal },
    FinalOffer { price: Decimal },
    CounterOffer { counter_price: Decimal },
}

impl NegotiationDecision {
    /// The new asking price this decision persists, if any.
    pub fn counter_price(&self) -> Option<Decimal> {
        match self {
            Self::CounterOffer { counter_price } => Some(*counter_price),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Rejected { .. } => "rejected",
            Self::FinalOffer { .. } => "final_offer",
            Self::CounterOffer { .. } => "counter_offer",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("car {0} not found")]
    NotFound(CarId),
    #[error("negotiation disabled for car {0}")]
    Disabled(CarId),
    #[error("car {car_id} has invalid negotiation terms: {detail}")]
    InvalidTerms { car_id: CarId, detail: String },
    #[error("negotiation storage failure: {0}")]
    Storage(String),
}

impl NegotiationError {
    /// Conversation-visible outcomes as opposed to system failures.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Disabled(_))
    }
}

#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// Loads the car's terms, asks `policy` for a decision, and persists a counter-offer
    /// before returning it. Nothing is written unless the decision is a counter-offer,
    /// and a failure leaves the stored price untouched.
    async fn apply_offer(
        &self,
        car_id: CarId,
        offer: Decimal,
        policy: &ConcessionPolicy,
    ) -> Result<NegotiationDecision, NegotiationError>;
}

#[derive(Clone)]
pub struct Negotiator {
    store: Arc<dyn NegotiationStore>,
    policy: ConcessionPolicy,
}

impl Negotiator {
    pub fn new(store: Arc<dyn NegotiationStore>, policy: ConcessionPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn negotiate(
        &self,
        car_id: CarId,
        offer: Decimal,
    ) -> Result<NegotiationDecision, NegotiationError> {
        self.store.apply_offer(car_id, offer, &self.policy).await
    }
}
