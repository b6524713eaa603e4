use std::sync::Arc;

use rand::Rng;
use rust_decimal::Decimal;

use super::{NegotiationDecision, NegotiationError, NegotiationTerms};
use crate::domain::car::CarId;

/// Share of a concession that jitter may take back, `0.1`.
pub const JITTER_SHARE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
/// Counter-offers are quoted in whole cents.
pub const PRICE_SCALE: u32 = 2;
pub const FLOOR_REJECTION_REASON: &str = "offer below floor";

const SAMPLE_RESOLUTION: i64 = 1_000_000;
const MAX_SAMPLE: Decimal = Decimal::from_parts(999_999, 0, 0, false, 6);

/// Source of the random fraction used to shrink a concession. Samples must lie in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> Decimal;
}

/// Uniform samples from the thread-local RNG at micro resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformJitter;

impl JitterSource for UniformJitter {
    fn sample(&self) -> Decimal {
        let draw = rand::thread_rng().gen_range(0..SAMPLE_RESOLUTION);
        Decimal::new(draw, 6)
    }
}

/// Always returns the same fraction. Values outside `[0, 1)` are clamped.
#[derive(Clone, Copy, Debug)]
pub struct FixedJitter(Decimal);

impl FixedJitter {
    pub fn new(fraction: Decimal) -> Self {
        Self(fraction.clamp(Decimal::ZERO, MAX_SAMPLE))
    }

    pub fn none() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn max() -> Self {
        Self(MAX_SAMPLE)
    }
}

impl JitterSource for FixedJitter {
    fn sample(&self) -> Decimal {
        self.0
    }
}

#[derive(Clone)]
pub struct ConcessionPolicy {
    jitter: Arc<dyn JitterSource>,
}

impl Default for ConcessionPolicy {
    fn default() -> Self {
        Self::new(Arc::new(UniformJitter))
    }
}

impl std::fmt::Debug for ConcessionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcessionPolicy").finish_non_exhaustive()
    }
}

impl ConcessionPolicy {
    pub fn new(jitter: Arc<dyn JitterSource>) -> Self {
        Self { jitter }
    }

    /// Checks the gate and the stored terms, then decides. Errors never carry a decision.
    pub fn evaluate(
        &self,
        car_id: CarId,
        terms: &NegotiationTerms,
        offer: Decimal,
    ) -> Result<NegotiationDecision, NegotiationError> {
        if !terms.enabled {
            return Err(NegotiationError::Disabled(car_id));
        }
        terms
            .validate()
            .map_err(|detail| NegotiationError::InvalidTerms { car_id, detail: detail.to_string() })?;

        Ok(self.decide(terms, offer))
    }

    /// Precedence: accept, floor rejection, final offer, counter-offer.
    pub fn decide(&self, terms: &NegotiationTerms, offer: Decimal) -> NegotiationDecision {
        let current = terms.asking_price();
        let floor = terms.min_price;

        if offer >= current {
            return NegotiationDecision::Accepted { price: offer };
        }
        if offer < floor {
            return NegotiationDecision::Rejected {
                reason: FLOOR_REJECTION_REASON.to_string(),
                min_acceptable: floor,
            };
        }
        if current <= floor {
            return NegotiationDecision::FinalOffer { price: floor };
        }

        let concession = (current - floor) * terms.flexibility;
        let raw_counter = current - concession;
        let sample = self.jitter.sample().clamp(Decimal::ZERO, MAX_SAMPLE);
        let jitter = concession * JITTER_SHARE * sample;

        let counter_price = (raw_counter - jitter).round_dp(PRICE_SCALE).max(floor).min(current);

        NegotiationDecision::CounterOffer { counter_price }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use super::{ConcessionPolicy, FixedJitter, JitterSource, UniformJitter};
    use crate::domain::car::CarId;
    use crate::negotiation::{NegotiationDecision, NegotiationError, NegotiationTerms};

    fn dollars(amount: i64) -> Decimal {
        Decimal::new(amount, 0)
    }

    fn terms(current: i64) -> NegotiationTerms {
        NegotiationTerms {
            base_price: dollars(50_000),
            min_price: dollars(42_000),
            current_price: Some(dollars(current)),
            enabled: true,
            flexibility: Decimal::new(3, 1),
        }
    }

    fn policy(jitter: FixedJitter) -> ConcessionPolicy {
        ConcessionPolicy::new(Arc::new(jitter))
    }

    fn counter(decision: NegotiationDecision) -> Decimal {
        match decision {
            NegotiationDecision::CounterOffer { counter_price } => counter_price,
            other => panic!("expected counter-offer, got {other:?}"),
        }
    }

    #[test]
    fn first_counter_from_list_price_stays_in_jitter_band() {
        let without_jitter = counter(policy(FixedJitter::none()).decide(&terms(50_000), dollars(45_000)));
        let with_max_jitter = counter(policy(FixedJitter::max()).decide(&terms(50_000), dollars(45_000)));

        assert_eq!(without_jitter, dollars(47_600));
        assert!(with_max_jitter >= dollars(47_360));
        assert!(with_max_jitter < dollars(47_600));
    }

    #[test]
    fn counter_from_reduced_price_uses_remaining_room() {
        let without_jitter = counter(policy(FixedJitter::none()).decide(&terms(48_000), dollars(46_000)));
        let half_jitter =
            counter(policy(FixedJitter::new(Decimal::new(5, 1))).decide(&terms(48_000), dollars(46_000)));

        assert_eq!(without_jitter, dollars(46_200));
        assert_eq!(half_jitter, dollars(46_110));
    }

    #[test]
    fn offer_at_depleted_floor_is_accepted_not_final() {
        let decision = policy(FixedJitter::none()).decide(&terms(42_000), dollars(42_000));
        assert_eq!(decision, NegotiationDecision::Accepted { price: dollars(42_000) });
    }

    #[test]
    fn offer_below_floor_is_rejected_with_minimum() {
        let decision = policy(FixedJitter::none()).decide(&terms(42_000), dollars(41_000));
        assert_eq!(
            decision,
            NegotiationDecision::Rejected {
                reason: "offer below floor".to_string(),
                min_acceptable: dollars(42_000),
            }
        );
    }

    #[test]
    fn acceptance_echoes_the_offer_even_above_asking_price() {
        let decision = policy(FixedJitter::none()).decide(&terms(48_000), dollars(49_500));
        assert_eq!(decision, NegotiationDecision::Accepted { price: dollars(49_500) });
    }

    #[test]
    fn depleted_terms_only_accept_or_reject() {
        let policy = policy(FixedJitter::none());
        let depleted = terms(42_000);

        for offer in [40_000, 41_999, 42_000, 42_001, 55_000] {
            let decision = policy.decide(&depleted, dollars(offer));
            if offer >= 42_000 {
                assert_eq!(decision, NegotiationDecision::Accepted { price: dollars(offer) });
            } else {
                assert!(matches!(decision, NegotiationDecision::Rejected { .. }));
            }
        }
    }

    #[test]
    fn jitter_never_pushes_counter_below_floor() {
        let mut near_floor = terms(43_000);
        near_floor.flexibility = Decimal::ONE;

        let decision = policy(FixedJitter::max()).decide(&near_floor, dollars(42_500));
        assert_eq!(counter(decision), dollars(42_000));
    }

    #[test]
    fn counter_is_rounded_to_cents() {
        let mut odd = terms(48_000);
        odd.flexibility = Decimal::new(333, 3);

        let price = counter(policy(FixedJitter::new(Decimal::new(123_457, 6))).decide(&odd, dollars(45_000)));
        assert_eq!(price.round_dp(2), price);
        assert!(price.scale() <= 2);
    }

    #[test]
    fn null_current_price_starts_at_base_price() {
        let mut fresh = terms(50_000);
        fresh.current_price = None;

        let price = counter(policy(FixedJitter::none()).decide(&fresh, dollars(45_000)));
        assert_eq!(price, dollars(47_600));
    }

    #[test]
    fn disabled_terms_fail_regardless_of_offer() {
        let mut disabled = terms(50_000);
        disabled.enabled = false;

        for offer in [0, 41_000, 45_000, 60_000] {
            let result = ConcessionPolicy::default().evaluate(CarId(3), &disabled, dollars(offer));
            assert_eq!(result, Err(NegotiationError::Disabled(CarId(3))));
        }
    }

    #[test]
    fn corrupt_terms_are_reported_before_deciding() {
        let mut corrupt = terms(50_000);
        corrupt.min_price = dollars(55_000);

        let result = ConcessionPolicy::default().evaluate(CarId(9), &corrupt, dollars(45_000));
        assert!(matches!(result, Err(NegotiationError::InvalidTerms { car_id: CarId(9), .. })));
    }

    #[test]
    fn repeated_counters_converge_monotonically_to_the_floor() {
        let policy = ConcessionPolicy::new(Arc::new(UniformJitter));
        let mut state = terms(50_000);

        for _ in 0..200 {
            let before = state.asking_price();
            match policy.decide(&state, dollars(42_000)) {
                NegotiationDecision::CounterOffer { counter_price } => {
                    assert!(counter_price <= before);
                    assert!(counter_price >= state.min_price);
                    state.current_price = Some(counter_price);
                    assert!(state.validate().is_ok());
                    if counter_price == before {
                        break;
                    }
                }
                NegotiationDecision::Accepted { price } => {
                    assert_eq!(price, dollars(42_000));
                    break;
                }
                other => panic!("unexpected decision {other:?}"),
            }
        }

        // Cent rounding can hold the asking price one cent above the floor.
        assert!(state.asking_price() - state.min_price <= Decimal::new(1, 2));
    }

    #[test]
    fn uniform_samples_stay_in_unit_interval() {
        let jitter = UniformJitter;
        for _ in 0..1_000 {
            let sample = jitter.sample();
            assert!(sample >= Decimal::ZERO && sample < Decimal::ONE);
        }
    }
}
