use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::negotiation::NegotiationTerms;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CarId(pub i64);

impl fmt::Display for CarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog vehicle together with its negotiation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: Option<i64>,
    pub description: Option<String>,
    pub terms: NegotiationTerms,
}

/// Fields required to register a car in the catalog. The asking price starts at the
/// base price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCar {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: Option<i64>,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub min_price: Decimal,
    pub negotiation_enabled: bool,
    pub negotiation_flexibility: Decimal,
}

impl NewCar {
    pub fn terms(&self) -> NegotiationTerms {
        NegotiationTerms {
            base_price: self.base_price,
            min_price: self.min_price,
            current_price: None,
            enabled: self.negotiation_enabled,
            flexibility: self.negotiation_flexibility,
        }
    }
}

/// Customer-facing view of a car. The price floor and concession speed stay private.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarListing {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: Option<i64>,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub asking_price: Decimal,
    pub negotiable: bool,
}

impl From<&Car> for CarListing {
    fn from(car: &Car) -> Self {
        Self {
            id: car.id.0,
            make: car.make.clone(),
            model: car.model.clone(),
            year: car.year,
            color: car.color.clone(),
            mileage: car.mileage,
            description: car.description.clone(),
            base_price: car.terms.base_price,
            asking_price: car.terms.asking_price(),
            negotiable: car.terms.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Car, CarId, CarListing};
    use crate::negotiation::NegotiationTerms;

    #[test]
    fn listing_hides_floor_and_flexibility() {
        let car = Car {
            id: CarId(7),
            make: "toyota".to_string(),
            model: "corolla".to_string(),
            year: 2021,
            color: "white".to_string(),
            mileage: Some(31_000),
            description: None,
            terms: NegotiationTerms {
                base_price: Decimal::new(50_000, 0),
                min_price: Decimal::new(42_000, 0),
                current_price: Some(Decimal::new(4_760_000, 2)),
                enabled: true,
                flexibility: Decimal::new(3, 1),
            },
        };

        let listing = CarListing::from(&car);
        let json = serde_json::to_value(&listing).expect("serialize listing");

        assert_eq!(listing.asking_price, Decimal::new(4_760_000, 2));
        assert!(json.get("min_price").is_none());
        assert!(json.get("flexibility").is_none());
        assert_eq!(json["id"], 7);
    }
}
