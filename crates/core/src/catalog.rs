use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::car::{Car, CarId};

/// Case-insensitive attribute filters. Every supplied filter must match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarFeatures {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
}

impl CarFeatures {
    pub fn normalized(self) -> Self {
        Self {
            make: normalize(self.make),
            model: normalize(self.model),
            year: self.year,
            color: normalize(self.color),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.make.is_none() && self.model.is_none() && self.year.is_none() && self.color.is_none()
    }

    pub fn matches(&self, car: &Car) -> bool {
        let text_matches = |filter: &Option<String>, value: &str| {
            filter.as_deref().map_or(true, |wanted| value.eq_ignore_ascii_case(wanted))
        };

        text_matches(&self.make, &car.make)
            && text_matches(&self.model, &car.model)
            && self.year.map_or(true, |year| car.year == year)
            && text_matches(&self.color, &car.color)
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_lowercase()).filter(|value| !value.is_empty())
}

/// Catalog searches. Price bounds apply to the list price, not the negotiated one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogQuery {
    All,
    Features(CarFeatures),
    BelowPrice(Decimal),
    AbovePrice(Decimal),
    PriceRange { min: Decimal, max: Decimal },
    YearRange { start: i32, end: i32 },
}

impl CatalogQuery {
    pub fn matches(&self, car: &Car) -> bool {
        let price = car.terms.base_price;
        match self {
            Self::All => true,
            Self::Features(features) => features.matches(car),
            Self::BelowPrice(limit) => price < *limit,
            Self::AbovePrice(limit) => price > *limit,
            Self::PriceRange { min, max } => *min <= price && price <= *max,
            Self::YearRange { start, end } => *start <= car.year && car.year <= *end,
        }
    }

    /// What to tell the customer when a query matches nothing.
    pub fn empty_message(&self) -> &'static str {
        match self {
            Self::All => "No cars found.",
            Self::Features(_) => "No cars found with the specified feature.",
            Self::BelowPrice(_) => "No cars found below the specified price.",
            Self::AbovePrice(_) => "No cars found above the specified price.",
            Self::PriceRange { .. } => "No cars found within the specified price range.",
            Self::YearRange { .. } => "No cars found within the specified year range.",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait CarCatalog: Send + Sync {
    async fn find(&self, id: CarId) -> Result<Option<Car>, CatalogError>;
    /// Matching cars ordered by id.
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Car>, CatalogError>;
}
