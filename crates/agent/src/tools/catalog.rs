use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rise_core::catalog::{CarCatalog, CarFeatures, CatalogQuery};
use rise_core::domain::car::CarListing;
use serde_json::{json, Map, Value};

use super::{arguments, optional_text, optional_year, required_decimal, required_year, Tool};

/// The catalog searches offered to the model, one tool each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogSearch {
    All,
    ByFeature,
    BelowPrice,
    AbovePrice,
    PriceRange,
    YearRange,
}

impl CatalogSearch {
    pub const ALL: [CatalogSearch; 6] = [
        Self::All,
        Self::ByFeature,
        Self::BelowPrice,
        Self::AbovePrice,
        Self::PriceRange,
        Self::YearRange,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::All => "get_all_cars",
            Self::ByFeature => "get_cars_by_feature",
            Self::BelowPrice => "get_car_by_lower_price",
            Self::AbovePrice => "get_car_by_higher_price",
            Self::PriceRange => "get_car_by_price_range",
            Self::YearRange => "get_car_by_year_range",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::All => "Lists every car in the showroom.",
            Self::ByFeature => {
                "Finds cars matching make, model, year and color. Every given filter must \
                 match; with no filters all cars are returned."
            }
            Self::BelowPrice => "Finds cars listed below the given price.",
            Self::AbovePrice => "Finds cars listed above the given price.",
            Self::PriceRange => "Finds cars listed between min_price and max_price, inclusive.",
            Self::YearRange => "Finds cars built between start_year and end_year, inclusive.",
        }
    }

    fn parameters(self) -> Value {
        let properties = match self {
            Self::All => json!({}),
            Self::ByFeature => json!({
                "make": { "type": "string", "description": "The make of the car" },
                "model": { "type": "string", "description": "The model of the car" },
                "year": { "type": "integer", "description": "The year of the car" },
                "color": { "type": "string", "description": "The color of the car" },
            }),
            Self::BelowPrice | Self::AbovePrice => json!({
                "price": { "type": "number", "description": "Price limit in dollars" },
            }),
            Self::PriceRange => json!({
                "min_price": { "type": "number" },
                "max_price": { "type": "number" },
            }),
            Self::YearRange => json!({
                "start_year": { "type": "integer" },
                "end_year": { "type": "integer" },
            }),
        };
        let required: Vec<&str> = match self {
            Self::All | Self::ByFeature => Vec::new(),
            Self::BelowPrice | Self::AbovePrice => vec!["price"],
            Self::PriceRange => vec!["min_price", "max_price"],
            Self::YearRange => vec!["start_year", "end_year"],
        };

        json!({ "type": "object", "properties": properties, "required": required })
    }

    fn query(self, args: &Map<String, Value>) -> Result<CatalogQuery> {
        Ok(match self {
            Self::All => CatalogQuery::All,
            Self::ByFeature => {
                let features = CarFeatures {
                    make: optional_text(args, "make")?,
                    model: optional_text(args, "model")?,
                    year: optional_year(args, "year")?,
                    color: optional_text(args, "color")?,
                }
                .normalized();
                if features.is_empty() {
                    CatalogQuery::All
                } else {
                    CatalogQuery::Features(features)
                }
            }
            Self::BelowPrice => CatalogQuery::BelowPrice(required_decimal(args, "price")?),
            Self::AbovePrice => CatalogQuery::AbovePrice(required_decimal(args, "price")?),
            Self::PriceRange => CatalogQuery::PriceRange {
                min: required_decimal(args, "min_price")?,
                max: required_decimal(args, "max_price")?,
            },
            Self::YearRange => CatalogQuery::YearRange {
                start: required_year(args, "start_year")?,
                end: required_year(args, "end_year")?,
            },
        })
    }

    fn empty_message(self, query: &CatalogQuery) -> &'static str {
        match self {
            // An unfiltered feature search still reports against the feature filter.
            Self::ByFeature => "No cars found with the specified feature.",
            _ => query.empty_message(),
        }
    }
}

/// Returns listings as a JSON array, or a plain message when nothing matches.
pub struct CatalogSearchTool {
    search: CatalogSearch,
    catalog: Arc<dyn CarCatalog>,
}

impl CatalogSearchTool {
    pub fn new(search: CatalogSearch, catalog: Arc<dyn CarCatalog>) -> Self {
        Self { search, catalog }
    }
}

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &'static str {
        self.search.name()
    }

    fn description(&self) -> &'static str {
        self.search.description()
    }

    fn parameters(&self) -> Value {
        self.search.parameters()
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let args = arguments(&input)?;
        let query = self.search.query(&args)?;
        let cars = self.catalog.search(&query).await?;

        if cars.is_empty() {
            return Ok(Value::String(self.search.empty_message(&query).to_string()));
        }
        let listings: Vec<CarListing> = cars.iter().map(CarListing::from).collect();
        Ok(serde_json::to_value(listings)?)
    }
}
