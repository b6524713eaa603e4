use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use rise_core::domain::car::NewCar;

use crate::connection::DbPool;
use crate::repositories::{CarRepository, RepositoryError, SqlCarRepository};

/// Demo showroom inventory used by `rise seed` and local development.
pub struct DemoInventory;

impl DemoInventory {
    pub const JSON: &'static str = include_str!("../../../config/fixtures/demo_inventory.json");

    /// Parses the fixture. Cars without a flexibility use `default_flexibility`.
    pub fn cars(default_flexibility: Decimal) -> Result<Vec<NewCar>, RepositoryError> {
        let seeds: Vec<SeedCar> = serde_json::from_str(Self::JSON)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        Ok(seeds.into_iter().map(|seed| seed.into_new_car(default_flexibility)).collect())
    }

    /// Inserts the demo cars unless the catalog already has inventory.
    pub async fn load(
        pool: &DbPool,
        default_flexibility: Decimal,
    ) -> Result<SeedResult, RepositoryError> {
        let repository = SqlCarRepository::new(pool.clone());
        let existing = repository.count().await?;
        if existing > 0 {
            info!(
                event_name = "db.seed.skipped",
                existing_cars = existing,
                "catalog already has inventory; demo seed skipped"
            );
            return Ok(SeedResult { cars_seeded: Vec::new(), skipped_existing: existing });
        }

        let mut cars_seeded = Vec::new();
        for car in Self::cars(default_flexibility)? {
            let stored = repository.insert(car).await?;
            cars_seeded.push(SeededCar {
                id: stored.id.0,
                label: format!("{} {} {}", stored.year, stored.make, stored.model),
            });
        }

        info!(event_name = "db.seed.loaded", cars = cars_seeded.len(), "demo inventory loaded");
        Ok(SeedResult { cars_seeded, skipped_existing: 0 })
    }

    /// Checks that every fixture car is present with its list price.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for car in Self::cars(Decimal::ONE)? {
            let prices: Vec<String> = sqlx::query_scalar(
                "SELECT base_price FROM car WHERE make = ?1 AND model = ?2 AND year = ?3",
            )
            .bind(&car.make)
            .bind(&car.model)
            .bind(car.year)
            .fetch_all(pool)
            .await?;

            let present = prices
                .iter()
                .any(|price| price.parse::<Decimal>().map_or(false, |price| price == car.base_price));
            checks.push((format!("{} {} {}", car.year, car.make, car.model), present));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<u64, RepositoryError> {
        SqlCarRepository::new(pool.clone()).delete_all().await
    }
}

#[derive(Debug, Deserialize)]
struct SeedCar {
    make: String,
    model: String,
    year: i32,
    color: String,
    mileage: Option<i64>,
    description: Option<String>,
    base_price: Decimal,
    min_price: Decimal,
    #[serde(default = "enabled_by_default")]
    negotiation_enabled: bool,
    negotiation_flexibility: Option<Decimal>,
}

fn enabled_by_default() -> bool {
    true
}

impl SeedCar {
    fn into_new_car(self, default_flexibility: Decimal) -> NewCar {
        NewCar {
            make: self.make,
            model: self.model,
            year: self.year,
            color: self.color,
            mileage: self.mileage,
            description: self.description,
            base_price: self.base_price,
            min_price: self.min_price,
            negotiation_enabled: self.negotiation_enabled,
            negotiation_flexibility: self.negotiation_flexibility.unwrap_or(default_flexibility),
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub cars_seeded: Vec<SeededCar>,
    pub skipped_existing: i64,
}

#[derive(Debug)]
pub struct SeededCar {
    pub id: i64,
    pub label: String,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
