use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use rise_core::catalog::{CarCatalog, CatalogError, CatalogQuery};
use rise_core::domain::car::{Car, CarId, NewCar};
use rise_core::negotiation::{
    ConcessionPolicy, NegotiationDecision, NegotiationError, NegotiationStore, NegotiationTerms,
};

use super::{validate_new_car, CarRepository, RepositoryError};
use crate::DbPool;

const CAR_COLUMNS: &str = "id, make, model, year, color, mileage, description, base_price, \
     min_price, current_price, negotiation_enabled, negotiation_flexibility";

pub struct SqlCarRepository {
    pool: DbPool,
}

impl SqlCarRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: CarId) -> Result<Option<Car>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CAR_COLUMNS} FROM car WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(car_from_row).transpose()
    }

    async fn select(&self, query: &CatalogQuery) -> Result<Vec<Car>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {CAR_COLUMNS} FROM car WHERE 1 = 1"));

        match query {
            CatalogQuery::Features(features) => {
                if let Some(make) = &features.make {
                    builder.push(" AND LOWER(make) = LOWER(").push_bind(make.clone()).push(")");
                }
                if let Some(model) = &features.model {
                    builder.push(" AND LOWER(model) = LOWER(").push_bind(model.clone()).push(")");
                }
                if let Some(year) = features.year {
                    builder.push(" AND year = ").push_bind(year);
                }
                if let Some(color) = &features.color {
                    builder.push(" AND LOWER(color) = LOWER(").push_bind(color.clone()).push(")");
                }
            }
            CatalogQuery::YearRange { start, end } => {
                builder.push(" AND year BETWEEN ").push_bind(*start).push(" AND ").push_bind(*end);
            }
            // Prices are decimal text; bounds are compared after decoding.
            CatalogQuery::All
            | CatalogQuery::BelowPrice(_)
            | CatalogQuery::AbovePrice(_)
            | CatalogQuery::PriceRange { .. } => {}
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut cars = Vec::with_capacity(rows.len());
        for row in &rows {
            let car = car_from_row(row)?;
            if query.matches(&car) {
                cars.push(car);
            }
        }
        Ok(cars)
    }

    async fn apply_offer_in_tx(
        &self,
        car_id: CarId,
        offer: Decimal,
        policy: &ConcessionPolicy,
    ) -> Result<NegotiationDecision, NegotiationError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // A no-op write takes the database write lock before the read, so a concurrent
        // offer cannot decide from the same asking price.
        let touched = sqlx::query("UPDATE car SET current_price = current_price WHERE id = ?")
            .bind(car_id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        if touched.rows_affected() == 0 {
            return Err(NegotiationError::NotFound(car_id));
        }

        let row = sqlx::query(&format!("SELECT {CAR_COLUMNS} FROM car WHERE id = ?"))
            .bind(car_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        let car = car_from_row(&row).map_err(|error| NegotiationError::InvalidTerms {
            car_id,
            detail: error.to_string(),
        })?;

        let decision = policy.evaluate(car_id, &car.terms, offer)?;

        if let Some(price) = decision.counter_price() {
            sqlx::query(
                "UPDATE car SET current_price = ?, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
            )
            .bind(price.to_string())
            .bind(car_id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        debug!(
            event_name = "db.car.offer_applied",
            car_id = car_id.0,
            status = decision.status(),
            "negotiation decision committed"
        );
        Ok(decision)
    }
}

#[async_trait]
impl CarRepository for SqlCarRepository {
    async fn insert(&self, car: NewCar) -> Result<Car, RepositoryError> {
        validate_new_car(&car)?;

        let result = sqlx::query(
            "INSERT INTO car (make, model, year, color, mileage, description, base_price, \
             min_price, current_price, negotiation_enabled, negotiation_flexibility) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(&car.make)
        .bind(&car.model)
        .bind(car.year)
        .bind(&car.color)
        .bind(car.mileage)
        .bind(&car.description)
        .bind(car.base_price.to_string())
        .bind(car.min_price.to_string())
        .bind(car.negotiation_enabled)
        .bind(car.negotiation_flexibility.to_string())
        .execute(&self.pool)
        .await?;

        let terms = car.terms();
        Ok(Car {
            id: CarId(result.last_insert_rowid()),
            make: car.make,
            model: car.model,
            year: car.year,
            color: car.color,
            mileage: car.mileage,
            description: car.description,
            terms,
        })
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM car").fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM car").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CarCatalog for SqlCarRepository {
    async fn find(&self, id: CarId) -> Result<Option<Car>, CatalogError> {
        Ok(self.load(id).await?)
    }

    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Car>, CatalogError> {
        Ok(self.select(query).await?)
    }
}

#[async_trait]
impl NegotiationStore for SqlCarRepository {
    async fn apply_offer(
        &self,
        car_id: CarId,
        offer: Decimal,
        policy: &ConcessionPolicy,
    ) -> Result<NegotiationDecision, NegotiationError> {
        self.apply_offer_in_tx(car_id, offer, policy).await
    }
}

fn car_from_row(row: &SqliteRow) -> Result<Car, RepositoryError> {
    let year: i64 = row.try_get("year").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let enabled: i64 =
        row.try_get("negotiation_enabled").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_price: Option<String> =
        row.try_get("current_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Car {
        id: CarId(row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?),
        make: row.try_get("make").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        model: row.try_get("model").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        year: i32::try_from(year)
            .map_err(|_| RepositoryError::Decode(format!("year `{year}` is out of range")))?,
        color: row.try_get("color").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        mileage: row.try_get("mileage").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        terms: NegotiationTerms {
            base_price: decimal_column(row, "base_price")?,
            min_price: decimal_column(row, "min_price")?,
            current_price: current_price
                .as_deref()
                .map(|value| parse_decimal("current_price", value))
                .transpose()?,
            enabled: enabled != 0,
            flexibility: decimal_column(row, "negotiation_flexibility")?,
        },
    })
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    parse_decimal(column, &raw)
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}` is not a decimal: {e}")))
}
