use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use rise_core::catalog::{CarCatalog, CatalogError, CatalogQuery};
use rise_core::domain::car::{Car, CarId, NewCar};
use rise_core::domain::contact::ContactRequest;
use rise_core::negotiation::{
    ConcessionPolicy, NegotiationDecision, NegotiationError, NegotiationStore,
};

use super::{validate_new_car, CarRepository, ContactRecord, ContactRepository, RepositoryError};

/// Keeps cars in id order. The write lock is held across decide-and-store, so offers
/// serialize the same way they do against SQLite.
#[derive(Default)]
pub struct InMemoryCarRepository {
    cars: RwLock<BTreeMap<CarId, Car>>,
}

impl InMemoryCarRepository {
    pub async fn with_cars(cars: Vec<NewCar>) -> Result<Self, RepositoryError> {
        let repository = Self::default();
        for car in cars {
            repository.insert(car).await?;
        }
        Ok(repository)
    }
}

#[async_trait]
impl CarRepository for InMemoryCarRepository {
    async fn insert(&self, car: NewCar) -> Result<Car, RepositoryError> {
        validate_new_car(&car)?;

        let mut cars = self.cars.write().await;
        let id = CarId(cars.keys().next_back().map_or(1, |last| last.0 + 1));
        let terms = car.terms();
        let stored = Car {
            id,
            make: car.make,
            model: car.model,
            year: car.year,
            color: car.color,
            mileage: car.mileage,
            description: car.description,
            terms,
        };
        cars.insert(id, stored.clone());
        Ok(stored)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.cars.read().await.len() as i64)
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let mut cars = self.cars.write().await;
        let removed = cars.len() as u64;
        cars.clear();
        Ok(removed)
    }
}

#[async_trait]
impl CarCatalog for InMemoryCarRepository {
    async fn find(&self, id: CarId) -> Result<Option<Car>, CatalogError> {
        Ok(self.cars.read().await.get(&id).cloned())
    }

    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Car>, CatalogError> {
        let cars = self.cars.read().await;
        Ok(cars.values().filter(|car| query.matches(car)).cloned().collect())
    }
}

#[async_trait]
impl NegotiationStore for InMemoryCarRepository {
    async fn apply_offer(
        &self,
        car_id: CarId,
        offer: Decimal,
        policy: &ConcessionPolicy,
    ) -> Result<NegotiationDecision, NegotiationError> {
        let mut cars = self.cars.write().await;
        let car = cars.get_mut(&car_id).ok_or(NegotiationError::NotFound(car_id))?;
        let decision = policy.evaluate(car_id, &car.terms, offer)?;
        if let Some(price) = decision.counter_price() {
            car.terms.current_price = Some(price);
        }
        Ok(decision)
    }
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<Vec<ContactRecord>>,
}

#[async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn save(&self, contact: ContactRequest) -> Result<ContactRecord, RepositoryError> {
        let mut contacts = self.contacts.write().await;
        let record =
            ContactRecord { id: contacts.len() as i64 + 1, contact, created_at: Utc::now() };
        contacts.push(record.clone());
        Ok(record)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<ContactRecord>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts.iter().rev().take(limit as usize).cloned().collect())
    }
}
