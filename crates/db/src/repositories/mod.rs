use async_trait::async_trait;
use thiserror::Error;

use rise_core::catalog::CatalogError;
use rise_core::domain::car::{Car, NewCar};
use rise_core::domain::contact::ContactRequest;
use rise_core::errors::ApplicationError;
use rise_core::negotiation::NegotiationError;

pub mod car;
pub mod contact;
pub mod memory;

pub use car::SqlCarRepository;
pub use contact::{ContactRecord, SqlContactRepository};
pub use memory::{InMemoryCarRepository, InMemoryContactRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl From<RepositoryError> for CatalogError {
    fn from(value: RepositoryError) -> Self {
        CatalogError::Storage(value.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Persistence(value.to_string())
    }
}

impl From<RepositoryError> for NegotiationError {
    fn from(value: RepositoryError) -> Self {
        NegotiationError::Storage(value.to_string())
    }
}

/// Write side of the catalog. Reads go through [`rise_core::catalog::CarCatalog`].
#[async_trait]
pub trait CarRepository: Send + Sync {
    async fn insert(&self, car: NewCar) -> Result<Car, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
    async fn delete_all(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn save(&self, contact: ContactRequest) -> Result<ContactRecord, RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<ContactRecord>, RepositoryError>;
}

pub(crate) fn validate_new_car(car: &NewCar) -> Result<(), RepositoryError> {
    if car.make.trim().is_empty() || car.model.trim().is_empty() {
        return Err(RepositoryError::Invalid("car make and model are required".to_string()));
    }
    car.terms().validate().map_err(|detail| RepositoryError::Invalid(detail.to_string()))
}
