pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{DemoInventory, SeedResult, SeededCar, VerificationResult};
pub use repositories::{
    CarRepository, ContactRecord, ContactRepository, InMemoryCarRepository,
    InMemoryContactRepository, RepositoryError, SqlCarRepository, SqlContactRepository,
};
