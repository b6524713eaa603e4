pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod negotiation;

pub use catalog::{CarCatalog, CarFeatures, CatalogError, CatalogQuery};
pub use domain::car::{Car, CarId, CarListing, NewCar};
pub use domain::contact::ContactRequest;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use negotiation::{
    ConcessionPolicy, FixedJitter, JitterSource, NegotiationDecision, NegotiationError,
    NegotiationStore, NegotiationTerms, Negotiator, UniformJitter,
};
