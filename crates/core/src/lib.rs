//! `venueops-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod numeric;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    IdGenerator, LocationId, ProductId, PurchaseOrderId, SequentialIdGenerator, SupplierId,
    UuidV7IdGenerator,
};
