//! Infrastructure layer: document storage, command services, configuration.
//!
//! Domain crates stay pure; this crate loads documents, runs commands against
//! them and writes the results back under optimistic concurrency.

pub mod command_dispatcher;
pub mod config;
pub mod document_store;
pub mod services;

pub use command_dispatcher::{CommandDispatcher, Committed, ServiceError};
pub use config::EngineConfig;
pub use document_store::{DocumentStore, InMemoryDocumentStore, StoreError, StoredDocument};
pub use services::{
    InventoryService, LocationRef, ProcurementService, PurchaseOrderService, Receipt,
    StockProfile,
};
