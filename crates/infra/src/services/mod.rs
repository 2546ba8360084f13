//! Application services: load a document, run a command, save the result.

mod inventory;
mod procurement;
mod purchasing;

pub use inventory::{INVENTORY_AGGREGATE, INVENTORY_COLLECTION, InventoryService, StockProfile};
pub use procurement::{LocationRef, ProcurementService, Receipt};
pub use purchasing::{PURCHASE_ORDER_AGGREGATE, PURCHASE_ORDER_COLLECTION, PurchaseOrderService};
