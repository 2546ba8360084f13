//! JSON replay scripts.
//!
//! A script is a list of steps, each tagged with `op`:
//!
//! ```json
//! { "steps": [
//!   { "op": "receiveBatch", "productId": "water", "locationId": "bar", "unit": "bottle",
//!     "batch": { "quantity": 100, "costPerUnit": 0.8, "actor": "store",
//!                "occurredAt": "2026-05-01T09:00:00Z" } },
//!   { "op": "consume", "productId": "water", "locationId": "bar", "quantity": 70,
//!     "actor": "bar", "occurredAt": "2026-05-02T21:00:00Z" }
//! ] }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use venueops_core::{LocationId, ProductId, PurchaseOrderId, SupplierId};
use venueops_inventory::{AddBatch, ConsumptionMethod, InventoryCommand};
use venueops_purchasing::{ItemInput, PaymentTerms, PurchaseOrderCommand};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Add a batch, creating the inventory record on first receipt.
    #[serde(rename_all = "camelCase")]
    ReceiveBatch {
        product_id: ProductId,
        location_id: LocationId,
        #[serde(default)]
        product_name: Option<String>,
        #[serde(default)]
        location_name: Option<String>,
        unit: String,
        batch: AddBatch,
    },

    /// Any ledger command against an existing record.
    #[serde(rename_all = "camelCase")]
    Inventory {
        product_id: ProductId,
        location_id: LocationId,
        command: InventoryCommand,
    },

    /// Consume stock; the method falls back to the configured default.
    #[serde(rename_all = "camelCase")]
    Consume {
        product_id: ProductId,
        location_id: LocationId,
        quantity: f64,
        #[serde(default)]
        method: Option<ConsumptionMethod>,
        actor: String,
        occurred_at: DateTime<Utc>,
    },

    /// Create a purchase order; the tax rate falls back to the configured default.
    #[serde(rename_all = "camelCase")]
    CreatePurchaseOrder {
        purchase_order_id: PurchaseOrderId,
        supplier_id: SupplierId,
        supplier_name: String,
        items: Vec<ItemInput>,
        #[serde(default)]
        tax_rate: Option<f64>,
        #[serde(default)]
        payment_terms: PaymentTerms,
        #[serde(default)]
        expected_delivery_date: Option<DateTime<Utc>>,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default)]
        submit: bool,
        actor: String,
        occurred_at: DateTime<Utc>,
    },

    /// Any purchase order command.
    #[serde(rename_all = "camelCase")]
    PurchaseOrder {
        purchase_order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    },

    /// Receive an ordered purchase order into stock at a location.
    #[serde(rename_all = "camelCase")]
    ReceivePurchaseOrder {
        purchase_order_id: PurchaseOrderId,
        location_id: LocationId,
        #[serde(default)]
        location_name: Option<String>,
        #[serde(default)]
        actual_delivery_date: Option<DateTime<Utc>>,
        actor: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::ReceiveBatch { .. } => "receiveBatch",
            Step::Inventory { .. } => "inventory",
            Step::Consume { .. } => "consume",
            Step::CreatePurchaseOrder { .. } => "createPurchaseOrder",
            Step::PurchaseOrder { .. } => "purchaseOrder",
            Step::ReceivePurchaseOrder { .. } => "receivePurchaseOrder",
        }
    }
}
