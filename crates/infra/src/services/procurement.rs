use std::sync::Arc;

use tracing::{error, info};

use venueops_core::{DomainError, LocationId, PurchaseOrderId};
use venueops_inventory::{AddBatch, Inventory, InventoryEvent, InventoryKey};
use venueops_purchasing::{
    GoodsReceived, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, ReceiveGoods,
};

use super::inventory::{InventoryService, StockProfile};
use super::purchasing::PurchaseOrderService;
use crate::command_dispatcher::{CommandDispatcher, Committed, ServiceError};
use crate::document_store::DocumentStore;

/// Where received goods are put away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRef {
    pub location_id: LocationId,
    pub location_name: String,
}

/// Outcome of receiving a purchase order: the received order plus one
/// committed ledger change per line item.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub order: Committed<PurchaseOrder, PurchaseOrderEvent>,
    pub stock: Vec<Committed<Inventory, InventoryEvent>>,
}

/// Ties the purchase order lifecycle to the batch ledger.
#[derive(Debug)]
pub struct ProcurementService<S> {
    inventory: InventoryService<S>,
    orders: PurchaseOrderService<S>,
}

impl<S> ProcurementService<S>
where
    S: DocumentStore,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self {
            inventory: InventoryService::new(dispatcher.clone()),
            orders: PurchaseOrderService::new(dispatcher),
        }
    }

    pub fn inventory(&self) -> &InventoryService<S> {
        &self.inventory
    }

    pub fn orders(&self) -> &PurchaseOrderService<S> {
        &self.orders
    }

    /// Mark the order received, then add one batch per line item at
    /// `location` (quantity as received, unit price as cost).
    ///
    /// Every line is checked against its ledger record before the order is
    /// saved, so a line the ledger would reject fails the receipt with nothing
    /// written and the order still `ordered`.
    pub fn receive_purchase_order(
        &self,
        id: &PurchaseOrderId,
        location: &LocationRef,
        command: ReceiveGoods,
    ) -> Result<Receipt, ServiceError> {
        let command = PurchaseOrderCommand::ReceiveGoods(command);

        let planned = goods_received(id, self.orders.preview(id, &command)?.iter())?;
        for (key, profile, add) in stock_lines(&planned, location) {
            if let Err(err) = self.inventory.check_receipt(&key, &profile, &add) {
                error!(
                    purchase_order = %id,
                    product = %key.product_id,
                    error = %err,
                    "received item rejected by the ledger, receipt aborted"
                );
                return Err(err);
            }
        }

        let order = self.orders.execute(id, &command)?;
        let received = goods_received(id, order.payloads())?;

        let mut stock = Vec::with_capacity(received.items.len());
        for (key, profile, add) in stock_lines(&received, location) {
            match self.inventory.receive_batch(&key, &profile, add) {
                Ok(committed) => stock.push(committed),
                Err(err) => {
                    error!(
                        purchase_order = %id,
                        product = %key.product_id,
                        error = %err,
                        "received item could not be booked into stock"
                    );
                    return Err(err);
                }
            }
        }

        info!(
            purchase_order = %id,
            supplier = %received.supplier_id,
            location = %location.location_id,
            items = stock.len(),
            "purchase order received into stock"
        );

        Ok(Receipt { order, stock })
    }
}

fn goods_received<'a>(
    id: &PurchaseOrderId,
    mut events: impl Iterator<Item = &'a PurchaseOrderEvent>,
) -> Result<GoodsReceived, DomainError> {
    events
        .find_map(|event| match event {
            PurchaseOrderEvent::GoodsReceived(e) => Some(e.clone()),
            _ => None,
        })
        .ok_or_else(|| DomainError::invalid_state(format!("purchase order {id} emitted no receipt")))
}

/// One ledger receipt per received line item.
fn stock_lines(
    received: &GoodsReceived,
    location: &LocationRef,
) -> Vec<(InventoryKey, StockProfile, AddBatch)> {
    received
        .items
        .iter()
        .map(|item| {
            let key = InventoryKey::new(item.product_id.clone(), location.location_id.clone());
            let profile = StockProfile {
                product_name: item.product_name.clone(),
                location_name: location.location_name.clone(),
                unit: item.unit.clone(),
            };
            let add = AddBatch {
                batch_id: None,
                quantity: item.quantity,
                unit: Some(item.unit.clone()),
                cost_per_unit: item.unit_price,
                received_date: Some(received.actual_delivery_date),
                expiry_date: None,
                supplier_batch_code: None,
                status: None,
                actor: received.actor.clone(),
                occurred_at: received.occurred_at,
            };
            (key, profile, add)
        })
        .collect()
}
