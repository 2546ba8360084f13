use std::sync::Arc;

use tracing::debug;

use venueops_core::{DomainError, LocationId, ProductId};
use venueops_inventory::{
    AddBatch, ConsumeQuantity, ConsumedBatch, Inventory, InventoryCommand, InventoryEvent,
    InventoryKey, consumed_breakdown,
};

use crate::command_dispatcher::{CommandDispatcher, Committed, ServiceError};
use crate::document_store::DocumentStore;

pub const INVENTORY_COLLECTION: &str = "inventory";
pub const INVENTORY_AGGREGATE: &str = "inventory";

/// Display snapshot used when a receipt creates a new inventory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockProfile {
    pub product_name: String,
    pub location_name: String,
    pub unit: String,
}

impl StockProfile {
    fn fresh_inventory(&self, key: &InventoryKey) -> Inventory {
        Inventory::new(
            key.clone(),
            self.product_name.clone(),
            self.location_name.clone(),
            self.unit.clone(),
        )
    }
}

/// Batch ledger service over a document store.
#[derive(Debug)]
pub struct InventoryService<S> {
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S> InventoryService<S>
where
    S: DocumentStore,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self { dispatcher }
    }

    pub fn get_inventory(
        &self,
        product_id: &ProductId,
        location_id: &LocationId,
    ) -> Result<Inventory, ServiceError> {
        let key = InventoryKey::new(product_id.clone(), location_id.clone());
        self.dispatcher
            .load(INVENTORY_COLLECTION, &key.to_string())?
            .ok_or_else(|| DomainError::not_found("inventory", key.to_string()).into())
    }

    pub fn list_inventories(&self) -> Result<Vec<Inventory>, ServiceError> {
        self.dispatcher.list(INVENTORY_COLLECTION)
    }

    /// Run a ledger command against an existing record.
    pub fn execute(
        &self,
        key: &InventoryKey,
        command: &InventoryCommand,
    ) -> Result<Committed<Inventory, InventoryEvent>, ServiceError> {
        let document_key = key.to_string();
        self.dispatcher.dispatch(
            INVENTORY_COLLECTION,
            &document_key,
            INVENTORY_AGGREGATE,
            command,
            || Err(DomainError::not_found("inventory", document_key.clone())),
        )
    }

    /// Add a batch, creating the record first if this is the key's first receipt.
    pub fn receive_batch(
        &self,
        key: &InventoryKey,
        profile: &StockProfile,
        command: AddBatch,
    ) -> Result<Committed<Inventory, InventoryEvent>, ServiceError> {
        debug!(key = %key, quantity = command.quantity, "receiving batch");
        self.dispatcher.dispatch(
            INVENTORY_COLLECTION,
            &key.to_string(),
            INVENTORY_AGGREGATE,
            &InventoryCommand::AddBatch(command),
            || Ok(profile.fresh_inventory(key)),
        )
    }

    /// Check that `receive_batch` would accept `command`, without writing.
    pub fn check_receipt(
        &self,
        key: &InventoryKey,
        profile: &StockProfile,
        command: &AddBatch,
    ) -> Result<(), ServiceError> {
        self.dispatcher
            .preview(
                INVENTORY_COLLECTION,
                &key.to_string(),
                &InventoryCommand::AddBatch(command.clone()),
                || Ok(profile.fresh_inventory(key)),
            )
            .map(|_| ())
    }

    /// Consume stock and return the commit plus the per-batch breakdown with costs.
    pub fn consume(
        &self,
        key: &InventoryKey,
        command: ConsumeQuantity,
    ) -> Result<(Committed<Inventory, InventoryEvent>, Vec<ConsumedBatch>), ServiceError> {
        let committed = self.execute(key, &InventoryCommand::ConsumeQuantity(command))?;
        let events: Vec<InventoryEvent> = committed.payloads().cloned().collect();
        let breakdown = consumed_breakdown(&events);
        Ok((committed, breakdown))
    }
}
