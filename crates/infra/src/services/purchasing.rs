use std::sync::Arc;

use venueops_core::{DomainError, PurchaseOrderId};
use venueops_purchasing::{
    CreatePurchaseOrder, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
};

use crate::command_dispatcher::{CommandDispatcher, Committed, ServiceError};
use crate::document_store::DocumentStore;

pub const PURCHASE_ORDER_COLLECTION: &str = "purchaseOrders";
pub const PURCHASE_ORDER_AGGREGATE: &str = "purchase_order";

/// Purchase order service over a document store.
#[derive(Debug)]
pub struct PurchaseOrderService<S> {
    dispatcher: Arc<CommandDispatcher<S>>,
}

impl<S> PurchaseOrderService<S>
where
    S: DocumentStore,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S>>) -> Self {
        Self { dispatcher }
    }

    pub fn get_purchase_order(&self, id: &PurchaseOrderId) -> Result<PurchaseOrder, ServiceError> {
        self.dispatcher
            .load(PURCHASE_ORDER_COLLECTION, id.as_str())?
            .ok_or_else(|| DomainError::not_found("purchase order", id.as_str()).into())
    }

    pub fn list_purchase_orders(&self) -> Result<Vec<PurchaseOrder>, ServiceError> {
        self.dispatcher.list(PURCHASE_ORDER_COLLECTION)
    }

    pub fn create_purchase_order(
        &self,
        id: &PurchaseOrderId,
        command: CreatePurchaseOrder,
    ) -> Result<Committed<PurchaseOrder, PurchaseOrderEvent>, ServiceError> {
        self.execute(id, &PurchaseOrderCommand::CreatePurchaseOrder(command))
    }

    /// Decide `command` against the stored order without saving it.
    pub fn preview(
        &self,
        id: &PurchaseOrderId,
        command: &PurchaseOrderCommand,
    ) -> Result<Vec<PurchaseOrderEvent>, ServiceError> {
        self.dispatcher.preview(PURCHASE_ORDER_COLLECTION, id.as_str(), command, || {
            Ok(PurchaseOrder::empty(id.clone()))
        })
    }

    /// Run any purchase order command. Commands other than create against an
    /// unknown id fail with `NotFound`.
    pub fn execute(
        &self,
        id: &PurchaseOrderId,
        command: &PurchaseOrderCommand,
    ) -> Result<Committed<PurchaseOrder, PurchaseOrderEvent>, ServiceError> {
        self.dispatcher.dispatch(
            PURCHASE_ORDER_COLLECTION,
            id.as_str(),
            PURCHASE_ORDER_AGGREGATE,
            command,
            || Ok(PurchaseOrder::empty(id.clone())),
        )
    }
}
