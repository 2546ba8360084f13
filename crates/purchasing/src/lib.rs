//! Purchasing domain module (purchase order lifecycle).
//!
//! Business rules for purchase orders, implemented purely as deterministic
//! domain logic (no IO, no storage). Receiving goods emits a `GoodsReceived`
//! event; feeding the received items into the inventory ledger is the calling
//! layer's job.

pub mod order;

pub use order::{
    AddItem, Cancel, CreatePurchaseOrder, GoodsReceived, ItemChanged, ItemChanges, ItemInput,
    ItemRemoved, PaymentMethod, PaymentTerms, PurchaseOrder, PurchaseOrderCancelled,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderItem,
    PurchaseOrderOrdered, PurchaseOrderStatus, ReceiveGoods, RemoveItem, SetTaxRate,
    TaxRateChanged, Transition, UpdateItem,
};
