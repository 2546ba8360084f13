//! Batch ledger: stock of one product at one location, held as cost-layered
//! batches with cached totals.
//!
//! Pure domain logic (no IO, no HTTP, no storage). Callers load an
//! [`Inventory`] document, execute commands against it and persist the result.

pub mod batch;
pub mod ledger;

pub use batch::{Batch, BatchStatus, ConsumptionMethod, StockTotals, strip_reservation_suffix};
pub use ledger::{
    AddBatch, BatchAdded, BatchChanges, BatchRemoved, BatchUpdated, BatchesExpired,
    ConsumeQuantity, ConsumedBatch, Inventory, InventoryCommand, InventoryEvent, InventoryKey,
    MarkExpiredBatches, Movement, QuantityConsumed, QuantityReserved, ReleaseReservation,
    ReleaseTarget, ReleasedSlice, RemoveBatch, ReservationReleased, ReserveQuantity,
    ReservedSlice, UpdateBatch, consumed_breakdown,
};
