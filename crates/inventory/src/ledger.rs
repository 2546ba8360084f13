use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use venueops_core::numeric::{ensure_non_negative, ensure_positive, is_depleted};
use venueops_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, IdGenerator, LocationId, ProductId,
};
use venueops_events::Event;

use crate::batch::{
    Batch, BatchStatus, ConsumptionMethod, RESERVATION_MARKER, StockTotals, ordered_indices,
    plan_draw,
};

const BATCH_ID_PREFIX: &str = "B-";
const MOVEMENT_ID_PREFIX: &str = "MOV-";
const MAX_ID_ATTEMPTS: usize = 8;

/// Document key of an inventory record: one product at one location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl InventoryKey {
    pub fn new(product_id: impl Into<ProductId>, location_id: impl Into<LocationId>) -> Self {
        Self {
            product_id: product_id.into(),
            location_id: location_id.into(),
        }
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.product_id, self.location_id)
    }
}

/// Aggregate root: stock of one product at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(flatten)]
    key: InventoryKey,
    location_name: String,
    product_name: String,
    unit: String,
    batches: Vec<Batch>,
    totals: StockTotals,
    last_updated: Option<DateTime<Utc>>,
    last_updated_by: Option<String>,
    last_movement_id: Option<String>,
    #[serde(default)]
    version: u64,
}

impl Inventory {
    /// Create an empty record; the first receipt for a key starts here.
    pub fn new(
        key: InventoryKey,
        product_name: impl Into<String>,
        location_name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        let unit = unit.into();
        Self {
            key,
            location_name: location_name.into(),
            product_name: product_name.into(),
            totals: StockTotals::zero(unit.clone()),
            unit,
            batches: Vec::new(),
            last_updated: None,
            last_updated_by: None,
            last_movement_id: None,
            version: 0,
        }
    }

    pub fn key(&self) -> &InventoryKey {
        &self.key
    }

    pub fn product_id(&self) -> &ProductId {
        &self.key.product_id
    }

    pub fn location_id(&self) -> &LocationId {
        &self.key.location_id
    }

    pub fn location_name(&self) -> &str {
        &self.location_name
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn batch(&self, batch_id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.batch_id == batch_id)
    }

    pub fn totals(&self) -> &StockTotals {
        &self.totals
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn last_updated_by(&self) -> Option<&str> {
        self.last_updated_by.as_deref()
    }

    pub fn last_movement_id(&self) -> Option<&str> {
        self.last_movement_id.as_deref()
    }

    /// `false` once every batch has been consumed or removed.
    pub fn has_stock(&self) -> bool {
        !self.batches.is_empty()
    }

    pub fn batches_with_status(&self, status: BatchStatus) -> impl Iterator<Item = &Batch> {
        self.batches.iter().filter(move |b| b.status == status)
    }

    /// Available and quarantined batches whose expiry falls on or before `cutoff`.
    pub fn batches_expiring_before(&self, cutoff: DateTime<Utc>) -> Vec<&Batch> {
        self.batches
            .iter()
            .filter(|b| {
                matches!(b.status, BatchStatus::Available | BatchStatus::Quarantine)
                    && b.is_expired_at(cutoff)
            })
            .collect()
    }

    /// Cost value of available stock.
    pub fn inventory_value(&self) -> f64 {
        self.batches_with_status(BatchStatus::Available)
            .map(Batch::value)
            .sum()
    }

    /// Totals derived from `batches` right now, independent of the cache.
    pub fn computed_totals(&self) -> StockTotals {
        StockTotals::from_batches(&self.batches, &self.unit)
    }

    /// Refresh the cached totals from `batches`.
    pub fn recalculate_totals(&mut self) {
        self.totals = self.computed_totals();
    }

    /// Check the cached totals against the batches (e.g. after loading a document).
    pub fn verify_totals(&self) -> DomainResult<()> {
        match self.totals.mismatch(&self.computed_totals()) {
            None => Ok(()),
            Some(field) => Err(DomainError::validation(
                field,
                "cached total does not match the batches",
            )),
        }
    }

    fn batch_index(&self, batch_id: &str) -> DomainResult<usize> {
        self.batches
            .iter()
            .position(|b| b.batch_id == batch_id)
            .ok_or_else(|| DomainError::not_found("batch", batch_id))
    }
}

impl AggregateRoot for Inventory {
    type Id = InventoryKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AddBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBatch {
    /// Generated when absent.
    #[serde(default)]
    pub batch_id: Option<String>,
    pub quantity: f64,
    /// Defaults to the inventory unit; must match it when given.
    #[serde(default)]
    pub unit: Option<String>,
    pub cost_per_unit: f64,
    /// Defaults to `occurred_at`.
    #[serde(default)]
    pub received_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supplier_batch_code: Option<String>,
    /// `available` (default) or `quarantine`.
    #[serde(default)]
    pub status: Option<BatchStatus>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Field changes for UpdateBatch; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchChanges {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub cost_per_unit: Option<f64>,
    #[serde(default)]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub supplier_batch_code: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<BatchStatus>,
}

/// Command: UpdateBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatch {
    pub batch_id: String,
    pub changes: BatchChanges,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBatch {
    pub batch_id: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveQuantity (FIFO across available batches unless `batch_id` is given).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveQuantity {
    pub quantity: f64,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseReservation (LIFO across reserved batches unless `batch_id` is given).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReservation {
    pub quantity: f64,
    #[serde(default)]
    pub batch_id: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeQuantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeQuantity {
    pub quantity: f64,
    #[serde(default)]
    pub method: ConsumptionMethod,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkExpiredBatches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkExpiredBatches {
    pub now: DateTime<Utc>,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryCommand {
    AddBatch(AddBatch),
    UpdateBatch(UpdateBatch),
    RemoveBatch(RemoveBatch),
    ReserveQuantity(ReserveQuantity),
    ReleaseReservation(ReleaseReservation),
    ConsumeQuantity(ConsumeQuantity),
    MarkExpiredBatches(MarkExpiredBatches),
}

/// Correlation data shared by every inventory event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub movement_id: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchAdded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAdded {
    pub movement: Movement,
    pub batch: Batch,
}

/// Event: BatchUpdated (carries the batch as it reads after the update).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdated {
    pub movement: Movement,
    pub batch: Batch,
}

/// Event: BatchRemoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRemoved {
    pub movement: Movement,
    pub batch_id: String,
    /// Quantity the batch held when it was removed.
    pub quantity: f64,
}

/// One batch's share of a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedSlice {
    pub source_batch_id: String,
    pub reserved_batch_id: String,
    pub quantity: f64,
}

/// Event: QuantityReserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityReserved {
    pub movement: Movement,
    pub allocations: Vec<ReservedSlice>,
}

/// Where released quantity goes back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseTarget {
    /// Added onto an existing available batch.
    Merge { batch_id: String },
    /// Appended as a new available batch (the origin no longer exists or is not available).
    Restore { batch: Batch },
}

/// One reserved fragment's share of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasedSlice {
    pub reserved_batch_id: String,
    pub quantity: f64,
    pub target: ReleaseTarget,
}

/// Event: ReservationReleased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationReleased {
    pub movement: Movement,
    pub releases: Vec<ReleasedSlice>,
}

/// One batch's share of a consumption, for cost-of-goods accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedBatch {
    pub batch_id: String,
    pub quantity: f64,
    pub cost_per_unit: f64,
}

/// Event: QuantityConsumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityConsumed {
    pub movement: Movement,
    pub method: ConsumptionMethod,
    pub consumed: Vec<ConsumedBatch>,
}

/// Event: BatchesExpired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchesExpired {
    pub movement: Movement,
    pub batch_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryEvent {
    BatchAdded(BatchAdded),
    BatchUpdated(BatchUpdated),
    BatchRemoved(BatchRemoved),
    QuantityReserved(QuantityReserved),
    ReservationReleased(ReservationReleased),
    QuantityConsumed(QuantityConsumed),
    BatchesExpired(BatchesExpired),
}

impl InventoryEvent {
    pub fn movement(&self) -> &Movement {
        match self {
            InventoryEvent::BatchAdded(e) => &e.movement,
            InventoryEvent::BatchUpdated(e) => &e.movement,
            InventoryEvent::BatchRemoved(e) => &e.movement,
            InventoryEvent::QuantityReserved(e) => &e.movement,
            InventoryEvent::ReservationReleased(e) => &e.movement,
            InventoryEvent::QuantityConsumed(e) => &e.movement,
            InventoryEvent::BatchesExpired(e) => &e.movement,
        }
    }
}

/// Flatten the consumption breakdown out of a list of events.
pub fn consumed_breakdown(events: &[InventoryEvent]) -> Vec<ConsumedBatch> {
    events
        .iter()
        .filter_map(|e| match e {
            InventoryEvent::QuantityConsumed(c) => Some(c.consumed.iter().cloned()),
            _ => None,
        })
        .flatten()
        .collect()
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::BatchAdded(_) => "inventory.batch.added",
            InventoryEvent::BatchUpdated(_) => "inventory.batch.updated",
            InventoryEvent::BatchRemoved(_) => "inventory.batch.removed",
            InventoryEvent::QuantityReserved(_) => "inventory.stock.reserved",
            InventoryEvent::ReservationReleased(_) => "inventory.stock.released",
            InventoryEvent::QuantityConsumed(_) => "inventory.stock.consumed",
            InventoryEvent::BatchesExpired(_) => "inventory.batch.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.movement().occurred_at
    }
}

impl Aggregate for Inventory {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::BatchAdded(e) => {
                self.batches.push(e.batch.clone());
            }
            InventoryEvent::BatchUpdated(e) => {
                if let Some(existing) = self
                    .batches
                    .iter_mut()
                    .find(|b| b.batch_id == e.batch.batch_id)
                {
                    *existing = e.batch.clone();
                }
            }
            InventoryEvent::BatchRemoved(e) => {
                self.batches.retain(|b| b.batch_id != e.batch_id);
            }
            InventoryEvent::QuantityReserved(e) => {
                for slice in &e.allocations {
                    reserve_slice(&mut self.batches, slice, e.movement.occurred_at);
                }
            }
            InventoryEvent::ReservationReleased(e) => {
                for slice in &e.releases {
                    release_slice(&mut self.batches, slice);
                }
            }
            InventoryEvent::QuantityConsumed(e) => {
                for part in &e.consumed {
                    draw_down(&mut self.batches, &part.batch_id, part.quantity);
                }
            }
            InventoryEvent::BatchesExpired(e) => {
                for batch in self
                    .batches
                    .iter_mut()
                    .filter(|b| e.batch_ids.contains(&b.batch_id))
                {
                    batch.status = BatchStatus::Expired;
                }
            }
        }

        let movement = event.movement();
        self.last_updated = Some(movement.occurred_at);
        self.last_updated_by = Some(movement.actor.clone());
        self.last_movement_id = Some(movement.movement_id.clone());

        // Totals are always rebuilt, never patched.
        self.recalculate_totals();
        self.version += 1;
    }

    fn handle(
        &self,
        command: &Self::Command,
        ids: &dyn IdGenerator,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::AddBatch(cmd) => self.handle_add(cmd, ids),
            InventoryCommand::UpdateBatch(cmd) => self.handle_update(cmd, ids),
            InventoryCommand::RemoveBatch(cmd) => self.handle_remove(cmd, ids),
            InventoryCommand::ReserveQuantity(cmd) => self.handle_reserve(cmd, ids),
            InventoryCommand::ReleaseReservation(cmd) => self.handle_release(cmd, ids),
            InventoryCommand::ConsumeQuantity(cmd) => self.handle_consume(cmd, ids),
            InventoryCommand::MarkExpiredBatches(cmd) => self.handle_mark_expired(cmd, ids),
        }
    }
}

/// Move `slice.quantity` out of its source batch into a new reserved fragment.
fn reserve_slice(batches: &mut Vec<Batch>, slice: &ReservedSlice, at: DateTime<Utc>) {
    let Some(source) = batches.iter().find(|b| b.batch_id == slice.source_batch_id) else {
        return;
    };
    let fragment = Batch {
        batch_id: slice.reserved_batch_id.clone(),
        quantity: slice.quantity,
        status: BatchStatus::Reserved,
        reserved_from: Some(source.batch_id.clone()),
        reserved_at: Some(at),
        ..source.clone()
    };
    draw_down(batches, &slice.source_batch_id, slice.quantity);
    batches.push(fragment);
}

fn release_slice(batches: &mut Vec<Batch>, slice: &ReleasedSlice) {
    draw_down(batches, &slice.reserved_batch_id, slice.quantity);
    match &slice.target {
        ReleaseTarget::Merge { batch_id } => {
            if let Some(origin) = batches.iter_mut().find(|b| &b.batch_id == batch_id) {
                origin.quantity += slice.quantity;
            }
        }
        ReleaseTarget::Restore { batch } => batches.push(batch.clone()),
    }
}

/// Reduce a batch, removing it once nothing is left.
fn draw_down(batches: &mut Vec<Batch>, batch_id: &str, quantity: f64) {
    if let Some(idx) = batches.iter().position(|b| b.batch_id == batch_id) {
        batches[idx].quantity -= quantity;
        if is_depleted(batches[idx].quantity) {
            batches.remove(idx);
        }
    }
}

impl Inventory {
    fn movement(&self, actor: &str, occurred_at: DateTime<Utc>, ids: &dyn IdGenerator) -> Movement {
        Movement {
            movement_id: ids.next_id(MOVEMENT_ID_PREFIX),
            actor: actor.to_string(),
            occurred_at,
        }
    }

    fn fresh_batch_id(&self, ids: &dyn IdGenerator, taken: &[Batch]) -> DomainResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = ids.next_id(BATCH_ID_PREFIX);
            if !taken.iter().any(|b| b.batch_id == candidate) {
                return Ok(candidate);
            }
        }
        Err(DomainError::conflict("could not allocate a unique batch id"))
    }

    /// `<origin>-R<token>`, unique among stored batches and the fragments
    /// already planned by the same command.
    fn fresh_fragment_id(
        &self,
        origin: &str,
        ids: &dyn IdGenerator,
        planned: &[ReservedSlice],
    ) -> DomainResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = format!("{origin}{RESERVATION_MARKER}{}", ids.next_id(""));
            let taken = self.batches.iter().any(|b| b.batch_id == candidate)
                || planned.iter().any(|s| s.reserved_batch_id == candidate);
            if !taken {
                return Ok(candidate);
            }
        }
        Err(DomainError::conflict("could not allocate a unique reservation id"))
    }

    fn handle_add(&self, cmd: &AddBatch, ids: &dyn IdGenerator) -> DomainResult<Vec<InventoryEvent>> {
        ensure_positive("quantity", cmd.quantity)?;
        ensure_non_negative("costPerUnit", cmd.cost_per_unit)?;

        if let Some(unit) = &cmd.unit {
            if unit != &self.unit {
                return Err(DomainError::validation(
                    "unit",
                    format!("expected `{}`, got `{unit}`", self.unit),
                ));
            }
        }

        let status = cmd.status.unwrap_or(BatchStatus::Available);
        if !matches!(status, BatchStatus::Available | BatchStatus::Quarantine) {
            return Err(DomainError::validation(
                "status",
                format!("new batches start available or quarantined, not {status}"),
            ));
        }

        let batch_id = match &cmd.batch_id {
            Some(id) if id.trim().is_empty() => {
                return Err(DomainError::validation("batchId", "batch id cannot be blank"));
            }
            Some(id) if self.batch(id).is_some() => {
                return Err(DomainError::validation(
                    "batchId",
                    format!("batch `{id}` already exists"),
                ));
            }
            Some(id) => id.clone(),
            None => self.fresh_batch_id(ids, &self.batches)?,
        };

        let batch = Batch {
            batch_id,
            quantity: cmd.quantity,
            unit: self.unit.clone(),
            cost_per_unit: cmd.cost_per_unit,
            received_date: cmd.received_date.unwrap_or(cmd.occurred_at),
            expiry_date: cmd.expiry_date,
            supplier_batch_code: cmd.supplier_batch_code.clone(),
            status,
            reserved_from: None,
            reserved_at: None,
        };

        Ok(vec![InventoryEvent::BatchAdded(BatchAdded {
            movement: self.movement(&cmd.actor, cmd.occurred_at, ids),
            batch,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateBatch,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        let current = &self.batches[self.batch_index(&cmd.batch_id)?];
        let changes = &cmd.changes;
        let mut updated = current.clone();

        if let Some(status) = changes.status {
            if status != current.status {
                if current.status == BatchStatus::Reserved {
                    return Err(DomainError::invalid_state(
                        "reserved batches change status only through a release",
                    ));
                }
                if status == BatchStatus::Reserved {
                    return Err(DomainError::validation(
                        "status",
                        "use a reservation to move stock to reserved",
                    ));
                }
            }
            updated.status = status;
        }
        if let Some(cost) = changes.cost_per_unit {
            ensure_non_negative("costPerUnit", cost)?;
            updated.cost_per_unit = cost;
        }
        if let Some(expiry) = changes.expiry_date {
            updated.expiry_date = expiry;
        }
        if let Some(code) = &changes.supplier_batch_code {
            updated.supplier_batch_code = code.clone();
        }

        let movement = self.movement(&cmd.actor, cmd.occurred_at, ids);
        if let Some(quantity) = changes.quantity {
            ensure_non_negative("quantity", quantity)?;
            if is_depleted(quantity) {
                return Ok(vec![InventoryEvent::BatchRemoved(BatchRemoved {
                    movement,
                    batch_id: current.batch_id.clone(),
                    quantity: current.quantity,
                })]);
            }
            updated.quantity = quantity;
        }

        Ok(vec![InventoryEvent::BatchUpdated(BatchUpdated {
            movement,
            batch: updated,
        })])
    }

    fn handle_remove(
        &self,
        cmd: &RemoveBatch,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        let batch = &self.batches[self.batch_index(&cmd.batch_id)?];
        Ok(vec![InventoryEvent::BatchRemoved(BatchRemoved {
            movement: self.movement(&cmd.actor, cmd.occurred_at, ids),
            batch_id: batch.batch_id.clone(),
            quantity: batch.quantity,
        })])
    }

    fn handle_reserve(
        &self,
        cmd: &ReserveQuantity,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        ensure_positive("quantity", cmd.quantity)?;

        let plan = match &cmd.batch_id {
            Some(batch_id) => {
                let idx = self.batch_index(batch_id)?;
                let batch = &self.batches[idx];
                let usable = if batch.status == BatchStatus::Available {
                    batch.quantity
                } else {
                    0.0
                };
                if usable < cmd.quantity {
                    return Err(DomainError::insufficient_stock(cmd.quantity, usable));
                }
                vec![(idx, cmd.quantity)]
            }
            None => {
                let order = ordered_indices(
                    &self.batches,
                    BatchStatus::Available,
                    ConsumptionMethod::Fifo,
                    |b| b.received_date,
                );
                plan_draw(&self.batches, &order, cmd.quantity).ok_or_else(|| {
                    DomainError::insufficient_stock(cmd.quantity, self.totals.available)
                })?
            }
        };

        let mut allocations: Vec<ReservedSlice> = Vec::with_capacity(plan.len());
        for (idx, quantity) in plan {
            let source = &self.batches[idx];
            let reserved_batch_id = self.fresh_fragment_id(&source.batch_id, ids, &allocations)?;
            allocations.push(ReservedSlice {
                source_batch_id: source.batch_id.clone(),
                reserved_batch_id,
                quantity,
            });
        }

        Ok(vec![InventoryEvent::QuantityReserved(QuantityReserved {
            movement: self.movement(&cmd.actor, cmd.occurred_at, ids),
            allocations,
        })])
    }

    fn handle_release(
        &self,
        cmd: &ReleaseReservation,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        ensure_positive("quantity", cmd.quantity)?;

        let plan = match &cmd.batch_id {
            Some(batch_id) => {
                let idx = self.batch_index(batch_id)?;
                let batch = &self.batches[idx];
                if batch.status != BatchStatus::Reserved {
                    return Err(DomainError::invalid_state(format!(
                        "batch `{batch_id}` is {}, not reserved",
                        batch.status
                    )));
                }
                if batch.quantity < cmd.quantity {
                    return Err(DomainError::insufficient_stock(cmd.quantity, batch.quantity));
                }
                vec![(idx, cmd.quantity)]
            }
            None => {
                let order = ordered_indices(
                    &self.batches,
                    BatchStatus::Reserved,
                    ConsumptionMethod::Lifo,
                    Batch::reservation_time,
                );
                plan_draw(&self.batches, &order, cmd.quantity).ok_or_else(|| {
                    DomainError::insufficient_stock(cmd.quantity, self.totals.reserved)
                })?
            }
        };

        // Resolve targets against a scratch copy so that several fragments of
        // one origin released together land in the same batch.
        let mut scratch = self.batches.clone();
        let mut releases = Vec::with_capacity(plan.len());
        for (idx, quantity) in plan {
            let fragment = &self.batches[idx];
            let origin = fragment
                .origin_batch_id()
                .and_then(|origin_id| scratch.iter().find(|b| b.batch_id == origin_id));

            let target = match origin {
                Some(batch) if batch.status == BatchStatus::Available => ReleaseTarget::Merge {
                    batch_id: batch.batch_id.clone(),
                },
                found => {
                    let batch_id = match (found, fragment.origin_batch_id()) {
                        (None, Some(origin_id)) => origin_id.to_string(),
                        _ => self.fresh_batch_id(ids, &scratch)?,
                    };
                    ReleaseTarget::Restore {
                        batch: Batch {
                            batch_id,
                            quantity,
                            status: BatchStatus::Available,
                            reserved_from: None,
                            reserved_at: None,
                            ..fragment.clone()
                        },
                    }
                }
            };

            let slice = ReleasedSlice {
                reserved_batch_id: fragment.batch_id.clone(),
                quantity,
                target,
            };
            release_slice(&mut scratch, &slice);
            releases.push(slice);
        }

        Ok(vec![InventoryEvent::ReservationReleased(ReservationReleased {
            movement: self.movement(&cmd.actor, cmd.occurred_at, ids),
            releases,
        })])
    }

    fn handle_consume(
        &self,
        cmd: &ConsumeQuantity,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        ensure_positive("quantity", cmd.quantity)?;

        let order = ordered_indices(&self.batches, BatchStatus::Available, cmd.method, |b| {
            b.received_date
        });
        let plan = plan_draw(&self.batches, &order, cmd.quantity)
            .ok_or_else(|| DomainError::insufficient_stock(cmd.quantity, self.totals.available))?;

        let consumed = plan
            .into_iter()
            .map(|(idx, quantity)| ConsumedBatch {
                batch_id: self.batches[idx].batch_id.clone(),
                quantity,
                cost_per_unit: self.batches[idx].cost_per_unit,
            })
            .collect();

        Ok(vec![InventoryEvent::QuantityConsumed(QuantityConsumed {
            movement: self.movement(&cmd.actor, cmd.occurred_at, ids),
            method: cmd.method,
            consumed,
        })])
    }

    fn handle_mark_expired(
        &self,
        cmd: &MarkExpiredBatches,
        ids: &dyn IdGenerator,
    ) -> DomainResult<Vec<InventoryEvent>> {
        let batch_ids: Vec<String> = self
            .batches_expiring_before(cmd.now)
            .into_iter()
            .map(|b| b.batch_id.clone())
            .collect();

        if batch_ids.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::BatchesExpired(BatchesExpired {
            movement: self.movement(&cmd.actor, cmd.now, ids),
            batch_ids,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use venueops_core::SequentialIdGenerator;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn inventory() -> Inventory {
        Inventory::new(
            InventoryKey::new("prod-champagne", "loc-main-hall"),
            "Champagne",
            "Main hall",
            "bottle",
        )
    }

    fn add(id: &str, qty: f64, cost: f64, received: DateTime<Utc>) -> InventoryCommand {
        InventoryCommand::AddBatch(AddBatch {
            batch_id: Some(id.to_string()),
            quantity: qty,
            unit: None,
            cost_per_unit: cost,
            received_date: Some(received),
            expiry_date: None,
            supplier_batch_code: None,
            status: None,
            actor: "admin".to_string(),
            occurred_at: received,
        })
    }

    fn reserve(qty: f64, batch_id: Option<&str>) -> InventoryCommand {
        InventoryCommand::ReserveQuantity(ReserveQuantity {
            quantity: qty,
            batch_id: batch_id.map(str::to_string),
            actor: "planner".to_string(),
            occurred_at: t0() + Duration::days(10),
        })
    }

    fn release(qty: f64, batch_id: Option<&str>) -> InventoryCommand {
        InventoryCommand::ReleaseReservation(ReleaseReservation {
            quantity: qty,
            batch_id: batch_id.map(str::to_string),
            actor: "planner".to_string(),
            occurred_at: t0() + Duration::days(11),
        })
    }

    fn consume(qty: f64, method: ConsumptionMethod) -> InventoryCommand {
        InventoryCommand::ConsumeQuantity(ConsumeQuantity {
            quantity: qty,
            method,
            actor: "kitchen".to_string(),
            occurred_at: t0() + Duration::days(12),
        })
    }

    fn quantities(inv: &Inventory) -> Vec<(String, f64, BatchStatus)> {
        inv.batches()
            .iter()
            .map(|b| (b.batch_id.clone(), b.quantity, b.status))
            .collect()
    }

    #[test]
    fn reservation_fragments_never_reuse_an_existing_batch_id() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 2.0, t0()), &ids).unwrap();
        inv.execute(&add("A-R1", 5.0, 2.0, t0() + Duration::days(1)), &ids)
            .unwrap();

        inv.execute(&reserve(3.0, Some("A")), &SequentialIdGenerator::new())
            .unwrap();

        assert_eq!(
            quantities(&inv),
            vec![
                ("A".to_string(), 7.0, BatchStatus::Available),
                ("A-R1".to_string(), 5.0, BatchStatus::Available),
                ("A-R2".to_string(), 3.0, BatchStatus::Reserved),
            ]
        );
        assert_eq!(inv.batches()[2].reserved_from.as_deref(), Some("A"));
        assert!(inv.verify_totals().is_ok());
    }

    #[test]
    fn reserve_then_consume_scenario() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("LOT-1", 100.0, 12.5, t0()), &ids).unwrap();

        inv.execute(&reserve(30.0, None), &ids).unwrap();
        assert_eq!(inv.batches().len(), 2);
        assert_eq!(inv.batches()[0].quantity, 70.0);
        assert_eq!(inv.batches()[0].status, BatchStatus::Available);
        let fragment = &inv.batches()[1];
        assert_eq!(fragment.quantity, 30.0);
        assert_eq!(fragment.status, BatchStatus::Reserved);
        assert!(fragment.batch_id.starts_with("LOT-1-R"));
        assert_eq!(fragment.reserved_from.as_deref(), Some("LOT-1"));
        assert_eq!(inv.totals().available, 70.0);
        assert_eq!(inv.totals().reserved, 30.0);

        let events = inv
            .execute(&consume(70.0, ConsumptionMethod::Fifo), &ids)
            .unwrap();
        assert_eq!(
            consumed_breakdown(&events),
            vec![ConsumedBatch {
                batch_id: "LOT-1".to_string(),
                quantity: 70.0,
                cost_per_unit: 12.5,
            }]
        );
        assert_eq!(inv.batches().len(), 1);
        assert_eq!(inv.batches()[0].status, BatchStatus::Reserved);
        assert_eq!(inv.batches()[0].quantity, 30.0);
        assert_eq!(inv.totals().available, 0.0);
        assert_eq!(inv.totals().reserved, 30.0);
    }

    #[test]
    fn fifo_reserve_touches_only_the_oldest_batch() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        // Inserted newest first: order must come from receivedDate.
        inv.execute(&add("NEW", 50.0, 10.0, t0() + Duration::days(3)), &ids)
            .unwrap();
        inv.execute(&add("OLD", 40.0, 8.0, t0()), &ids).unwrap();

        let events = inv.execute(&reserve(25.0, None), &ids).unwrap();
        let InventoryEvent::QuantityReserved(reserved) = &events[0] else {
            panic!("expected QuantityReserved");
        };
        assert_eq!(reserved.allocations.len(), 1);
        assert_eq!(reserved.allocations[0].source_batch_id, "OLD");
        assert_eq!(inv.batch("NEW").unwrap().quantity, 50.0);
        assert_eq!(inv.batch("OLD").unwrap().quantity, 15.0);
    }

    #[test]
    fn fifo_reserve_spans_batches_and_splits_the_last() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&add("B", 10.0, 2.0, t0() + Duration::days(1)), &ids)
            .unwrap();

        inv.execute(&reserve(14.0, None), &ids).unwrap();
        assert!(inv.batch("A").is_none());
        assert_eq!(inv.batch("B").unwrap().quantity, 6.0);
        let reserved: Vec<_> = inv.batches_with_status(BatchStatus::Reserved).collect();
        assert_eq!(reserved.len(), 2);
        assert_eq!(reserved[0].reserved_from.as_deref(), Some("A"));
        assert_eq!(reserved[0].cost_per_unit, 1.0);
        assert_eq!(reserved[1].reserved_from.as_deref(), Some("B"));
        assert_eq!(inv.totals().reserved, 14.0);
        assert_eq!(inv.totals().available, 6.0);
    }

    #[test]
    fn insufficient_stock_leaves_record_unchanged() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&add("B", 5.0, 1.0, t0()), &ids).unwrap();
        let before = inv.clone();

        let err = inv.execute(&reserve(15.5, None), &ids).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(15.5, 15.0));
        assert_eq!(inv, before);

        let err = inv
            .execute(&consume(16.0, ConsumptionMethod::Lifo), &ids)
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(inv, before);
    }

    #[test]
    fn reserve_from_specific_batch() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&add("B", 10.0, 1.0, t0() + Duration::days(1)), &ids)
            .unwrap();

        inv.execute(&reserve(4.0, Some("B")), &ids).unwrap();
        assert_eq!(inv.batch("A").unwrap().quantity, 10.0);
        assert_eq!(inv.batch("B").unwrap().quantity, 6.0);

        let err = inv.execute(&reserve(7.0, Some("B")), &ids).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(7.0, 6.0));

        let err = inv.execute(&reserve(1.0, Some("ZZZ")), &ids).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "batch", .. }));

        let fragment_id = inv
            .batches_with_status(BatchStatus::Reserved)
            .next()
            .unwrap()
            .batch_id
            .clone();
        let err = inv
            .execute(&reserve(1.0, Some(&fragment_id)), &ids)
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(1.0, 0.0));
    }

    #[test]
    fn release_by_id_merges_back_into_origin() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 20.0, 3.0, t0()), &ids).unwrap();
        inv.execute(&reserve(8.0, None), &ids).unwrap();
        let fragment_id = inv.batches()[1].batch_id.clone();

        inv.execute(&release(3.0, Some(&fragment_id)), &ids).unwrap();
        assert_eq!(inv.batch("A").unwrap().quantity, 15.0);
        assert_eq!(inv.batch(&fragment_id).unwrap().quantity, 5.0);

        inv.execute(&release(5.0, Some(&fragment_id)), &ids).unwrap();
        assert!(inv.batch(&fragment_id).is_none());
        assert_eq!(quantities(&inv), vec![("A".to_string(), 20.0, BatchStatus::Available)]);
    }

    #[test]
    fn release_recreates_an_origin_that_was_used_up() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 4.0, t0()), &ids).unwrap();
        inv.execute(&reserve(4.0, None), &ids).unwrap();
        inv.execute(&consume(6.0, ConsumptionMethod::Fifo), &ids)
            .unwrap();
        assert!(inv.batch("A").is_none());

        inv.execute(&release(4.0, None), &ids).unwrap();
        let restored = inv.batch("A").unwrap();
        assert_eq!(restored.quantity, 4.0);
        assert_eq!(restored.status, BatchStatus::Available);
        assert_eq!(restored.cost_per_unit, 4.0);
        assert_eq!(restored.received_date, t0());
        assert_eq!(restored.reserved_from, None);
        assert_eq!(inv.totals().available, 4.0);
        assert_eq!(inv.totals().reserved, 0.0);
    }

    #[test]
    fn release_into_quarantined_origin_gets_a_fresh_batch() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 4.0, t0()), &ids).unwrap();
        inv.execute(&reserve(4.0, None), &ids).unwrap();
        inv.execute(
            &InventoryCommand::UpdateBatch(UpdateBatch {
                batch_id: "A".to_string(),
                changes: BatchChanges {
                    status: Some(BatchStatus::Quarantine),
                    ..BatchChanges::default()
                },
                actor: "qa".to_string(),
                occurred_at: t0(),
            }),
            &ids,
        )
        .unwrap();

        inv.execute(&release(4.0, None), &ids).unwrap();
        assert_eq!(inv.batch("A").unwrap().quantity, 6.0);
        let restored: Vec<_> = inv.batches_with_status(BatchStatus::Available).collect();
        assert_eq!(restored.len(), 1);
        assert_ne!(restored[0].batch_id, "A");
        assert_eq!(restored[0].quantity, 4.0);
        assert_eq!(inv.totals().quarantine, 6.0);
        assert_eq!(inv.totals().available, 4.0);
    }

    #[test]
    fn release_without_id_is_lifo_by_reservation_time() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&add("B", 10.0, 2.0, t0() + Duration::days(1)), &ids)
            .unwrap();
        inv.execute(&reserve(3.0, Some("B")), &ids).unwrap();
        // Reserved later, so released first.
        inv.execute(
            &InventoryCommand::ReserveQuantity(ReserveQuantity {
                quantity: 2.0,
                batch_id: Some("A".to_string()),
                actor: "planner".to_string(),
                occurred_at: t0() + Duration::days(20),
            }),
            &ids,
        )
        .unwrap();

        inv.execute(&release(2.0, None), &ids).unwrap();
        assert_eq!(inv.batch("A").unwrap().quantity, 10.0);
        assert_eq!(inv.batch("B").unwrap().quantity, 7.0);
        assert_eq!(inv.totals().reserved, 3.0);
    }

    #[test]
    fn release_rejects_non_reserved_and_oversized_requests() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        let err = inv.execute(&release(1.0, Some("A")), &ids).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));

        let err = inv.execute(&release(1.0, None), &ids).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(1.0, 0.0));

        inv.execute(&reserve(2.0, None), &ids).unwrap();
        let fragment_id = inv.batches()[1].batch_id.clone();
        let err = inv
            .execute(&release(2.5, Some(&fragment_id)), &ids)
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(2.5, 2.0));
    }

    #[test]
    fn legacy_fragment_without_reserved_from_uses_id_suffix() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 5.0, 1.0, t0()), &ids).unwrap();
        inv.batches.push(Batch {
            batch_id: "A-R1714000000000".to_string(),
            quantity: 2.0,
            unit: "bottle".to_string(),
            cost_per_unit: 1.0,
            received_date: t0(),
            expiry_date: None,
            supplier_batch_code: None,
            status: BatchStatus::Reserved,
            reserved_from: None,
            reserved_at: None,
        });
        inv.recalculate_totals();

        inv.execute(&release(2.0, Some("A-R1714000000000")), &ids)
            .unwrap();
        assert_eq!(quantities(&inv), vec![("A".to_string(), 7.0, BatchStatus::Available)]);
    }

    #[test]
    fn consume_lifo_draws_newest_first() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("OLD", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&add("NEW", 10.0, 3.0, t0() + Duration::days(2)), &ids)
            .unwrap();

        let events = inv
            .execute(&consume(12.0, ConsumptionMethod::Lifo), &ids)
            .unwrap();
        let breakdown = consumed_breakdown(&events);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].batch_id, "NEW");
        assert_eq!(breakdown[0].quantity, 10.0);
        assert_eq!(breakdown[0].cost_per_unit, 3.0);
        assert_eq!(breakdown[1].batch_id, "OLD");
        assert_eq!(breakdown[1].quantity, 2.0);
        assert_eq!(inv.batch("OLD").unwrap().quantity, 8.0);
        assert!(inv.batch("NEW").is_none());
    }

    #[test]
    fn mark_expired_is_idempotent_and_excludes_from_totals() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(
            &InventoryCommand::AddBatch(AddBatch {
                expiry_date: Some(t0() + Duration::days(5)),
                ..match add("MILK", 6.0, 1.2, t0()) {
                    InventoryCommand::AddBatch(cmd) => cmd,
                    _ => unreachable!(),
                }
            }),
            &ids,
        )
        .unwrap();
        inv.execute(&add("WATER", 24.0, 0.3, t0()), &ids).unwrap();

        let sweep = |now| {
            InventoryCommand::MarkExpiredBatches(MarkExpiredBatches {
                now,
                actor: "scheduler".to_string(),
            })
        };

        assert!(inv.execute(&sweep(t0() + Duration::days(4)), &ids).unwrap().is_empty());
        let events = inv.execute(&sweep(t0() + Duration::days(5)), &ids).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(inv.batch("MILK").unwrap().status, BatchStatus::Expired);
        assert_eq!(inv.totals().available, 24.0);

        let version = inv.version();
        assert!(inv.execute(&sweep(t0() + Duration::days(30)), &ids).unwrap().is_empty());
        assert_eq!(inv.version(), version);
    }

    #[test]
    fn update_to_zero_removes_the_batch() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();

        let update = |changes| {
            InventoryCommand::UpdateBatch(UpdateBatch {
                batch_id: "A".to_string(),
                changes,
                actor: "admin".to_string(),
                occurred_at: t0(),
            })
        };

        inv.execute(
            &update(BatchChanges {
                quantity: Some(7.0),
                cost_per_unit: Some(1.5),
                supplier_batch_code: Some(Some("SUP-88".to_string())),
                ..BatchChanges::default()
            }),
            &ids,
        )
        .unwrap();
        let batch = inv.batch("A").unwrap();
        assert_eq!(batch.quantity, 7.0);
        assert_eq!(batch.cost_per_unit, 1.5);
        assert_eq!(batch.supplier_batch_code.as_deref(), Some("SUP-88"));
        assert_eq!(inv.totals().available, 7.0);

        let err = inv
            .execute(
                &update(BatchChanges {
                    quantity: Some(-1.0),
                    ..BatchChanges::default()
                }),
                &ids,
            )
            .unwrap_err();
        assert_eq!(err.field(), Some("quantity"));

        let events = inv
            .execute(
                &update(BatchChanges {
                    quantity: Some(0.0),
                    ..BatchChanges::default()
                }),
                &ids,
            )
            .unwrap();
        assert!(matches!(events[0], InventoryEvent::BatchRemoved(_)));
        assert!(!inv.has_stock());
        assert_eq!(inv.totals().available, 0.0);
    }

    #[test]
    fn add_batch_validation() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();

        let err = inv.execute(&add("A", 1.0, 1.0, t0()), &ids).unwrap_err();
        assert_eq!(err.field(), Some("batchId"));

        let err = inv.execute(&add("Z", 0.0, 1.0, t0()), &ids).unwrap_err();
        assert_eq!(err.field(), Some("quantity"));

        let err = inv.execute(&add("Z", 1.0, -0.5, t0()), &ids).unwrap_err();
        assert_eq!(err.field(), Some("costPerUnit"));

        let mismatched = InventoryCommand::AddBatch(AddBatch {
            unit: Some("case".to_string()),
            ..match add("Z", 1.0, 1.0, t0()) {
                InventoryCommand::AddBatch(cmd) => cmd,
                _ => unreachable!(),
            }
        });
        let err = inv.execute(&mismatched, &ids).unwrap_err();
        assert_eq!(err.field(), Some("unit"));
    }

    #[test]
    fn add_batch_generates_ids_and_tracks_movement() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        let cmd = InventoryCommand::AddBatch(AddBatch {
            batch_id: None,
            quantity: 12.0,
            unit: Some("bottle".to_string()),
            cost_per_unit: 9.0,
            received_date: None,
            expiry_date: None,
            supplier_batch_code: None,
            status: Some(BatchStatus::Quarantine),
            actor: "receiving".to_string(),
            occurred_at: t0(),
        });
        inv.execute(&cmd, &ids).unwrap();

        let batch = &inv.batches()[0];
        assert_eq!(batch.batch_id, "B-1");
        assert_eq!(batch.received_date, t0());
        assert_eq!(inv.totals().quarantine, 12.0);
        assert_eq!(inv.last_movement_id(), Some("MOV-2"));
        assert_eq!(inv.last_updated_by(), Some("receiving"));
        assert_eq!(inv.last_updated(), Some(t0()));
        assert_eq!(inv.version(), 1);
    }

    #[test]
    fn remove_unknown_batch_is_not_found() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        let err = inv
            .execute(
                &InventoryCommand::RemoveBatch(RemoveBatch {
                    batch_id: "nope".to_string(),
                    actor: "admin".to_string(),
                    occurred_at: t0(),
                }),
                &ids,
            )
            .unwrap_err();
        assert_eq!(err, DomainError::not_found("batch", "nope"));
    }

    #[test]
    fn verify_totals_detects_drift_in_loaded_documents() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        assert!(inv.verify_totals().is_ok());

        inv.totals.available = 11.0;
        assert_eq!(inv.verify_totals().unwrap_err().field(), Some("totals.available"));
        inv.recalculate_totals();
        assert!(inv.verify_totals().is_ok());
    }

    #[test]
    fn document_round_trips_through_json_in_camel_case() {
        let ids = SequentialIdGenerator::new();
        let mut inv = inventory();
        inv.execute(&add("A", 10.0, 1.0, t0()), &ids).unwrap();
        inv.execute(&reserve(4.0, None), &ids).unwrap();

        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["productId"], "prod-champagne");
        assert_eq!(json["locationId"], "loc-main-hall");
        assert_eq!(json["totals"]["reserved"], 4.0);
        assert_eq!(json["batches"][1]["status"], "reserved");
        assert_eq!(json["batches"][1]["reservedFrom"], "A");

        let back: Inventory = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(u32, i64),
            Reserve(u32),
            Release(u32),
            Consume(u32, bool),
            Expire(i64),
            Quarantine(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1u32..50, 0i64..30).prop_map(|(q, d)| Op::Add(q, d)),
                (1u32..60).prop_map(Op::Reserve),
                (1u32..60).prop_map(Op::Release),
                (1u32..60, any::<bool>()).prop_map(|(q, fifo)| Op::Consume(q, fifo)),
                (0i64..40).prop_map(Op::Expire),
                (0usize..8).prop_map(Op::Quarantine),
            ]
        }

        fn to_command(inv: &Inventory, op: &Op) -> Option<InventoryCommand> {
            let cmd = match op {
                Op::Add(q, d) => InventoryCommand::AddBatch(AddBatch {
                    batch_id: None,
                    quantity: f64::from(*q),
                    unit: None,
                    cost_per_unit: 2.0,
                    received_date: Some(t0() + Duration::days(*d)),
                    expiry_date: Some(t0() + Duration::days(*d + 15)),
                    supplier_batch_code: None,
                    status: None,
                    actor: "prop".to_string(),
                    occurred_at: t0(),
                }),
                Op::Reserve(q) => reserve(f64::from(*q), None),
                Op::Release(q) => release(f64::from(*q), None),
                Op::Consume(q, fifo) => consume(
                    f64::from(*q),
                    if *fifo {
                        ConsumptionMethod::Fifo
                    } else {
                        ConsumptionMethod::Lifo
                    },
                ),
                Op::Expire(d) => InventoryCommand::MarkExpiredBatches(MarkExpiredBatches {
                    now: t0() + Duration::days(*d),
                    actor: "prop".to_string(),
                }),
                Op::Quarantine(i) => {
                    let batch = inv.batches().get(*i)?;
                    InventoryCommand::UpdateBatch(UpdateBatch {
                        batch_id: batch.batch_id.clone(),
                        changes: BatchChanges {
                            status: Some(BatchStatus::Quarantine),
                            ..BatchChanges::default()
                        },
                        actor: "prop".to_string(),
                        occurred_at: t0(),
                    })
                }
            };
            Some(cmd)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: after every call, cached totals equal the batch sums,
            /// no depleted batch is retained, and failures change nothing.
            #[test]
            fn totals_invariant_holds_after_every_operation(
                ops in prop::collection::vec(op(), 1..40)
            ) {
                let ids = SequentialIdGenerator::new();
                let mut inv = inventory();
                for op in &ops {
                    let Some(cmd) = to_command(&inv, op) else { continue };
                    let before = inv.clone();
                    if inv.execute(&cmd, &ids).is_err() {
                        prop_assert_eq!(&inv, &before);
                    }
                    prop_assert!(inv.verify_totals().is_ok());
                    prop_assert!(inv.batches().iter().all(|b| b.quantity > 0.0));
                }
            }

            /// Property: reserve(q) followed by release(q) restores available stock.
            #[test]
            fn reserve_then_release_conserves_available(
                batches in prop::collection::vec((1u32..100, 0i64..30), 1..6),
                q in 1u32..200
            ) {
                let ids = SequentialIdGenerator::new();
                let mut inv = inventory();
                for (qty, day) in &batches {
                    inv.execute(&add(&ids.next_id("LOT"), f64::from(*qty), 1.0, t0() + Duration::days(*day)), &ids).unwrap();
                }
                let available = inv.totals().available;
                let q = f64::from(q);

                match inv.execute(&reserve(q, None), &ids) {
                    Ok(_) => {
                        inv.execute(&release(q, None), &ids).unwrap();
                        prop_assert_eq!(inv.totals().available, available);
                        prop_assert_eq!(inv.totals().reserved, 0.0);
                        prop_assert_eq!(inv.batches().len(), batches.len());
                    }
                    Err(err) => {
                        prop_assert!(q > available);
                        let is_insufficient = matches!(err, DomainError::InsufficientStock { .. });
                        prop_assert!(is_insufficient);
                    }
                }
            }
        }
    }
}
