use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use venueops_core::numeric::{MONEY_TOLERANCE, approx_eq, ensure_non_negative, ensure_positive};
use venueops_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, IdGenerator, ProductId, PurchaseOrderId,
    SupplierId,
};
use venueops_events::Event;

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Draft,
    Pending,
    Approved,
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled => true,
            PurchaseOrderStatus::Draft
            | PurchaseOrderStatus::Pending
            | PurchaseOrderStatus::Approved
            | PurchaseOrderStatus::Ordered => false,
        }
    }

    /// Items and tax rate may only change before approval.
    pub fn is_modifiable(self) -> bool {
        match self {
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Pending => true,
            PurchaseOrderStatus::Approved
            | PurchaseOrderStatus::Ordered
            | PurchaseOrderStatus::Received
            | PurchaseOrderStatus::Cancelled => false,
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Pending => "pending",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    Card,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    pub method: PaymentMethod,
    #[serde(default)]
    pub credit_days: u32,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Purchase order line item. `total_price` is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Line item as supplied by a caller (no derived fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
}

impl ItemInput {
    fn validate(&self) -> DomainResult<()> {
        if self.product_id.as_str().trim().is_empty() {
            return Err(DomainError::validation(
                "items.productId",
                "product id cannot be empty",
            ));
        }
        ensure_positive("items.quantity", self.quantity)?;
        ensure_non_negative("items.unitPrice", self.unit_price)?;
        Ok(())
    }

    fn into_item(self) -> PurchaseOrderItem {
        PurchaseOrderItem {
            total_price: self.quantity * self.unit_price,
            product_id: self.product_id,
            product_name: self.product_name,
            quantity: self.quantity,
            unit: self.unit,
            unit_price: self.unit_price,
        }
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    purchase_order_id: PurchaseOrderId,
    supplier_id: Option<SupplierId>,
    supplier_name: String,
    status: PurchaseOrderStatus,
    items: Vec<PurchaseOrderItem>,
    subtotal: f64,
    tax_rate: f64,
    tax: f64,
    total: f64,
    payment_terms: PaymentTerms,
    expected_delivery_date: Option<DateTime<Utc>>,
    actual_delivery_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: Option<DateTime<Utc>>,
    submitted_by: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    ordered_by: Option<String>,
    ordered_at: Option<DateTime<Utc>>,
    received_by: Option<String>,
    received_at: Option<DateTime<Utc>>,
    cancelled_by: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    version: u64,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            purchase_order_id: id,
            supplier_id: None,
            supplier_name: String::new(),
            status: PurchaseOrderStatus::Draft,
            items: Vec::new(),
            subtotal: 0.0,
            tax_rate: 0.0,
            tax: 0.0,
            total: 0.0,
            payment_terms: PaymentTerms::default(),
            expected_delivery_date: None,
            actual_delivery_date: None,
            notes: None,
            created_by: None,
            created_at: None,
            submitted_by: None,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            ordered_by: None,
            ordered_at: None,
            received_by: None,
            received_at: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            updated_at: None,
            version: 0,
        }
    }

    pub fn purchase_order_id(&self) -> &PurchaseOrderId {
        &self.purchase_order_id
    }

    pub fn is_created(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn supplier_id(&self) -> Option<&SupplierId> {
        self.supplier_id.as_ref()
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| &i.product_id == product_id)
    }

    pub fn subtotal(&self) -> f64 {
        self.subtotal
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn tax(&self) -> f64 {
        self.tax
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn payment_terms(&self) -> &PaymentTerms {
        &self.payment_terms
    }

    pub fn expected_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.expected_delivery_date
    }

    pub fn actual_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.actual_delivery_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn ordered_by(&self) -> Option<&str> {
        self.ordered_by.as_deref()
    }

    pub fn ordered_at(&self) -> Option<DateTime<Utc>> {
        self.ordered_at
    }

    pub fn received_by(&self) -> Option<&str> {
        self.received_by.as_deref()
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn cancelled_by(&self) -> Option<&str> {
        self.cancelled_by.as_deref()
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Recompute every item's `total_price`, then subtotal, tax and total.
    pub fn recalculate_totals(&mut self) {
        for item in &mut self.items {
            item.total_price = item.quantity * item.unit_price;
        }
        self.subtotal = self.items.iter().map(|i| i.total_price).sum();
        self.tax = self.subtotal * self.tax_rate;
        self.total = self.subtotal + self.tax;
    }

    /// Check the document's invariants; the first violation names its field.
    pub fn validate(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "items",
                "a purchase order needs at least one item",
            ));
        }

        for (idx, item) in self.items.iter().enumerate() {
            ensure_positive(&format!("items[{idx}].quantity"), item.quantity)?;
            ensure_non_negative(&format!("items[{idx}].unitPrice"), item.unit_price)?;
            if !approx_eq(item.total_price, item.quantity * item.unit_price, MONEY_TOLERANCE) {
                return Err(DomainError::validation(
                    format!("items[{idx}].totalPrice"),
                    "must equal quantity × unitPrice",
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.tax_rate) {
            return Err(DomainError::validation(
                "taxRate",
                format!("must be between 0 and 1 (got {})", self.tax_rate),
            ));
        }

        let subtotal: f64 = self.items.iter().map(|i| i.total_price).sum();
        if !approx_eq(self.subtotal, subtotal, MONEY_TOLERANCE) {
            return Err(DomainError::validation(
                "subtotal",
                "must equal the sum of item totals",
            ));
        }
        if !approx_eq(self.tax, self.subtotal * self.tax_rate, MONEY_TOLERANCE) {
            return Err(DomainError::validation("tax", "must equal subtotal × taxRate"));
        }
        if !approx_eq(self.total, self.subtotal + self.tax, MONEY_TOLERANCE) {
            return Err(DomainError::validation("total", "must equal subtotal + tax"));
        }

        let (field, actor) = match self.status {
            PurchaseOrderStatus::Draft => ("createdBy", &self.created_by),
            PurchaseOrderStatus::Pending => ("submittedBy", &self.submitted_by),
            PurchaseOrderStatus::Approved => ("approvedBy", &self.approved_by),
            PurchaseOrderStatus::Ordered => ("orderedBy", &self.ordered_by),
            PurchaseOrderStatus::Received => ("receivedBy", &self.received_by),
            PurchaseOrderStatus::Cancelled => ("cancelledBy", &self.cancelled_by),
        };
        if actor.as_deref().is_none_or(|a| a.trim().is_empty()) {
            return Err(DomainError::validation(
                field,
                format!("required once status is {}", self.status),
            ));
        }
        if self.status == PurchaseOrderStatus::Cancelled
            && self
                .cancellation_reason
                .as_deref()
                .is_none_or(|r| r.trim().is_empty())
        {
            return Err(DomainError::validation(
                "cancellationReason",
                "required once status is cancelled",
            ));
        }

        Ok(())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.purchase_order_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseOrder {
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub items: Vec<ItemInput>,
    pub tax_rate: f64,
    #[serde(default)]
    pub payment_terms: PaymentTerms,
    #[serde(default)]
    pub expected_delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Start in `pending` instead of `draft`.
    #[serde(default)]
    pub submit: bool,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem (draft/pending only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub item: ItemInput,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Field changes for UpdateItem; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanges {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
}

/// Command: UpdateItem (draft/pending only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItem {
    pub product_id: ProductId,
    pub changes: ItemChanges,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem (draft/pending only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItem {
    pub product_id: ProductId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetTaxRate (draft/pending only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTaxRate {
    pub tax_rate: f64,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Actor + time for a plain status transition (submit, approve, mark ordered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveGoods {
    pub actor: String,
    /// Defaults to `occurred_at`.
    #[serde(default)]
    pub actual_delivery_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancel {
    pub actor: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    SetTaxRate(SetTaxRate),
    Submit(Transition),
    Approve(Transition),
    MarkOrdered(Transition),
    ReceiveGoods(ReceiveGoods),
    Cancel(Cancel),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderCreated {
    pub purchase_order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub status: PurchaseOrderStatus,
    pub items: Vec<PurchaseOrderItem>,
    pub tax_rate: f64,
    pub payment_terms: PaymentTerms,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded / ItemUpdated payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanged {
    pub item: PurchaseOrderItem,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRemoved {
    pub product_id: ProductId,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TaxRateChanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRateChanged {
    pub tax_rate: f64,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderOrdered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderOrdered {
    pub due_date: Option<DateTime<Utc>>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries what the calling layer needs to feed new batches into the ledger:
/// each item's quantity becomes a batch quantity, its unit price the batch cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoodsReceived {
    pub purchase_order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub items: Vec<PurchaseOrderItem>,
    pub actual_delivery_date: DateTime<Utc>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderCancelled {
    pub previous_status: PurchaseOrderStatus,
    pub reason: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    ItemAdded(ItemChanged),
    ItemUpdated(ItemChanged),
    ItemRemoved(ItemRemoved),
    TaxRateChanged(TaxRateChanged),
    PurchaseOrderSubmitted(Transition),
    PurchaseOrderApproved(Transition),
    PurchaseOrderOrdered(PurchaseOrderOrdered),
    GoodsReceived(GoodsReceived),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
}

impl PurchaseOrderEvent {
    fn actor(&self) -> &str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => &e.actor,
            PurchaseOrderEvent::ItemAdded(e) | PurchaseOrderEvent::ItemUpdated(e) => &e.actor,
            PurchaseOrderEvent::ItemRemoved(e) => &e.actor,
            PurchaseOrderEvent::TaxRateChanged(e) => &e.actor,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e)
            | PurchaseOrderEvent::PurchaseOrderApproved(e) => &e.actor,
            PurchaseOrderEvent::PurchaseOrderOrdered(e) => &e.actor,
            PurchaseOrderEvent::GoodsReceived(e) => &e.actor,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => &e.actor,
        }
    }
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::ItemAdded(_) => "purchasing.order.item_added",
            PurchaseOrderEvent::ItemUpdated(_) => "purchasing.order.item_updated",
            PurchaseOrderEvent::ItemRemoved(_) => "purchasing.order.item_removed",
            PurchaseOrderEvent::TaxRateChanged(_) => "purchasing.order.tax_rate_changed",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::PurchaseOrderOrdered(_) => "purchasing.order.ordered",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::ItemAdded(e) | PurchaseOrderEvent::ItemUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::ItemRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::TaxRateChanged(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e)
            | PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderOrdered(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let actor = Some(event.actor().to_string());
        let at = Some(event.occurred_at());

        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.purchase_order_id = e.purchase_order_id.clone();
                self.supplier_id = Some(e.supplier_id.clone());
                self.supplier_name = e.supplier_name.clone();
                self.status = e.status;
                self.items = e.items.clone();
                self.tax_rate = e.tax_rate;
                self.payment_terms = e.payment_terms.clone();
                self.expected_delivery_date = e.expected_delivery_date;
                self.notes = e.notes.clone();
                self.created_by = actor.clone();
                self.created_at = at;
                if e.status == PurchaseOrderStatus::Pending {
                    self.submitted_by = actor;
                    self.submitted_at = at;
                }
            }
            PurchaseOrderEvent::ItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            PurchaseOrderEvent::ItemUpdated(e) => {
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| i.product_id == e.item.product_id)
                {
                    *item = e.item.clone();
                }
            }
            PurchaseOrderEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.product_id != e.product_id);
            }
            PurchaseOrderEvent::TaxRateChanged(e) => {
                self.tax_rate = e.tax_rate;
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => {
                self.status = PurchaseOrderStatus::Pending;
                self.submitted_by = actor;
                self.submitted_at = at;
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => {
                self.status = PurchaseOrderStatus::Approved;
                self.approved_by = actor;
                self.approved_at = at;
            }
            PurchaseOrderEvent::PurchaseOrderOrdered(e) => {
                self.status = PurchaseOrderStatus::Ordered;
                self.ordered_by = actor;
                self.ordered_at = at;
                self.payment_terms.due_date = e.due_date;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                self.status = PurchaseOrderStatus::Received;
                self.received_by = actor;
                self.received_at = at;
                self.actual_delivery_date = Some(e.actual_delivery_date);
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => {
                self.status = PurchaseOrderStatus::Cancelled;
                self.cancelled_by = actor;
                self.cancelled_at = at;
                self.cancellation_reason = Some(e.reason.clone());
            }
        }

        self.recalculate_totals();
        self.updated_at = at;
        self.version += 1;
    }

    fn handle(
        &self,
        command: &Self::Command,
        _ids: &dyn IdGenerator,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let events = match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd)?,
            PurchaseOrderCommand::AddItem(cmd) => self.handle_add_item(cmd)?,
            PurchaseOrderCommand::UpdateItem(cmd) => self.handle_update_item(cmd)?,
            PurchaseOrderCommand::RemoveItem(cmd) => self.handle_remove_item(cmd)?,
            PurchaseOrderCommand::SetTaxRate(cmd) => self.handle_set_tax_rate(cmd)?,
            PurchaseOrderCommand::Submit(cmd) => self.handle_submit(cmd)?,
            PurchaseOrderCommand::Approve(cmd) => self.handle_approve(cmd)?,
            PurchaseOrderCommand::MarkOrdered(cmd) => self.handle_mark_ordered(cmd)?,
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd)?,
            PurchaseOrderCommand::Cancel(cmd) => self.handle_cancel(cmd)?,
        };

        // Nothing is accepted unless the resulting document validates.
        let mut next = self.clone();
        for event in &events {
            next.apply(event);
        }
        next.validate()?;

        Ok(events)
    }
}

impl PurchaseOrder {
    fn ensure_created(&self) -> DomainResult<()> {
        if !self.is_created() {
            return Err(DomainError::not_found(
                "purchase order",
                self.purchase_order_id.as_str(),
            ));
        }
        Ok(())
    }

    fn ensure_modifiable(&self) -> DomainResult<()> {
        self.ensure_created()?;
        if !self.status.is_modifiable() {
            return Err(DomainError::invalid_state(format!(
                "items can only change while the order is draft or pending (status: {})",
                self.status
            )));
        }
        Ok(())
    }

    /// Shared guard for the forward transitions.
    fn ensure_transition(
        &self,
        required: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
        actor: &str,
    ) -> DomainResult<()> {
        self.ensure_created()?;
        if self.status != required {
            return Err(DomainError::invalid_transition(
                self.status,
                to,
                format!("order must be {required}"),
            ));
        }
        if actor.trim().is_empty() {
            return Err(DomainError::invalid_transition(self.status, to, "actor is required"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePurchaseOrder) -> DomainResult<Vec<PurchaseOrderEvent>> {
        if self.is_created() {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.actor.trim().is_empty() {
            return Err(DomainError::validation("createdBy", "actor is required"));
        }
        if cmd.supplier_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("supplierId", "supplier is required"));
        }

        let mut items: Vec<PurchaseOrderItem> = Vec::with_capacity(cmd.items.len());
        for input in &cmd.items {
            input.validate()?;
            if items.iter().any(|i| i.product_id == input.product_id) {
                return Err(DomainError::validation(
                    "items.productId",
                    format!("product `{}` appears twice", input.product_id),
                ));
            }
            items.push(input.clone().into_item());
        }

        let status = if cmd.submit {
            PurchaseOrderStatus::Pending
        } else {
            PurchaseOrderStatus::Draft
        };

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                purchase_order_id: self.purchase_order_id.clone(),
                supplier_id: cmd.supplier_id.clone(),
                supplier_name: cmd.supplier_name.clone(),
                status,
                items,
                tax_rate: cmd.tax_rate,
                payment_terms: cmd.payment_terms.clone(),
                expected_delivery_date: cmd.expected_delivery_date,
                notes: cmd.notes.clone(),
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_modifiable()?;
        cmd.item.validate()?;
        if self.item(&cmd.item.product_id).is_some() {
            return Err(DomainError::validation(
                "items.productId",
                format!("product `{}` is already on the order", cmd.item.product_id),
            ));
        }

        Ok(vec![PurchaseOrderEvent::ItemAdded(ItemChanged {
            item: cmd.item.clone().into_item(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateItem) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_modifiable()?;
        let current = self
            .item(&cmd.product_id)
            .ok_or_else(|| DomainError::not_found("item", cmd.product_id.as_str()))?;

        let changes = &cmd.changes;
        let input = ItemInput {
            product_id: current.product_id.clone(),
            product_name: changes
                .product_name
                .clone()
                .unwrap_or_else(|| current.product_name.clone()),
            quantity: changes.quantity.unwrap_or(current.quantity),
            unit: changes.unit.clone().unwrap_or_else(|| current.unit.clone()),
            unit_price: changes.unit_price.unwrap_or(current.unit_price),
        };
        input.validate()?;

        Ok(vec![PurchaseOrderEvent::ItemUpdated(ItemChanged {
            item: input.into_item(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_modifiable()?;
        if self.item(&cmd.product_id).is_none() {
            return Err(DomainError::not_found("item", cmd.product_id.as_str()));
        }

        Ok(vec![PurchaseOrderEvent::ItemRemoved(ItemRemoved {
            product_id: cmd.product_id.clone(),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_tax_rate(&self, cmd: &SetTaxRate) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_modifiable()?;
        Ok(vec![PurchaseOrderEvent::TaxRateChanged(TaxRateChanged {
            tax_rate: cmd.tax_rate,
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &Transition) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_transition(
            PurchaseOrderStatus::Draft,
            PurchaseOrderStatus::Pending,
            &cmd.actor,
        )?;
        Ok(vec![PurchaseOrderEvent::PurchaseOrderSubmitted(cmd.clone())])
    }

    fn handle_approve(&self, cmd: &Transition) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_transition(
            PurchaseOrderStatus::Pending,
            PurchaseOrderStatus::Approved,
            &cmd.actor,
        )?;
        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(cmd.clone())])
    }

    fn handle_mark_ordered(&self, cmd: &Transition) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_transition(
            PurchaseOrderStatus::Approved,
            PurchaseOrderStatus::Ordered,
            &cmd.actor,
        )?;

        let due_date = self.payment_terms.due_date.or_else(|| {
            Some(cmd.occurred_at + Duration::days(i64::from(self.payment_terms.credit_days)))
        });

        Ok(vec![PurchaseOrderEvent::PurchaseOrderOrdered(
            PurchaseOrderOrdered {
                due_date,
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_transition(
            PurchaseOrderStatus::Ordered,
            PurchaseOrderStatus::Received,
            &cmd.actor,
        )?;

        let supplier_id = self.supplier_id.clone().ok_or_else(|| {
            DomainError::invalid_transition(
                self.status,
                PurchaseOrderStatus::Received,
                "supplier must be set",
            )
        })?;

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            purchase_order_id: self.purchase_order_id.clone(),
            supplier_id,
            supplier_name: self.supplier_name.clone(),
            items: self.items.clone(),
            actual_delivery_date: cmd.actual_delivery_date.unwrap_or(cmd.occurred_at),
            actor: cmd.actor.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> DomainResult<Vec<PurchaseOrderEvent>> {
        self.ensure_created()?;
        let to = PurchaseOrderStatus::Cancelled;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(
                self.status,
                to,
                "order is already closed",
            ));
        }
        if cmd.actor.trim().is_empty() {
            return Err(DomainError::invalid_transition(self.status, to, "actor is required"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::invalid_transition(
                self.status,
                to,
                "a cancellation reason is required",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                previous_status: self.status,
                reason: cmd.reason.clone(),
                actor: cmd.actor.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
