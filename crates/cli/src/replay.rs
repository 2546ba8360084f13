//! Replays a script against in-memory stores.

use std::sync::Arc;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use venueops_core::IdGenerator;
use venueops_infra::{
    CommandDispatcher, Committed, EngineConfig, InMemoryDocumentStore, LocationRef,
    ProcurementService, ServiceError, StockProfile,
};
use venueops_inventory::{ConsumeQuantity, ConsumedBatch, Inventory, InventoryKey};
use venueops_purchasing::{CreatePurchaseOrder, PurchaseOrder, ReceiveGoods};

use crate::script::{Script, Step};

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consumed: Vec<ConsumedBatch>,
}

/// Everything a replay produced: per-step outcomes and the final documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub steps: Vec<StepReport>,
    pub inventories: Vec<Inventory>,
    pub purchase_orders: Vec<PurchaseOrder>,
}

impl Report {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

#[derive(Debug, Default)]
struct StepOutput {
    events: Vec<String>,
    consumed: Vec<ConsumedBatch>,
}

impl StepOutput {
    fn from_committed<A, E>(committed: &Committed<A, E>) -> Self {
        Self {
            events: committed
                .events
                .iter()
                .map(|e| e.event_type().to_string())
                .collect(),
            consumed: vec![],
        }
    }
}

pub struct Replay {
    service: ProcurementService<InMemoryDocumentStore>,
    config: EngineConfig,
}

impl Replay {
    pub fn new(config: EngineConfig, ids: Arc<dyn IdGenerator>) -> Self {
        let dispatcher = CommandDispatcher::new(
            InMemoryDocumentStore::new(),
            ids,
            config.max_conflict_retries,
        );
        Self {
            service: ProcurementService::new(Arc::new(dispatcher)),
            config,
        }
    }

    /// Run every step in order. A failing step is recorded and the replay
    /// continues, unless `fail_fast` is set.
    pub fn run(&self, script: &Script, fail_fast: bool) -> Result<Report> {
        let mut steps = Vec::with_capacity(script.steps.len());

        for (index, step) in script.steps.iter().enumerate() {
            let op = step.op();
            match self.run_step(step) {
                Ok(output) => {
                    info!(index, op, events = output.events.len(), "step applied");
                    steps.push(StepReport {
                        index,
                        op,
                        ok: true,
                        error: None,
                        events: output.events,
                        consumed: output.consumed,
                    });
                }
                Err(err) => {
                    if fail_fast {
                        bail!("step {index} ({op}) failed: {err}");
                    }
                    warn!(index, op, error = %err, "step rejected");
                    steps.push(StepReport {
                        index,
                        op,
                        ok: false,
                        error: Some(err.to_string()),
                        events: vec![],
                        consumed: vec![],
                    });
                }
            }
        }

        Ok(Report {
            steps,
            inventories: self.service.inventory().list_inventories()?,
            purchase_orders: self.service.orders().list_purchase_orders()?,
        })
    }

    fn run_step(&self, step: &Step) -> Result<StepOutput, ServiceError> {
        match step {
            Step::ReceiveBatch {
                product_id,
                location_id,
                product_name,
                location_name,
                unit,
                batch,
            } => {
                let profile = StockProfile {
                    product_name: product_name.clone().unwrap_or_else(|| product_id.to_string()),
                    location_name: location_name.clone().unwrap_or_else(|| location_id.to_string()),
                    unit: unit.clone(),
                };
                let key = InventoryKey::new(product_id.clone(), location_id.clone());
                let committed = self
                    .service
                    .inventory()
                    .receive_batch(&key, &profile, batch.clone())?;
                Ok(StepOutput::from_committed(&committed))
            }
            Step::Inventory {
                product_id,
                location_id,
                command,
            } => {
                let key = InventoryKey::new(product_id.clone(), location_id.clone());
                let committed = self.service.inventory().execute(&key, command)?;
                Ok(StepOutput::from_committed(&committed))
            }
            Step::Consume {
                product_id,
                location_id,
                quantity,
                method,
                actor,
                occurred_at,
            } => {
                let key = InventoryKey::new(product_id.clone(), location_id.clone());
                let (committed, consumed) = self.service.inventory().consume(
                    &key,
                    ConsumeQuantity {
                        quantity: *quantity,
                        method: method.unwrap_or(self.config.default_consumption),
                        actor: actor.clone(),
                        occurred_at: *occurred_at,
                    },
                )?;
                Ok(StepOutput {
                    consumed,
                    ..StepOutput::from_committed(&committed)
                })
            }
            Step::CreatePurchaseOrder {
                purchase_order_id,
                supplier_id,
                supplier_name,
                items,
                tax_rate,
                payment_terms,
                expected_delivery_date,
                notes,
                submit,
                actor,
                occurred_at,
            } => {
                let committed = self.service.orders().create_purchase_order(
                    purchase_order_id,
                    CreatePurchaseOrder {
                        supplier_id: supplier_id.clone(),
                        supplier_name: supplier_name.clone(),
                        items: items.clone(),
                        tax_rate: tax_rate.unwrap_or(self.config.default_tax_rate),
                        payment_terms: payment_terms.clone(),
                        expected_delivery_date: *expected_delivery_date,
                        notes: notes.clone(),
                        submit: *submit,
                        actor: actor.clone(),
                        occurred_at: *occurred_at,
                    },
                )?;
                Ok(StepOutput::from_committed(&committed))
            }
            Step::PurchaseOrder {
                purchase_order_id,
                command,
            } => {
                let committed = self.service.orders().execute(purchase_order_id, command)?;
                Ok(StepOutput::from_committed(&committed))
            }
            Step::ReceivePurchaseOrder {
                purchase_order_id,
                location_id,
                location_name,
                actual_delivery_date,
                actor,
                occurred_at,
            } => {
                let location = LocationRef {
                    location_id: location_id.clone(),
                    location_name: location_name.clone().unwrap_or_else(|| location_id.to_string()),
                };
                let receipt = self.service.receive_purchase_order(
                    purchase_order_id,
                    &location,
                    ReceiveGoods {
                        actor: actor.clone(),
                        actual_delivery_date: *actual_delivery_date,
                        occurred_at: *occurred_at,
                    },
                )?;
                let mut output = StepOutput::from_committed(&receipt.order);
                for stock in &receipt.stock {
                    output.events.extend(StepOutput::from_committed(stock).events);
                }
                Ok(output)
            }
        }
    }
}
