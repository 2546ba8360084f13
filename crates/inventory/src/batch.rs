//! Batches (cost layers) and the totals derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use venueops_core::DomainError;
use venueops_core::numeric::{QUANTITY_EPSILON, is_depleted};

/// Separator between an origin batch id and a reservation token.
pub const RESERVATION_MARKER: &str = "-R";

/// Batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Available,
    Reserved,
    Quarantine,
    Expired,
}

impl core::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            BatchStatus::Available => "available",
            BatchStatus::Reserved => "reserved",
            BatchStatus::Quarantine => "quarantine",
            BatchStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Order in which batches are drawn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsumptionMethod {
    #[default]
    #[serde(rename = "FIFO")]
    Fifo,
    #[serde(rename = "LIFO")]
    Lifo,
}

impl core::fmt::Display for ConsumptionMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConsumptionMethod::Fifo => f.write_str("FIFO"),
            ConsumptionMethod::Lifo => f.write_str("LIFO"),
        }
    }
}

impl core::str::FromStr for ConsumptionMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(ConsumptionMethod::Fifo),
            "lifo" => Ok(ConsumptionMethod::Lifo),
            other => Err(DomainError::validation(
                "method",
                format!("expected FIFO or LIFO, got `{other}`"),
            )),
        }
    }
}

/// A cost layer of physical stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: String,
    pub quantity: f64,
    pub unit: String,
    pub cost_per_unit: f64,
    pub received_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_batch_code: Option<String>,
    pub status: BatchStatus,
    /// Stable id of the batch a reserved fragment was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= now)
    }

    /// Quantity × cost.
    pub fn value(&self) -> f64 {
        self.quantity * self.cost_per_unit
    }

    /// The batch a reserved fragment returns to on release.
    ///
    /// Documents written before `reservedFrom` existed only encode the origin in
    /// the id suffix, so that is the fallback.
    pub fn origin_batch_id(&self) -> Option<&str> {
        self.reserved_from
            .as_deref()
            .or_else(|| strip_reservation_suffix(&self.batch_id))
    }

    /// Timestamp used to order reserved fragments for LIFO release.
    pub fn reservation_time(&self) -> DateTime<Utc> {
        self.reserved_at.unwrap_or(self.received_date)
    }
}

/// `"B-7-R12"` → `Some("B-7")`.
pub fn strip_reservation_suffix(batch_id: &str) -> Option<&str> {
    batch_id
        .rfind(RESERVATION_MARKER)
        .filter(|idx| *idx > 0)
        .map(|idx| &batch_id[..idx])
}

/// Cached aggregate quantities of an inventory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTotals {
    pub available: f64,
    pub reserved: f64,
    pub quarantine: f64,
    pub unit: String,
}

impl StockTotals {
    pub fn zero(unit: impl Into<String>) -> Self {
        Self {
            available: 0.0,
            reserved: 0.0,
            quarantine: 0.0,
            unit: unit.into(),
        }
    }

    /// Recompute from scratch. Expired batches count nowhere.
    pub fn from_batches(batches: &[Batch], unit: &str) -> Self {
        let mut totals = Self::zero(unit);
        for batch in batches {
            match batch.status {
                BatchStatus::Available => totals.available += batch.quantity,
                BatchStatus::Reserved => totals.reserved += batch.quantity,
                BatchStatus::Quarantine => totals.quarantine += batch.quantity,
                BatchStatus::Expired => {}
            }
        }
        totals
    }

    /// Field-wise comparison within `QUANTITY_EPSILON`; returns the first
    /// mismatching field.
    pub fn mismatch(&self, other: &StockTotals) -> Option<&'static str> {
        let close = |a: f64, b: f64| (a - b).abs() <= QUANTITY_EPSILON;
        if !close(self.available, other.available) {
            Some("totals.available")
        } else if !close(self.reserved, other.reserved) {
            Some("totals.reserved")
        } else if !close(self.quarantine, other.quarantine) {
            Some("totals.quarantine")
        } else if self.unit != other.unit {
            Some("totals.unit")
        } else {
            None
        }
    }
}

/// Indices of the batches matching `status`, ordered by `key` ascending for
/// FIFO and descending for LIFO. Ties keep insertion order for FIFO and reverse
/// it for LIFO.
pub(crate) fn ordered_indices(
    batches: &[Batch],
    status: BatchStatus,
    method: ConsumptionMethod,
    key: impl Fn(&Batch) -> DateTime<Utc>,
) -> Vec<usize> {
    let mut indices: Vec<usize> = batches
        .iter()
        .enumerate()
        .filter(|(_, b)| b.status == status)
        .map(|(idx, _)| idx)
        .collect();
    indices.sort_by_key(|idx| key(&batches[*idx]));
    if method == ConsumptionMethod::Lifo {
        indices.reverse();
    }
    indices
}

/// Walk `order` taking as much as possible from each batch until `quantity` is
/// covered. Returns `(index, taken)` pairs, or `None` if the batches fall short.
pub(crate) fn plan_draw(batches: &[Batch], order: &[usize], quantity: f64) -> Option<Vec<(usize, f64)>> {
    let mut remaining = quantity;
    let mut plan = Vec::new();
    for idx in order {
        if is_depleted(remaining) {
            break;
        }
        let take = remaining.min(batches[*idx].quantity);
        if take > 0.0 {
            plan.push((*idx, take));
            remaining -= take;
        }
    }
    if is_depleted(remaining) { Some(plan) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn batch(id: &str, qty: f64, status: BatchStatus, day: u32) -> Batch {
        Batch {
            batch_id: id.to_string(),
            quantity: qty,
            unit: "bottle".to_string(),
            cost_per_unit: 2.5,
            received_date: Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap(),
            expiry_date: None,
            supplier_batch_code: None,
            status,
            reserved_from: None,
            reserved_at: None,
        }
    }

    #[test]
    fn totals_exclude_expired_batches() {
        let batches = vec![
            batch("a", 10.0, BatchStatus::Available, 1),
            batch("b", 4.0, BatchStatus::Reserved, 2),
            batch("c", 3.0, BatchStatus::Quarantine, 3),
            batch("d", 50.0, BatchStatus::Expired, 4),
            batch("e", 1.0, BatchStatus::Available, 5),
        ];
        let totals = StockTotals::from_batches(&batches, "bottle");
        assert_eq!(totals.available, 11.0);
        assert_eq!(totals.reserved, 4.0);
        assert_eq!(totals.quarantine, 3.0);
        assert_eq!(totals.unit, "bottle");
    }

    #[test]
    fn ordering_follows_received_date_not_position() {
        let batches = vec![
            batch("newer", 5.0, BatchStatus::Available, 9),
            batch("older", 5.0, BatchStatus::Available, 2),
            batch("held", 5.0, BatchStatus::Reserved, 1),
        ];
        let fifo = ordered_indices(&batches, BatchStatus::Available, ConsumptionMethod::Fifo, |b| {
            b.received_date
        });
        assert_eq!(fifo, vec![1, 0]);
        let lifo = ordered_indices(&batches, BatchStatus::Available, ConsumptionMethod::Lifo, |b| {
            b.received_date
        });
        assert_eq!(lifo, vec![0, 1]);
    }

    #[test]
    fn plan_draw_splits_last_batch_and_detects_shortfall() {
        let batches = vec![
            batch("a", 5.0, BatchStatus::Available, 1),
            batch("b", 5.0, BatchStatus::Available, 2),
        ];
        let plan = plan_draw(&batches, &[0, 1], 7.0).unwrap();
        assert_eq!(plan, vec![(0, 5.0), (1, 2.0)]);
        assert!(plan_draw(&batches, &[0, 1], 10.5).is_none());
    }

    #[test]
    fn reservation_suffix_is_stripped() {
        assert_eq!(strip_reservation_suffix("B-7-R12"), Some("B-7"));
        assert_eq!(strip_reservation_suffix("plain"), None);
        let mut fragment = batch("LOT9-R3", 1.0, BatchStatus::Reserved, 1);
        assert_eq!(fragment.origin_batch_id(), Some("LOT9"));
        fragment.reserved_from = Some("LOT-ORIGINAL".to_string());
        assert_eq!(fragment.origin_batch_id(), Some("LOT-ORIGINAL"));
    }

    #[test]
    fn consumption_method_parses_case_insensitively() {
        assert_eq!("lifo".parse::<ConsumptionMethod>().unwrap(), ConsumptionMethod::Lifo);
        assert_eq!(" FIFO ".parse::<ConsumptionMethod>().unwrap(), ConsumptionMethod::Fifo);
        assert!("avg".parse::<ConsumptionMethod>().is_err());
    }
}
