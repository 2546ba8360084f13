use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Event;

/// Envelope for an event, containing document/stream metadata.
///
/// Notes:
/// - `document_key` is the storage key of the record the event mutated
///   (`productId:locationId` or the purchase order id).
/// - `sequence_number` is the document version after the event was applied.
/// - `payload` is the typed domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    document_key: String,
    aggregate_type: String,
    event_type: String,

    /// Monotonically increasing position in the document's history.
    sequence_number: u64,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, copying its metadata.
    pub fn wrap(
        document_key: impl Into<String>,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            document_key: document_key.into(),
            aggregate_type: aggregate_type.into(),
            event_type: payload.event_type().to_string(),
            sequence_number,
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
