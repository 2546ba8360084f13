use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use venueops_core::ExpectedVersion;

/// One persisted document: the full JSON body of an inventory record or a
/// purchase order, keyed by `(collection, key)`.
///
/// `version` mirrors the aggregate's own version counter and is what
/// `ExpectedVersion` is checked against on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub collection: String,
    pub key: String,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub body: JsonValue,
}

impl StoredDocument {
    /// Serialize a typed document.
    pub fn from_typed<T: Serialize>(
        collection: impl Into<String>,
        key: impl Into<String>,
        version: u64,
        document: &T,
    ) -> Result<Self, StoreError> {
        let body = serde_json::to_value(document)
            .map_err(|e| StoreError::Serialization(format!("document serialization failed: {e}")))?;

        Ok(Self {
            collection: collection.into(),
            key: key.into(),
            version,
            saved_at: Utc::now(),
            body,
        })
    }

    /// Deserialize the body into a typed document.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            StoreError::Serialization(format!(
                "document {}/{} could not be decoded: {e}",
                self.collection, self.key
            ))
        })
    }
}

/// Document store operation error.
///
/// Infrastructure errors only; business rule failures are `DomainError`s.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Keyed, versioned document storage.
///
/// `save` replaces the whole document when the stored version satisfies
/// `expected`, otherwise it returns `StoreError::Conflict` and writes nothing.
pub trait DocumentStore: Send + Sync {
    fn load(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>, StoreError>;

    fn save(
        &self,
        document: StoredDocument,
        expected: ExpectedVersion,
    ) -> Result<StoredDocument, StoreError>;

    /// All documents of a collection, ordered by key.
    fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn load(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>, StoreError> {
        (**self).load(collection, key)
    }

    fn save(
        &self,
        document: StoredDocument,
        expected: ExpectedVersion,
    ) -> Result<StoredDocument, StoreError> {
        (**self).save(document, expected)
    }

    fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        (**self).list(collection)
    }
}
