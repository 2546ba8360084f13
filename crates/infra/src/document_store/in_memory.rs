use std::collections::BTreeMap;
use std::sync::RwLock;

use venueops_core::ExpectedVersion;

use super::r#trait::{DocumentStore, StoreError, StoredDocument};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DocumentKey {
    collection: String,
    key: String,
}

/// In-memory versioned document store.
///
/// Intended for tests, the CLI and dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentKey, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn load(&self, collection: &str, key: &str) -> Result<Option<StoredDocument>, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        Ok(documents
            .get(&DocumentKey {
                collection: collection.to_string(),
                key: key.to_string(),
            })
            .cloned())
    }

    fn save(
        &self,
        document: StoredDocument,
        expected: ExpectedVersion,
    ) -> Result<StoredDocument, StoreError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let key = DocumentKey {
            collection: document.collection.clone(),
            key: document.key.clone(),
        };
        let current = documents.get(&key).map(|d| d.version);

        if !expected.matches(current) {
            return Err(StoreError::Conflict(format!(
                "{}/{}: expected {expected:?}, found {current:?}",
                document.collection, document.key
            )));
        }
        if let Some(current) = current {
            if document.version <= current {
                return Err(StoreError::Conflict(format!(
                    "{}/{}: version must advance past {current} (got {})",
                    document.collection, document.key, document.version
                )));
            }
        }

        documents.insert(key, document.clone());
        Ok(document)
    }

    fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        Ok(documents
            .iter()
            .filter(|(k, _)| k.collection == collection)
            .map(|(_, d)| d.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(key: &str, version: u64) -> StoredDocument {
        StoredDocument {
            collection: "inventory".to_string(),
            key: key.to_string(),
            version,
            saved_at: chrono::Utc::now(),
            body: json!({ "version": version }),
        }
    }

    #[test]
    fn save_checks_expected_version() {
        let store = InMemoryDocumentStore::new();
        store.save(doc("p1:hall", 1), ExpectedVersion::NoDocument).unwrap();

        let err = store
            .save(doc("p1:hall", 2), ExpectedVersion::NoDocument)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let err = store
            .save(doc("p1:hall", 2), ExpectedVersion::Exact(7))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.save(doc("p1:hall", 2), ExpectedVersion::Exact(1)).unwrap();
        assert_eq!(store.load("inventory", "p1:hall").unwrap().unwrap().version, 2);
    }

    #[test]
    fn version_must_advance() {
        let store = InMemoryDocumentStore::new();
        store.save(doc("p1:hall", 3), ExpectedVersion::Any).unwrap();
        let err = store.save(doc("p1:hall", 3), ExpectedVersion::Any).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn list_is_scoped_to_collection_and_ordered_by_key() {
        let store = InMemoryDocumentStore::new();
        store.save(doc("b", 1), ExpectedVersion::NoDocument).unwrap();
        store.save(doc("a", 1), ExpectedVersion::NoDocument).unwrap();
        let mut other = doc("a", 1);
        other.collection = "purchaseOrders".to_string();
        store.save(other, ExpectedVersion::NoDocument).unwrap();

        let keys: Vec<String> = store
            .list("inventory")
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(store.load("inventory", "missing").unwrap().is_none());
    }
}
