//! Command execution pipeline for document-backed aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the document (or start a fresh aggregate when none is stored)
//!   ↓
//! 2. Execute: handle (pure decision) then apply the emitted events
//!   ↓
//! 3. Save the whole document with ExpectedVersion = version that was loaded
//!   ↓
//! 4. On a version conflict, reload and run the command again (bounded)
//! ```
//!
//! A command that fails in step 2 writes nothing.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use venueops_core::{Aggregate, DomainError, ExpectedVersion, IdGenerator};
use venueops_events::{Event, EventEnvelope};

use crate::document_store::{DocumentStore, StoreError, StoredDocument};

/// Error returned by the services.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Store(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::NotFound { .. }))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::Store(StoreError::Conflict(_)) | ServiceError::Domain(DomainError::Conflict(_))
        )
    }
}

/// The saved document plus the events that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<A, E> {
    pub document: A,
    pub events: Vec<EventEnvelope<E>>,
}

impl<A, E> Committed<A, E> {
    pub fn payloads(&self) -> impl Iterator<Item = &E> {
        self.events.iter().map(|e| e.payload())
    }
}

/// Reusable load → execute → save engine.
pub struct CommandDispatcher<S> {
    store: S,
    ids: Arc<dyn IdGenerator>,
    max_conflict_retries: u32,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, max_conflict_retries: u32) -> Self {
        Self {
            store,
            ids,
            max_conflict_retries,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> core::fmt::Debug for CommandDispatcher<S>
where
    S: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("store", &self.store)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl<S> CommandDispatcher<S>
where
    S: DocumentStore,
{
    /// Load and decode one document.
    pub fn load<A>(&self, collection: &str, key: &str) -> Result<Option<A>, ServiceError>
    where
        A: DeserializeOwned,
    {
        match self.store.load(collection, key)? {
            Some(stored) => Ok(Some(stored.decode()?)),
            None => Ok(None),
        }
    }

    /// Load and decode every document of a collection.
    pub fn list<A>(&self, collection: &str) -> Result<Vec<A>, ServiceError>
    where
        A: DeserializeOwned,
    {
        self.store
            .list(collection)?
            .iter()
            .map(|stored| stored.decode().map_err(ServiceError::from))
            .collect()
    }

    /// Decide `command` against the stored document without saving anything.
    ///
    /// Returns the events `dispatch` would commit right now.
    pub fn preview<A>(
        &self,
        collection: &str,
        key: &str,
        command: &A::Command,
        init: impl FnOnce() -> Result<A, DomainError>,
    ) -> Result<Vec<A::Event>, ServiceError>
    where
        A: Aggregate<Error = DomainError> + DeserializeOwned,
    {
        let aggregate = match self.load(collection, key)? {
            Some(aggregate) => aggregate,
            None => init()?,
        };
        Ok(aggregate.handle(command, self.ids.as_ref())?)
    }

    /// Run `command` against the document stored under `key`.
    ///
    /// `init` supplies the aggregate when nothing is stored yet; returning an
    /// error from it (usually `NotFound`) aborts the command.
    pub fn dispatch<A>(
        &self,
        collection: &str,
        key: &str,
        aggregate_type: &str,
        command: &A::Command,
        init: impl Fn() -> Result<A, DomainError>,
    ) -> Result<Committed<A, A::Event>, ServiceError>
    where
        A: Aggregate<Error = DomainError> + Serialize + DeserializeOwned,
        A::Event: Event,
    {
        let mut attempt = 0u32;
        loop {
            let (mut aggregate, expected) = match self.store.load(collection, key)? {
                Some(stored) => {
                    let aggregate: A = stored.decode()?;
                    (aggregate, ExpectedVersion::Exact(stored.version))
                }
                None => (init()?, ExpectedVersion::NoDocument),
            };
            let base_version = aggregate.version();

            let decided = aggregate.execute(command, self.ids.as_ref())?;
            if decided.is_empty() {
                debug!(collection, key, "command produced no events");
                return Ok(Committed {
                    document: aggregate,
                    events: vec![],
                });
            }

            let document = StoredDocument::from_typed(collection, key, aggregate.version(), &aggregate)?;
            match self.store.save(document, expected) {
                Ok(saved) => {
                    info!(
                        collection,
                        key,
                        version = saved.version,
                        events = decided.len(),
                        "command applied"
                    );
                    let events = decided
                        .into_iter()
                        .zip(base_version + 1..)
                        .map(|(event, sequence)| {
                            EventEnvelope::wrap(key, aggregate_type, sequence, event)
                        })
                        .collect();
                    return Ok(Committed {
                        document: aggregate,
                        events,
                    });
                }
                Err(StoreError::Conflict(reason)) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(collection, key, attempt, %reason, "version conflict, retrying command");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
