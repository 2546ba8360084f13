//! Aggregate root traits for the ledger and procurement documents.

use crate::error::{DomainError, DomainResult};
use crate::id::IdGenerator;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate key (the document key at the storage boundary).
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate key.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Incremented once per applied event; the persistence adapter compares it
    /// against the stored document before writing.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The document must not exist yet.
    NoDocument,
    /// Require the stored document to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// `actual` is `None` when no document is stored under the key.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoDocument => actual.is_none(),
            ExpectedVersion::Exact(v) => actual == Some(v),
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd, ids)` validates and returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates never perform IO. A failed `handle` leaves state untouched, which
/// is what makes every operation all-or-nothing.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    ///
    /// Must be infallible and deterministic; implementations bump `version()`
    /// by one per event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// Any identifiers the events need (batch ids, movement ids) are drawn from
    /// `ids` here so that `apply` stays deterministic.
    fn handle(
        &self,
        command: &Self::Command,
        ids: &dyn IdGenerator,
    ) -> Result<Vec<Self::Event>, Self::Error>;

    /// Decide, then apply every emitted event.
    fn execute(
        &mut self,
        command: &Self::Command,
        ids: &dyn IdGenerator,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command, ids)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
