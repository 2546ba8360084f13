//! Domain events emitted by ledger and procurement operations.
//!
//! Events describe what a command changed; the calling layer persists the
//! mutated document and may forward the events to a movement history.

pub mod envelope;
pub mod event;

pub use envelope::EventEnvelope;
pub use event::Event;
