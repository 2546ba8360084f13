//! Command-line replay of ledger and procurement scripts.

pub mod replay;
pub mod script;

pub use replay::{Replay, Report, StepReport};
pub use script::{Script, Step};
