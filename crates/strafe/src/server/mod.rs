mod reconciliation;
mod verify;

pub use reconciliation::{BatchOutcome, MoveResult, ReconciliationEngine};
pub use verify::{TimestampVerifier, Verdict};
