mod prediction;
mod replay;

pub use prediction::{MoveQueue, PredictionEngine};
pub use replay::{ReplayEngine, ReplayOutcome};
