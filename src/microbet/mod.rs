pub mod donation;
pub mod executor;
pub mod fallback;
pub mod provider;
pub mod state;
pub mod window;

pub use executor::BetExecutor;
pub use provider::{BetStore, OutcomeJudge, PredictionGenerator};
pub use state::{Completion, MicroBetMachine};
