use async_trait::async_trait;

use crate::db::models::{
    BroadcastEvent, Judgement, MicroBet, MicroBetDraft, MicroBetOption, PlayRecord, Resolution,
};
use crate::error::{GenerationError, JudgeError, StoreError};

/// Turns a window of recent plays into a two-option micro-bet.
#[async_trait]
pub trait PredictionGenerator: Send + Sync {
    async fn generate(&self, window: &[BroadcastEvent]) -> Result<MicroBetDraft, GenerationError>;
}

/// Decides which option (if any) a single determining play satisfies.
#[async_trait]
pub trait OutcomeJudge: Send + Sync {
    async fn judge(
        &self,
        options: &[MicroBetOption; 2],
        play: &PlayRecord,
    ) -> Result<Judgement, JudgeError>;
}

/// Durable storage for micro-bet documents.
#[async_trait]
pub trait BetStore: Send + Sync {
    /// Persist a new bet and return the store-assigned id.
    async fn create(&self, bet: &MicroBet) -> Result<String, StoreError>;

    /// Close the bet with the given id.
    async fn update(&self, id: &str, resolution: &Resolution) -> Result<(), StoreError>;
}
