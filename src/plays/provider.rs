use async_trait::async_trait;

use crate::db::models::PlayRecord;
use crate::error::FetchError;

/// Trait that every play-by-play source must implement.
#[async_trait]
pub trait PlaySource: Send + Sync {
    /// Return the full ordered list of plays for the configured game.
    async fn fetch_plays(&self) -> Result<Vec<PlayRecord>, FetchError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
