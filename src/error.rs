use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

/// Failure fetching or decoding the upstream play feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("play feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("play feed returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid play feed URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to read plays file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed play feed: {0}")]
    Malformed(String),
}

/// Transport-level failure talking to the generative content service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("generative service is not configured")]
    NotConfigured,
    #[error("generative service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generative service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generative service returned no content")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("malformed micro-bet draft: {0}")]
    Malformed(String),
    #[error("prediction generator timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("malformed judgement: {0}")]
    Malformed(String),
    #[error("outcome judge timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode micro-bet: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("micro-bet {0} not found")]
    NotFound(String),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Join(String),
    #[error("bet store timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode broadcast event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything that can go wrong around the play clock. Only a source outage
/// before the loop starts is fatal; the rest are caught at the tick boundary.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("play source unavailable after {attempts} attempt(s): {source}")]
    SourceUnavailable {
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("micro-bet generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("micro-bet judging failed: {0}")]
    Judge(#[from] JudgeError),
    #[error("bet store failed: {0}")]
    Store(#[from] StoreError),
    #[error("broadcast failed: {0}")]
    Publish(#[from] PublishError),
}

impl CoordinatorError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoordinatorError::SourceUnavailable { .. })
    }

    /// Log the error at the level its kind deserves.
    pub fn report(&self, context: &str) {
        if self.is_fatal() {
            error!("{}: {}", context, self);
        } else {
            warn!("{}: {}", context, self);
        }
    }
}
