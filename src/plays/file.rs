use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::provider::PlaySource;
use super::sportradar::flatten_pbp;
use crate::db::models::PlayRecord;
use crate::error::FetchError;

/// Reads plays from a local JSON file, either an array of normalized plays
/// or a saved Sportradar play-by-play document.
pub struct PlaysFile {
    path: PathBuf,
}

impl PlaysFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PlaysFile { path: path.into() }
    }
}

#[async_trait]
impl PlaySource for PlaysFile {
    fn name(&self) -> &str {
        "PlaysFile"
    }

    async fn fetch_plays(&self) -> Result<Vec<PlayRecord>, FetchError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        parse_plays(&text)
    }
}

fn parse_plays(text: &str) -> Result<Vec<PlayRecord>, FetchError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| FetchError::Malformed(e.to_string()))?;
    match raw {
        Value::Array(_) => {
            serde_json::from_value(raw).map_err(|e| FetchError::Malformed(e.to_string()))
        }
        other => flatten_pbp(&other),
    }
}
