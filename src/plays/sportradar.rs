use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::provider::PlaySource;
use crate::db::models::PlayRecord;
use crate::error::FetchError;

/// Play-by-play source backed by the Sportradar NFL v7 API.
/// Docs: <https://developer.sportradar.com/football/reference/nfl-overview>
pub struct SportradarFeed {
    http: Client,
    base_url: String,
    game_id: String,
    api_key: String,
}

impl SportradarFeed {
    pub fn new(base_url: &str, game_id: &str, api_key: &str) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(SportradarFeed {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            game_id: game_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn pbp_url(&self) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!("{}/games/{}/pbp.json", self.base_url, self.game_id))?;
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl PlaySource for SportradarFeed {
    fn name(&self) -> &str {
        "Sportradar"
    }

    async fn fetch_plays(&self) -> Result<Vec<PlayRecord>, FetchError> {
        let url = self.pbp_url()?;
        debug!("Fetching play-by-play for game {}", self.game_id);

        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        let raw: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;
        flatten_pbp(&raw)
    }
}

/// Flatten `periods[].pbp[].events[]` into the ordered list of plays.
///
/// Only events whose `type` is `"play"` are kept; timeouts, period ends and
/// other bookkeeping events are dropped. A document with no `periods` is an
/// empty game, not an error.
pub fn flatten_pbp(raw: &Value) -> Result<Vec<PlayRecord>, FetchError> {
    if !raw.is_object() {
        return Err(FetchError::Malformed("expected a play-by-play object".into()));
    }
    let periods = match raw.get("periods").and_then(Value::as_array) {
        Some(p) => p,
        None => return Ok(vec![]),
    };

    let plays = periods
        .iter()
        .filter_map(|period| period.get("pbp").and_then(Value::as_array))
        .flatten()
        .filter_map(|drive| drive.get("events").and_then(Value::as_array))
        .flatten()
        .filter(|ev| ev.get("type").and_then(Value::as_str) == Some("play"))
        .map(normalize_play)
        .collect();
    Ok(plays)
}

fn normalize_play(ev: &Value) -> PlayRecord {
    let text = |key: &str| ev.get(key).and_then(Value::as_str).map(str::to_string);
    let points = |key: &str| ev.get(key).and_then(Value::as_i64).map(|v| v as i32);
    let situation = |side: &str| ev.get(side);
    let possession = |side: &str| {
        situation(side)
            .and_then(|s| s.pointer("/possession/alias"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let yardline = |side: &str| {
        situation(side)
            .and_then(|s| s.pointer("/location/yardline"))
            .and_then(Value::as_i64)
            .map(|v| v as i32)
    };

    PlayRecord {
        id: text("id"),
        sequence: ev.get("sequence").and_then(Value::as_f64),
        clock: text("clock"),
        home_points: points("home_points"),
        away_points: points("away_points"),
        play_type: text("play_type"),
        description: text("description"),
        start_possession: possession("start_situation"),
        start_yardline: yardline("start_situation"),
        end_possession: possession("end_situation"),
        end_yardline: yardline("end_situation"),
        statistics: ev.get("statistics").cloned().unwrap_or(Value::Null),
        details: ev.get("details").cloned().unwrap_or(Value::Null),
    }
}
