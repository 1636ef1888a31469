use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized unit of game action, as produced by a play source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayRecord {
    pub id: Option<String>,
    pub sequence: Option<f64>,
    pub clock: Option<String>,
    pub home_points: Option<i32>,
    pub away_points: Option<i32>,
    pub play_type: Option<String>,
    pub description: Option<String>,
    pub start_possession: Option<String>,
    pub start_yardline: Option<i32>,
    pub end_possession: Option<String>,
    pub end_yardline: Option<i32>,
    #[serde(default)]
    pub statistics: serde_json::Value,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl PlayRecord {
    /// Short human-readable summary used in prompts and logs.
    pub fn summary(&self) -> String {
        let clock = self.clock.as_deref().unwrap_or("--:--");
        let kind = self.play_type.as_deref().unwrap_or("play");
        let text = self.description.as_deref().unwrap_or("(no description)");
        format!("[{} {}] {}", clock, kind, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Play,
}

/// The wire payload pushed to every subscriber once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub game_id: String,
    pub payload: PlayRecord,
    pub active_micro_bet_id: Option<String>,
    pub home_team_score: i32,
    pub away_team_score: i32,
}

impl BroadcastEvent {
    pub fn play(
        game_id: &str,
        play: &PlayRecord,
        active_micro_bet_id: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        BroadcastEvent {
            kind: EventKind::Play,
            timestamp,
            game_id: game_id.to_string(),
            payload: play.clone(),
            active_micro_bet_id,
            home_team_score: play.home_points.unwrap_or(0),
            away_team_score: play.away_points.unwrap_or(0),
        }
    }
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroBetOption {
    /// "opt1" | "opt2"
    pub id: String,
    pub text: String,
    pub votes: u32,
}

impl MicroBetOption {
    pub fn new(id: &str, text: &str) -> Self {
        MicroBetOption {
            id: id.to_string(),
            text: text.to_string(),
            votes: 0,
        }
    }

    pub fn pair(first: &str, second: &str) -> [MicroBetOption; 2] {
        [
            MicroBetOption::new("opt1", first),
            MicroBetOption::new("opt2", second),
        ]
    }
}

/// Which option the determining play matched. `Neither` goes over the wire as `opt3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetAnswer {
    #[serde(rename = "opt1")]
    Opt1,
    #[serde(rename = "opt2")]
    Opt2,
    #[serde(rename = "opt3")]
    Neither,
}

impl BetAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetAnswer::Opt1 => "opt1",
            BetAnswer::Opt2 => "opt2",
            BetAnswer::Neither => "opt3",
        }
    }
}

impl fmt::Display for BetAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetAnswer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opt1" => Ok(BetAnswer::Opt1),
            "opt2" => Ok(BetAnswer::Opt2),
            "opt3" | "neither" | "none" => Ok(BetAnswer::Neither),
            other => Err(format!("unknown answer '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Active,
    Closed,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Active => "active",
            BetStatus::Closed => "closed",
        }
    }
}

impl FromStr for BetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BetStatus::Active),
            "closed" => Ok(BetStatus::Closed),
            other => Err(format!("unknown bet status '{}'", other)),
        }
    }
}

/// What the prediction generator hands back before a bet is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroBetDraft {
    pub question: String,
    pub options: [MicroBetOption; 2],
    pub sponsor: String,
    pub max_donation: u32,
}

/// Output of the outcome judge for a single determining play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub answer: BetAnswer,
    pub action_description: String,
}

/// Fields written onto a bet when it closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub answer: BetAnswer,
    pub donation_amount: u32,
    pub action_description: String,
}

/// A two-option prediction tied to a window of plays.
///
/// Active bets carry no resolution fields; closed bets carry all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroBet {
    pub question: String,
    pub options: [MicroBetOption; 2],
    pub sponsor: String,
    pub max_donation: u32,
    pub status: BetStatus,
    pub answer: Option<BetAnswer>,
    pub donation_amount: Option<u32>,
    pub action_description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl MicroBet {
    pub fn open(draft: MicroBetDraft) -> Self {
        MicroBet {
            question: draft.question,
            options: draft.options,
            sponsor: draft.sponsor,
            max_donation: draft.max_donation,
            status: BetStatus::Active,
            answer: None,
            donation_amount: None,
            action_description: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self, resolution: &Resolution) {
        self.status = BetStatus::Closed;
        self.answer = Some(resolution.answer);
        self.donation_amount = Some(resolution.donation_amount);
        self.action_description = Some(resolution.action_description.clone());
        self.closed_at = Some(Utc::now());
    }

    pub fn is_active(&self) -> bool {
        self.status == BetStatus::Active
    }

    /// Closed if and only if every resolution field is present.
    pub fn is_consistent(&self) -> bool {
        let resolved = self.answer.is_some()
            && self.donation_amount.is_some()
            && self.action_description.is_some();
        let bare = self.answer.is_none()
            && self.donation_amount.is_none()
            && self.action_description.is_none();
        if self.is_active() {
            bare
        } else {
            resolved
        }
    }
}

/// A stored bet together with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMicroBet {
    pub id: String,
    #[serde(flatten)]
    pub bet: MicroBet,
}
