//! Prompt construction and response parsing for the generative content service.
//!
//! Both prompts ask for a bare JSON object. Models often wrap JSON in
//! markdown fences anyway, so parsing strips them first.

use serde::Deserialize;

use crate::db::models::{
    BetAnswer, BroadcastEvent, Judgement, MicroBetDraft, MicroBetOption, PlayRecord,
};
use crate::microbet::fallback::DEFAULT_SPONSOR;

pub const GENERATION_SYSTEM: &str = "You create short, fun, two-option prediction questions \
for fans watching a live American football game. Reply with JSON only.";

pub const JUDGE_SYSTEM: &str = "You are a strict referee deciding which prediction option a \
single football play satisfies. Reply with JSON only.";

pub fn generation_prompt(window: &[BroadcastEvent]) -> String {
    let mut recent = String::new();
    for (i, ev) in window.iter().enumerate() {
        recent.push_str(&format!(
            "{}. {} (score {}-{})\n",
            i + 1,
            ev.payload.summary(),
            ev.home_team_score,
            ev.away_team_score
        ));
    }

    format!(
        r#"Recent plays, oldest first:
{}
Write one question about what happens on the NEXT play, with exactly two answers
that a single play can clearly decide. Pick a sports-brand sponsor and a maximum
donation in whole dollars between 200 and 2000.

Respond with this JSON object and nothing else:
{{"question": "...", "option1": "...", "option2": "...", "sponsor": "...", "maxDonation": 1000}}"#,
        recent
    )
}

pub fn judge_prompt(options: &[MicroBetOption; 2], play: &PlayRecord) -> String {
    format!(
        r#"Prediction options:
opt1: {}
opt2: {}

Determining play: {}

Answer "opt1" or "opt2" ONLY if the play exactly satisfies that option's description.
If it satisfies neither, or it is ambiguous, answer "opt3".
Describe the determining action in under 15 words.

Respond with this JSON object and nothing else:
{{"answer": "opt1" | "opt2" | "opt3", "action": "..."}}"#,
        options[0].text,
        options[1].text,
        play.summary()
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDraft {
    question: String,
    option1: String,
    option2: String,
    #[serde(default)]
    sponsor: Option<String>,
    #[serde(alias = "max_donation")]
    max_donation: i64,
}

#[derive(Debug, Deserialize)]
struct RawJudgement {
    answer: String,
    #[serde(alias = "actionDescription", alias = "description")]
    action: String,
}

pub fn parse_draft(content: &str) -> Result<MicroBetDraft, String> {
    let raw: RawDraft = serde_json::from_str(strip_fences(content)).map_err(|e| e.to_string())?;

    let question = raw.question.trim();
    let (first, second) = (raw.option1.trim(), raw.option2.trim());
    if question.is_empty() || first.is_empty() || second.is_empty() {
        return Err("question and both options must be non-empty".into());
    }
    if raw.max_donation <= 0 || raw.max_donation > u32::MAX as i64 {
        return Err(format!("maxDonation {} out of range", raw.max_donation));
    }
    let sponsor = raw
        .sponsor
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SPONSOR);

    Ok(MicroBetDraft {
        question: question.to_string(),
        options: MicroBetOption::pair(first, second),
        sponsor: sponsor.to_string(),
        max_donation: raw.max_donation as u32,
    })
}

pub fn parse_judgement(content: &str) -> Result<Judgement, String> {
    let raw: RawJudgement =
        serde_json::from_str(strip_fences(content)).map_err(|e| e.to_string())?;
    let answer: BetAnswer = raw.answer.parse()?;
    Ok(Judgement {
        answer,
        action_description: raw.action.trim().to_string(),
    })
}

/// Remove a surrounding ```json ... ``` fence, if any.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
