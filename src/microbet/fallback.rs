use crate::db::models::{MicroBetDraft, MicroBetOption};

pub const DEFAULT_SPONSOR: &str = "Nike";
pub const DEFAULT_MAX_DONATION: u32 = 1000;

/// Who the two answers of a fallback question are.
enum Answers {
    Teams,
    Fixed(&'static str, &'static str),
}

struct Template {
    question: &'static str,
    answers: Answers,
    sponsor: &'static str,
    max_donation: u32,
}

/// Questions used in rotation whenever the prediction generator cannot deliver.
const CATALOGUE: [Template; 3] = [
    Template {
        question: "Who scores the next touchdown?",
        answers: Answers::Teams,
        sponsor: DEFAULT_SPONSOR,
        max_donation: DEFAULT_MAX_DONATION,
    },
    Template {
        question: "Will the next play be a run or pass?",
        answers: Answers::Fixed("Run", "Pass"),
        sponsor: "Adidas",
        max_donation: 500,
    },
    Template {
        question: "Who will get the next first down?",
        answers: Answers::Teams,
        sponsor: "Under Armour",
        max_donation: 750,
    },
];

/// Fallback draft for the given open request, cycling through the catalogue.
pub fn fallback_draft(request: u64, home_team: &str, away_team: &str) -> MicroBetDraft {
    let template = &CATALOGUE[(request % CATALOGUE.len() as u64) as usize];
    let (first, second) = match template.answers {
        Answers::Teams => (
            non_empty(home_team, "Home team"),
            non_empty(away_team, "Away team"),
        ),
        Answers::Fixed(first, second) => (first, second),
    };
    MicroBetDraft {
        question: template.question.to_string(),
        options: MicroBetOption::pair(first, second),
        sponsor: template.sponsor.to_string(),
        max_donation: template.max_donation,
    }
}

fn non_empty<'a>(name: &'a str, default: &'a str) -> &'a str {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}
