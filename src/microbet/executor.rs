use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::models::{BroadcastEvent, MicroBet, MicroBetDraft, PlayRecord, Resolution};
use crate::error::{CoordinatorError, GenerationError, JudgeError, StoreError};

use super::donation::donation_amount;
use super::fallback::fallback_draft;
use super::provider::{BetStore, OutcomeJudge, PredictionGenerator};
use super::state::{ActiveBet, BetCommand, Completion, OpenOutcome, ResolveOutcome};

/// Runs state-machine commands as detached tasks and reports back on a channel.
///
/// The play clock never awaits these tasks; it only drains the completion
/// channel between ticks.
pub struct BetExecutor {
    generator: Arc<dyn PredictionGenerator>,
    judge: Arc<dyn OutcomeJudge>,
    store: Arc<dyn BetStore>,
    home_team: String,
    away_team: String,
    call_timeout: Duration,
    completions: mpsc::Sender<Completion>,
}

impl BetExecutor {
    pub fn new(
        generator: Arc<dyn PredictionGenerator>,
        judge: Arc<dyn OutcomeJudge>,
        store: Arc<dyn BetStore>,
        home_team: &str,
        away_team: &str,
        call_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Completion>) {
        let (completions, rx) = mpsc::channel(64);
        (
            BetExecutor {
                generator,
                judge,
                store,
                home_team: home_team.to_string(),
                away_team: away_team.to_string(),
                call_timeout,
                completions,
            },
            rx,
        )
    }

    /// Spawn the command and return immediately.
    pub fn dispatch(&self, command: BetCommand) -> JoinHandle<()> {
        let tx = self.completions.clone();
        match command {
            BetCommand::Open { request, window } => {
                let generator = Arc::clone(&self.generator);
                let store = Arc::clone(&self.store);
                let fallback = fallback_draft(request, &self.home_team, &self.away_team);
                let limit = self.call_timeout;
                tokio::spawn(async move {
                    let outcome =
                        open_bet(generator.as_ref(), store.as_ref(), fallback, limit, request, &window)
                            .await;
                    if tx.send(Completion::Opened(outcome)).await.is_err() {
                        debug!("Play clock gone, dropping open completion #{}", request);
                    }
                })
            }
            BetCommand::Resolve { active, play } => {
                let judge = Arc::clone(&self.judge);
                let store = Arc::clone(&self.store);
                let limit = self.call_timeout;
                tokio::spawn(async move {
                    let outcome = resolve_bet(judge.as_ref(), store.as_ref(), limit, active, &play).await;
                    if tx.send(Completion::Resolved(outcome)).await.is_err() {
                        debug!("Play clock gone, dropping resolve completion");
                    }
                })
            }
        }
    }
}

async fn open_bet(
    generator: &dyn PredictionGenerator,
    store: &dyn BetStore,
    fallback: MicroBetDraft,
    limit: Duration,
    request: u64,
    window: &[BroadcastEvent],
) -> OpenOutcome {
    let draft = match bounded(limit, generator.generate(window), GenerationError::Timeout).await {
        Ok(draft) => draft,
        Err(e) => {
            CoordinatorError::from(e).report("Using fallback micro-bet");
            fallback
        }
    };
    let bet = MicroBet::open(draft);

    let stored_id = match bounded(limit, store.create(&bet), StoreError::Timeout).await {
        Ok(id) => {
            info!("Micro-bet #{} stored as {}", request, id);
            Some(id)
        }
        Err(e) => {
            CoordinatorError::from(e).report("Micro-bet not persisted");
            None
        }
    };

    OpenOutcome {
        request,
        bet,
        stored_id,
    }
}

async fn resolve_bet(
    judge: &dyn OutcomeJudge,
    store: &dyn BetStore,
    limit: Duration,
    active: ActiveBet,
    play: &PlayRecord,
) -> ResolveOutcome {
    let ActiveBet { id, persisted, mut bet } = active;

    let judgement = match bounded(limit, judge.judge(&bet.options, play), JudgeError::Timeout).await {
        Ok(j) => j,
        Err(e) => {
            CoordinatorError::from(e).report(&format!("Could not resolve micro-bet {}", id));
            return ResolveOutcome::Deferred { bet_id: id };
        }
    };

    let resolution = Resolution {
        answer: judgement.answer,
        donation_amount: donation_amount(judgement.answer, bet.max_donation, &mut rand::thread_rng()),
        action_description: judgement.action_description,
    };
    bet.close(&resolution);

    if persisted {
        if let Err(e) = bounded(limit, store.update(&id, &resolution), StoreError::Timeout).await {
            CoordinatorError::from(e).report(&format!("Closed micro-bet {} not persisted", id));
        }
    } else {
        warn!("Micro-bet {} was never stored; closing in memory only", id);
    }

    ResolveOutcome::Closed { bet_id: id, bet }
}

/// Await `fut`, turning an overrun of `limit` into the caller's timeout error.
async fn bounded<T, E>(
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
