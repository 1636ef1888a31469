//! The micro-bet lifecycle, driven purely by the tick index.
//!
//! ```text
//!            phase Open, Idle          store confirmed
//!   Idle ─────────────────▶ OpenPending ───────────────▶ OpenConfirmed
//!    ▲                                                     │   ▲
//!    │             judge succeeded                         │   │ judge failed
//!    └─────────────────────────────────────────── resolving┘───┘
//! ```
//!
//! The machine never performs I/O. `on_tick` returns the command the caller
//! should run in the background, and completions are fed back through
//! `apply`. A resolve is only ever issued against a confirmed bet.

use tracing::{debug, info, warn};

use crate::db::models::{BroadcastEvent, MicroBet, PlayRecord};

use super::window::RecentPlaysWindow;

/// Maximum number of events kept as context for a new bet.
pub const WINDOW_CAPACITY: usize = 3;
/// Ticks per micro-bet cycle.
pub const CYCLE_PERIOD: usize = 3;
/// `index % CYCLE_PERIOD` on which a new bet is opened.
pub const OPEN_PHASE: usize = 2;
/// `index % CYCLE_PERIOD` on which the open bet is resolved.
pub const RESOLVE_PHASE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Resolve,
    Hold,
}

impl Phase {
    pub fn of(index: usize) -> Phase {
        match index % CYCLE_PERIOD {
            OPEN_PHASE => Phase::Open,
            RESOLVE_PHASE => Phase::Resolve,
            _ => Phase::Hold,
        }
    }
}

/// A bet whose open request has come back.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveBet {
    pub id: String,
    /// False when the store create failed and `id` is local only.
    pub persisted: bool,
    pub bet: MicroBet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BetState {
    Idle,
    OpenPending { request: u64 },
    OpenConfirmed { active: ActiveBet, resolving: bool },
}

/// Background work the state machine asks for.
#[derive(Debug, Clone)]
pub enum BetCommand {
    Open {
        request: u64,
        window: Vec<BroadcastEvent>,
    },
    Resolve {
        active: ActiveBet,
        play: PlayRecord,
    },
}

#[derive(Debug, Clone)]
pub struct OpenOutcome {
    pub request: u64,
    pub bet: MicroBet,
    /// `None` when the store create failed.
    pub stored_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    /// The judge ruled and the bet is now closed.
    Closed { bet_id: String, bet: MicroBet },
    /// The judge failed; the bet stays open for the next resolve phase.
    Deferred { bet_id: String },
}

#[derive(Debug, Clone)]
pub enum Completion {
    Opened(OpenOutcome),
    Resolved(ResolveOutcome),
}

pub struct MicroBetMachine {
    window: RecentPlaysWindow,
    state: BetState,
    next_request: u64,
}

impl Default for MicroBetMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MicroBetMachine {
    pub fn new() -> Self {
        MicroBetMachine {
            window: RecentPlaysWindow::new(WINDOW_CAPACITY),
            state: BetState::Idle,
            next_request: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &BetState {
        &self.state
    }

    #[cfg(test)]
    pub fn window(&self) -> &RecentPlaysWindow {
        &self.window
    }

    /// Id of the confirmed open bet. Pending opens have no id yet.
    pub fn active_bet_id(&self) -> Option<&str> {
        match &self.state {
            BetState::OpenConfirmed { active, .. } => Some(active.id.as_str()),
            _ => None,
        }
    }

    /// Record the tick's event and decide what, if anything, to start.
    pub fn on_tick(&mut self, index: usize, event: &BroadcastEvent) -> Option<BetCommand> {
        self.window.push(event.clone());

        let phase = Phase::of(index);
        if phase == Phase::Open {
            if self.state != BetState::Idle {
                debug!("Tick {}: micro-bet already open, not opening another", index);
                return None;
            }
            let request = self.next_request;
            self.next_request += 1;
            self.state = BetState::OpenPending { request };
            info!(
                "Tick {}: requesting micro-bet #{} ({} plays of context)",
                index,
                request,
                self.window.len()
            );
            return Some(BetCommand::Open {
                request,
                window: self.window.snapshot(),
            });
        }

        match (phase, &mut self.state) {
            (Phase::Resolve, BetState::OpenConfirmed { active, resolving }) => {
                if *resolving {
                    debug!("Tick {}: resolution of {} still in flight", index, active.id);
                    return None;
                }
                *resolving = true;
                info!("Tick {}: resolving micro-bet {}", index, active.id);
                Some(BetCommand::Resolve {
                    active: active.clone(),
                    play: event.payload.clone(),
                })
            }
            (Phase::Resolve, BetState::OpenPending { request }) => {
                warn!(
                    "Tick {}: micro-bet #{} not confirmed yet, skipping resolution",
                    index, request
                );
                None
            }
            _ => None,
        }
    }

    /// Fold a background completion back into the state.
    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Opened(outcome) => self.on_opened(outcome),
            Completion::Resolved(outcome) => self.on_resolved(outcome),
        }
    }

    fn on_opened(&mut self, outcome: OpenOutcome) {
        match self.state {
            BetState::OpenPending { request } if request == outcome.request => {
                let (id, persisted) = match outcome.stored_id {
                    Some(id) => (id, true),
                    None => (format!("local-{}", outcome.request), false),
                };
                info!("Micro-bet {} open: {}", id, outcome.bet.question);
                self.state = BetState::OpenConfirmed {
                    active: ActiveBet {
                        id,
                        persisted,
                        bet: outcome.bet,
                    },
                    resolving: false,
                };
            }
            _ => warn!(
                "Ignoring completion for micro-bet request #{} (state {:?})",
                outcome.request,
                self.state_name()
            ),
        }
    }

    fn on_resolved(&mut self, outcome: ResolveOutcome) {
        let bet_id = match &outcome {
            ResolveOutcome::Closed { bet_id, .. } | ResolveOutcome::Deferred { bet_id } => {
                bet_id.clone()
            }
        };
        let matches_current = matches!(
            &self.state,
            BetState::OpenConfirmed { active, .. } if active.id == bet_id
        );
        if !matches_current {
            warn!(
                "Ignoring resolution for micro-bet {} (state {:?})",
                bet_id,
                self.state_name()
            );
            return;
        }

        match outcome {
            ResolveOutcome::Closed { bet_id, bet } => {
                info!(
                    "Micro-bet {} closed: answer={:?} donation={:?}",
                    bet_id, bet.answer, bet.donation_amount
                );
                self.state = BetState::Idle;
            }
            ResolveOutcome::Deferred { bet_id } => {
                warn!("Micro-bet {} stays open until the next resolve phase", bet_id);
                if let BetState::OpenConfirmed { resolving, .. } = &mut self.state {
                    *resolving = false;
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            BetState::Idle => "idle",
            BetState::OpenPending { .. } => "open-pending",
            BetState::OpenConfirmed { .. } => "open-confirmed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BetAnswer, MicroBetDraft, MicroBetOption, Resolution};
    use chrono::Utc;

    fn event(n: usize) -> BroadcastEvent {
        let play = PlayRecord {
            id: Some(format!("p{}", n)),
            description: Some(format!("play {}", n)),
            ..Default::default()
        };
        BroadcastEvent::play("g", &play, None, Utc::now())
    }

    fn bet() -> MicroBet {
        MicroBet::open(MicroBetDraft {
            question: "Run or pass?".into(),
            options: MicroBetOption::pair("Run", "Pass"),
            sponsor: "Adidas".into(),
            max_donation: 500,
        })
    }

    fn closed(mut bet: MicroBet) -> MicroBet {
        bet.close(&Resolution {
            answer: BetAnswer::Opt1,
            donation_amount: 250,
            action_description: "Run up the middle".into(),
        });
        bet
    }

    fn open_request(cmd: Option<BetCommand>) -> (u64, Vec<BroadcastEvent>) {
        match cmd {
            Some(BetCommand::Open { request, window }) => (request, window),
            other => panic!("expected open command, got {:?}", other),
        }
    }

    fn confirm(m: &mut MicroBetMachine, request: u64, id: &str) {
        m.apply(Completion::Opened(OpenOutcome {
            request,
            bet: bet(),
            stored_id: Some(id.to_string()),
        }));
    }

    #[test]
    fn phase_is_a_function_of_the_index() {
        assert_eq!(Phase::of(0), Phase::Resolve);
        assert_eq!(Phase::of(1), Phase::Hold);
        assert_eq!(Phase::of(2), Phase::Open);
        assert_eq!(Phase::of(3), Phase::Resolve);
        assert_eq!(Phase::of(5), Phase::Open);
        assert_eq!(Phase::of(301), Phase::Hold);
    }

    #[test]
    fn opens_on_phase_two_with_full_window() {
        let mut m = MicroBetMachine::new();
        assert!(m.on_tick(0, &event(0)).is_none());
        assert!(m.on_tick(1, &event(1)).is_none());
        let (request, window) = open_request(m.on_tick(2, &event(2)));
        assert_eq!(request, 0);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].payload.id.as_deref(), Some("p0"));
        assert_eq!(m.state(), &BetState::OpenPending { request: 0 });
        assert!(m.active_bet_id().is_none());
    }

    #[test]
    fn never_resolves_while_idle() {
        let mut m = MicroBetMachine::new();
        for i in [0, 3, 6, 9] {
            m.state = BetState::Idle;
            assert!(m.on_tick(i, &event(i)).is_none());
            assert_eq!(m.state(), &BetState::Idle);
        }
    }

    #[test]
    fn resolve_does_not_race_an_unconfirmed_open() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));
        assert!(m.on_tick(3, &event(3)).is_none());
        assert_eq!(m.state(), &BetState::OpenPending { request });
    }

    #[test]
    fn never_opens_while_open() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));
        assert!(m.on_tick(5, &event(5)).is_none());

        confirm(&mut m, request, "mb_a");
        assert!(m.on_tick(8, &event(8)).is_none());
        assert_eq!(m.active_bet_id(), Some("mb_a"));
    }

    #[test]
    fn confirmed_bet_is_resolved_against_the_next_play() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));
        confirm(&mut m, request, "mb_a");

        match m.on_tick(3, &event(3)) {
            Some(BetCommand::Resolve { active, play }) => {
                assert_eq!(active.id, "mb_a");
                assert!(active.persisted);
                assert_eq!(play.id.as_deref(), Some("p3"));
            }
            other => panic!("expected resolve, got {:?}", other),
        }
        // A second resolve while the first is in flight is suppressed.
        assert!(m.on_tick(6, &event(6)).is_none());

        m.apply(Completion::Resolved(ResolveOutcome::Closed {
            bet_id: "mb_a".into(),
            bet: closed(bet()),
        }));
        assert_eq!(m.state(), &BetState::Idle);
        assert!(m.active_bet_id().is_none());
    }

    #[test]
    fn judge_failure_keeps_the_bet_open_and_retries_next_cycle() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));
        confirm(&mut m, request, "mb_a");
        assert!(m.on_tick(3, &event(3)).is_some());

        m.apply(Completion::Resolved(ResolveOutcome::Deferred {
            bet_id: "mb_a".into(),
        }));
        assert_eq!(m.active_bet_id(), Some("mb_a"));
        match m.state() {
            BetState::OpenConfirmed { active, resolving } => {
                assert!(active.bet.is_active());
                assert!(!resolving);
            }
            other => panic!("unexpected state {:?}", other),
        }

        // Phase 2 does not open a second bet; phase 0 tries again.
        assert!(m.on_tick(5, &event(5)).is_none());
        assert!(matches!(
            m.on_tick(6, &event(6)),
            Some(BetCommand::Resolve { .. })
        ));
    }

    #[test]
    fn store_failure_confirms_with_local_id() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));
        m.apply(Completion::Opened(OpenOutcome {
            request,
            bet: bet(),
            stored_id: None,
        }));
        assert_eq!(m.active_bet_id(), Some("local-0"));
        match m.on_tick(3, &event(3)) {
            Some(BetCommand::Resolve { active, .. }) => assert!(!active.persisted),
            other => panic!("expected resolve, got {:?}", other),
        }
    }

    #[test]
    fn stale_completions_are_ignored() {
        let mut m = MicroBetMachine::new();
        let (request, _) = open_request(m.on_tick(2, &event(2)));

        m.apply(Completion::Opened(OpenOutcome {
            request: request + 7,
            bet: bet(),
            stored_id: Some("mb_x".into()),
        }));
        assert_eq!(m.state(), &BetState::OpenPending { request });

        confirm(&mut m, request, "mb_a");
        m.apply(Completion::Resolved(ResolveOutcome::Closed {
            bet_id: "mb_other".into(),
            bet: closed(bet()),
        }));
        assert_eq!(m.active_bet_id(), Some("mb_a"));
    }

    #[test]
    fn window_tracks_every_tick() {
        let mut m = MicroBetMachine::new();
        for i in 0..10 {
            m.on_tick(i, &event(i));
            assert_eq!(m.window().len(), (i + 1).min(WINDOW_CAPACITY));
        }
        let latest: Vec<_> = m
            .window()
            .snapshot()
            .into_iter()
            .map(|e| e.payload.id.unwrap_or_default())
            .collect();
        assert_eq!(latest, vec!["p7", "p8", "p9"]);
    }
}
