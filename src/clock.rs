//! The play clock: one timer, one owner of the coordinator state.
//!
//! Every tick builds a `BroadcastEvent` from the play under the cursor, lets
//! the micro-bet machine react (spawning any slow work in the background),
//! publishes the event, and advances the cursor. Completions from background
//! work are folded back in by the same task between ticks, so the state never
//! needs a lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::db::models::{BroadcastEvent, PlayRecord};
use crate::error::CoordinatorError;
use crate::hub::Publisher;
use crate::microbet::{BetExecutor, Completion, MicroBetMachine};

pub struct PlayClock {
    plays: Vec<PlayRecord>,
    cursor: usize,
    game_id: String,
    machine: MicroBetMachine,
    executor: BetExecutor,
    completions: mpsc::Receiver<Completion>,
    publisher: Arc<dyn Publisher>,
}

impl PlayClock {
    pub fn new(
        plays: Vec<PlayRecord>,
        game_id: &str,
        executor: BetExecutor,
        completions: mpsc::Receiver<Completion>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        PlayClock {
            plays,
            cursor: 0,
            game_id: game_id.to_string(),
            machine: MicroBetMachine::new(),
            executor,
            completions,
            publisher,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[cfg(test)]
    pub fn machine(&self) -> &MicroBetMachine {
        &self.machine
    }

    /// Run one tick. Returns true when background bet work was started.
    pub fn tick(&mut self) -> bool {
        if self.plays.is_empty() {
            debug!("No plays loaded, skipping tick");
            return false;
        }

        let index = self.cursor;
        let active_id = self.machine.active_bet_id().map(str::to_string);
        let event = BroadcastEvent::play(&self.game_id, &self.plays[index], active_id, Utc::now());

        let dispatched = match self.machine.on_tick(index, &event) {
            Some(command) => {
                self.executor.dispatch(command);
                true
            }
            None => false,
        };

        match self.publisher.publish(&event) {
            Ok(n) => debug!(
                "Tick {}: play {} sent to {} subscriber(s)",
                index,
                event.payload.id.as_deref().unwrap_or("?"),
                n
            ),
            Err(e) => CoordinatorError::from(e).report(&format!("Tick {} not broadcast", index)),
        }

        self.cursor = (index + 1) % self.plays.len();
        dispatched
    }

    /// Wait for the next background completion and apply it.
    /// Returns false once no more completions can arrive.
    pub async fn next_completion(&mut self) -> bool {
        match self.completions.recv().await {
            Some(completion) => {
                self.machine.apply(completion);
                true
            }
            None => false,
        }
    }

    /// Drive ticks forever on a fixed period.
    pub async fn run(mut self, period: Duration) {
        info!(
            "Play clock started ({} plays, period {:?}, game {})",
            self.plays.len(),
            period,
            self.game_id
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                true = self.next_completion() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{BetAnswer, BetStatus};
    use crate::error::PublishError;
    use crate::microbet::executor::fakes::{FakeGenerator, FakeJudge, MemoryStore};
    use crate::microbet::state::BetState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BroadcastEvent>>,
    }

    impl Recorder {
        fn bet_ids(&self) -> Vec<Option<String>> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.active_micro_bet_id.clone())
                .collect()
        }
    }

    impl Publisher for Recorder {
        fn publish(&self, event: &BroadcastEvent) -> Result<usize, PublishError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(1)
        }
    }

    struct Harness {
        clock: PlayClock,
        recorder: Arc<Recorder>,
        generator: Arc<FakeGenerator>,
        judge: Arc<FakeJudge>,
        store: Arc<MemoryStore>,
    }

    fn plays(n: usize) -> Vec<PlayRecord> {
        (0..n)
            .map(|i| PlayRecord {
                id: Some(format!("p{}", i)),
                home_points: Some(i as i32),
                away_points: if i % 2 == 0 { Some(3) } else { None },
                description: Some(format!("play number {}", i)),
                ..Default::default()
            })
            .collect()
    }

    fn harness(n: usize, judge: FakeJudge, store: MemoryStore) -> Harness {
        let recorder = Arc::new(Recorder::default());
        harness_with(n, judge, store, recorder.clone(), recorder)
    }

    fn harness_with(
        n: usize,
        judge: FakeJudge,
        store: MemoryStore,
        publisher: Arc<dyn Publisher>,
        recorder: Arc<Recorder>,
    ) -> Harness {
        let generator = Arc::new(FakeGenerator::ok());
        let judge = Arc::new(judge);
        let store = Arc::new(store);
        let (executor, completions) = BetExecutor::new(
            generator.clone(),
            judge.clone(),
            store.clone(),
            "Georgia Tech",
            "University of Georgia",
            Duration::from_secs(5),
        );
        let clock = PlayClock::new(plays(n), "gt-vs-uga-2025", executor, completions, publisher);
        Harness {
            clock,
            recorder,
            generator,
            judge,
            store,
        }
    }

    /// Tick, then let any started background work land before the next tick.
    async fn settle_tick(clock: &mut PlayClock) {
        if clock.tick() {
            assert!(clock.next_completion().await);
        }
    }

    #[tokio::test]
    async fn cursor_wraps_modulo_the_play_count() {
        let mut h = harness(4, FakeJudge::answering(BetAnswer::Opt1), MemoryStore::default());
        for n in 1..=11 {
            settle_tick(&mut h.clock).await;
            assert_eq!(h.clock.cursor(), n % 4);
        }
        let ids: Vec<_> = h
            .recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.payload.id.clone().unwrap())
            .collect();
        assert_eq!(ids[..6], ["p0", "p1", "p2", "p3", "p0", "p1"]);
    }

    #[tokio::test]
    async fn empty_play_list_is_a_no_op() {
        let mut h = harness(0, FakeJudge::failing(), MemoryStore::default());
        assert!(!h.clock.tick());
        assert!(!h.clock.tick());
        assert_eq!(h.clock.cursor(), 0);
        assert!(h.recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scores_come_from_the_play_with_zero_default() {
        let mut h = harness(2, FakeJudge::failing(), MemoryStore::default());
        h.clock.tick();
        h.clock.tick();
        let events = h.recorder.events.lock().unwrap();
        assert_eq!((events[0].home_team_score, events[0].away_team_score), (0, 3));
        assert_eq!((events[1].home_team_score, events[1].away_team_score), (1, 0));
        assert!(events.iter().all(|e| e.game_id == "gt-vs-uga-2025"));
    }

    #[tokio::test]
    async fn six_play_cycle_opens_at_two_and_five_and_closes_at_three() {
        let mut h = harness(6, FakeJudge::answering(BetAnswer::Neither), MemoryStore::default());

        // Tick 0: resolve phase with nothing open.
        assert!(!h.clock.tick());
        assert_eq!(h.clock.machine().state(), &BetState::Idle);
        settle_tick(&mut h.clock).await;

        // Tick 2: open.
        assert!(h.clock.tick());
        assert!(h.clock.next_completion().await);
        assert_eq!(h.clock.machine().active_bet_id(), Some("mb_1"));

        // Tick 3: resolve against play 3.
        assert!(h.clock.tick());
        assert!(h.clock.next_completion().await);
        assert_eq!(h.clock.machine().state(), &BetState::Idle);
        let first = h.store.get("mb_1").unwrap();
        assert_eq!(first.status, BetStatus::Closed);
        assert_eq!(first.donation_amount, Some(250));
        assert_eq!(first.action_description.as_deref(), Some("play number 3"));

        settle_tick(&mut h.clock).await;

        // Tick 5: open again.
        assert!(h.clock.tick());
        assert!(h.clock.next_completion().await);
        assert_eq!(h.clock.machine().active_bet_id(), Some("mb_2"));

        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.judge.calls.load(Ordering::SeqCst), 1);
        assert!(h.store.get("mb_2").unwrap().is_active());
    }

    #[tokio::test]
    async fn broadcast_carries_the_confirmed_bet_id_until_resolution() {
        let mut h = harness(6, FakeJudge::answering(BetAnswer::Opt1), MemoryStore::default());
        for _ in 0..7 {
            settle_tick(&mut h.clock).await;
        }
        let mb1 = Some("mb_1".to_string());
        let mb2 = Some("mb_2".to_string());
        // Tick 2 goes out before the store has assigned an id (see DESIGN.md,
        // "activeMicroBetId on the opening tick").
        assert_eq!(
            h.recorder.bet_ids(),
            vec![None, None, None, mb1, None, None, mb2]
        );
    }

    #[tokio::test]
    async fn judge_failure_leaves_the_bet_active() {
        let mut h = harness(6, FakeJudge::failing(), MemoryStore::default());
        for _ in 0..6 {
            settle_tick(&mut h.clock).await;
        }
        // Opened at 2, failed resolve at 3, no second open at 5.
        assert_eq!(h.clock.machine().active_bet_id(), Some("mb_1"));
        assert_eq!(h.store.get("mb_1").unwrap().status, BetStatus::Active);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);

        // Tick 6 (cursor 0) retries resolution against the same bet.
        assert!(h.clock.tick());
        assert!(h.clock.next_completion().await);
        assert_eq!(h.judge.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.clock.machine().active_bet_id(), Some("mb_1"));
    }

    struct BrokenPublisher {
        attempts: AtomicUsize,
    }

    impl Publisher for BrokenPublisher {
        fn publish(&self, _event: &BroadcastEvent) -> Result<usize, PublishError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            Err(PublishError::Encode(err))
        }
    }

    #[tokio::test]
    async fn failed_publish_still_advances_and_runs_bets() {
        let publisher = Arc::new(BrokenPublisher {
            attempts: AtomicUsize::new(0),
        });
        let mut h = harness_with(
            6,
            FakeJudge::answering(BetAnswer::Opt2),
            MemoryStore::default(),
            publisher.clone(),
            Arc::new(Recorder::default()),
        );

        for n in 1..=13 {
            settle_tick(&mut h.clock).await;
            assert_eq!(h.clock.cursor(), n % 6);
        }
        assert_eq!(publisher.attempts.load(Ordering::SeqCst), 13);

        // Opens at ticks 2, 5, 8 and 11, each closed on the following tick.
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.judge.calls.load(Ordering::SeqCst), 4);
        for id in ["mb_1", "mb_2", "mb_3", "mb_4"] {
            assert_eq!(h.store.get(id).unwrap().status, BetStatus::Closed, "{}", id);
        }
        assert_eq!(h.clock.machine().state(), &BetState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_does_not_delay_broadcasts() {
        let store = MemoryStore {
            create_delay: Duration::from_secs(3),
            ..Default::default()
        };
        let mut h = harness(6, FakeJudge::answering(BetAnswer::Opt1), store);

        for _ in 0..6 {
            h.clock.tick();
        }
        // Every tick published even though the open is still in flight, and
        // the resolve phase at tick 3 did not fire against the pending bet.
        assert_eq!(h.recorder.events.lock().unwrap().len(), 6);
        assert!(matches!(h.clock.machine().state(), BetState::OpenPending { .. }));
        assert_eq!(h.judge.calls.load(Ordering::SeqCst), 0);

        assert!(h.clock.next_completion().await);
        assert_eq!(h.clock.machine().active_bet_id(), Some("mb_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_ticking_on_the_period() {
        let h = harness(6, FakeJudge::answering(BetAnswer::Neither), MemoryStore::default());
        let recorder = h.recorder.clone();
        let store = h.store.clone();
        let task = tokio::spawn(h.clock.run(Duration::from_secs(4)));

        // interval fires immediately, then every 4s: ticks at 0,4,...,20
        tokio::time::sleep(Duration::from_secs(22)).await;
        task.abort();

        let ids = recorder.bet_ids();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[3].as_deref(), Some("mb_1"));
        assert_eq!(store.get("mb_1").unwrap().status, BetStatus::Closed);
        assert!(store.get("mb_2").unwrap().is_active());
    }
}
