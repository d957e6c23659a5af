//! Async match task and registry
//!
//! The task owns the [`MatchController`] and is its only caller: inputs arrive
//! on an mpsc channel, everything observable leaves on the shared broadcast
//! channel, and time enters through a fixed-rate tick loop. Delayed callbacks
//! are deadlines on the loop's clock, checked every tick.

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EndRules;
use crate::util::time::TICK_DURATION_MILLIS;
use crate::ws::protocol::{ClientMsg, ServerMsg, Tier};

use super::controller::{Effect, MatchController, MatchPhase, Player, TimedEventKind};
use super::questions::QuestionBank;
use super::PlayerInput;

/// Per-match tuning decided at start time
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub turn_duration_secs: u32,
    pub end_rules: EndRules,
    /// One of the roster entries is the built-in opponent
    pub vs_bot: bool,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    /// Connected (non-bot) players still attached to the match
    pub player_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A scheduled callback: fire `kind` at `deadline` unless `generation` has
/// moved on by then
type PendingEvent = (Instant, u64, TimedEventKind);

/// The authoritative quiz match
pub struct QuizMatch {
    id: Uuid,
    controller: MatchController,
    roster: Vec<Player>,
    options: MatchOptions,
    input_rx: mpsc::Receiver<PlayerInput>,
    events_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    pending: Vec<PendingEvent>,
    rng: ChaCha8Rng,
}

impl QuizMatch {
    /// Create a new match. `events_tx` is the room-wide broadcast channel the
    /// lobby hands out to every connection.
    pub fn new(
        id: Uuid,
        seed: u64,
        roster: Vec<Player>,
        bank: QuestionBank,
        options: MatchOptions,
        events_tx: broadcast::Sender<ServerMsg>,
    ) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(64);
        let connected = roster.iter().filter(|p| !p.is_bot).count();
        let player_count = Arc::new(AtomicUsize::new(connected));

        let handle = MatchHandle {
            id,
            input_tx,
            player_count: player_count.clone(),
        };

        let quiz_match = Self {
            id,
            controller: MatchController::new(bank, options.end_rules, seed),
            roster,
            options,
            input_rx,
            events_tx,
            player_count,
            pending: Vec::new(),
            // Separate stream from the shuffle RNG so bot behavior doesn't
            // perturb question order
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
        };

        (quiz_match, handle)
    }

    /// Run the match to completion
    pub async fn run(mut self) {
        info!(
            match_id = %self.id,
            players = self.roster.len(),
            turn_secs = self.options.turn_duration_secs,
            vs_bot = self.options.vs_bot,
            "Match starting"
        );

        let roster = std::mem::take(&mut self.roster);
        match self
            .controller
            .start_match(roster, self.options.turn_duration_secs)
        {
            Ok(effects) => self.apply(effects),
            Err(e) => {
                warn!(match_id = %self.id, error = %e, "Match start rejected");
                let _ = self.events_tx.send(ServerMsg::Error {
                    code: "start_rejected".to_string(),
                    message: e.to_string(),
                });
                return;
            }
        }

        let mut tick = interval(Duration::from_millis(TICK_DURATION_MILLIS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut next_second = Instant::now() + Duration::from_secs(1);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Instant::now();
                    self.fire_due(now);
                    // One countdown step per elapsed wall second, on a fixed
                    // cadence so tick jitter doesn't stretch turns
                    while now >= next_second {
                        next_second += Duration::from_secs(1);
                        let effects = self.controller.tick_second();
                        self.apply(effects);
                    }
                }
                input = self.input_rx.recv() => {
                    match input {
                        Some(input) => self.handle_input(input),
                        None => {
                            debug!(match_id = %self.id, "Input channel closed");
                            break;
                        }
                    }
                }
            }

            if self.controller.phase() == MatchPhase::Lobby {
                info!(match_id = %self.id, "Match reset, returning to lobby");
                break;
            }
            if self.player_count.load(Ordering::Relaxed) == 0 {
                info!(match_id = %self.id, "All players left, ending match");
                break;
            }
        }

        info!(match_id = %self.id, "Match task finished");
    }

    fn handle_input(&mut self, input: PlayerInput) {
        match input.msg {
            ClientMsg::SubmitAnswer { option } => {
                let effects = self.controller.submit_answer(input.player_id, &option);
                self.apply(effects);
            }
            ClientMsg::RestartMatch => {
                info!(
                    match_id = %self.id,
                    player_id = %input.player_id,
                    "Match restart requested"
                );
                let effects = self.controller.restart_match();
                self.apply(effects);
            }
            ClientMsg::Ping { t } => {
                let _ = self.events_tx.send(ServerMsg::Pong { t });
            }
            other => {
                debug!(match_id = %self.id, ?other, "Unexpected message for a running match");
            }
        }
    }

    /// Fire every scheduled callback whose deadline has passed
    fn fire_due(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.pending.retain(|(deadline, generation, kind)| {
            if *deadline <= now {
                due.push((*generation, *kind));
                false
            } else {
                true
            }
        });

        for (generation, kind) in due {
            let effects = match kind {
                TimedEventKind::ResolveAnswer => self.controller.resolve_answer(generation),
                TimedEventKind::EndCelebration => self.controller.end_celebration(generation),
                TimedEventKind::AdvanceTurn => self.controller.advance_turn_scheduled(generation),
                TimedEventKind::BotAnswer => self.bot_answer(generation),
            };
            self.apply(effects);
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(msg) => {
                    // A send only fails when nobody is subscribed; the match
                    // keeps running so late subscribers catch the next event
                    let _ = self.events_tx.send(msg);
                }
                Effect::Schedule {
                    delay,
                    generation,
                    kind,
                } => {
                    self.pending.push((Instant::now() + delay, generation, kind));
                }
            }
        }
        self.maybe_schedule_bot();
    }

    /// Queue a think delay for the bot whenever it is the bot's turn to bat
    fn maybe_schedule_bot(&mut self) {
        if self.controller.phase() != MatchPhase::InProgress
            || !self.controller.current_player().is_bot
        {
            return;
        }
        let generation = self.controller.generation();
        let already_queued = self
            .pending
            .iter()
            .any(|(_, g, k)| *g == generation && *k == TimedEventKind::BotAnswer);
        if already_queued {
            return;
        }

        let think = Duration::from_millis(self.rng.gen_range(1_500..4_000));
        self.pending
            .push((Instant::now() + think, generation, TimedEventKind::BotAnswer));
    }

    /// The bot locks in an answer, correct with a per-tier probability
    fn bot_answer(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.controller.generation()
            || self.controller.phase() != MatchPhase::InProgress
            || !self.controller.current_player().is_bot
        {
            return Vec::new();
        }

        let (answer, options) = {
            let q = self.controller.current_question();
            (q.answer.clone(), q.options.clone())
        };
        let accuracy = match self.controller.tier() {
            Tier::Easy => 0.9,
            Tier::Medium => 0.65,
            Tier::Hard => 0.45,
        };

        let option = if self.rng.gen_bool(accuracy) {
            answer
        } else {
            let wrong: Vec<&String> = options.iter().filter(|o| **o != answer).collect();
            if wrong.is_empty() {
                answer
            } else {
                wrong[self.rng.gen_range(0..wrong.len())].clone()
            }
        };

        let bot_id = self.controller.current_player().id;
        self.controller.submit_answer(bot_id, &option)
    }
}
