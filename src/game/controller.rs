//! Match controller: turn rotation, tier progression, scoring and termination
//!
//! The controller is a synchronous state machine with a single owner (the match
//! task). It never touches the runtime: every state transition returns a list of
//! [`Effect`]s, either messages to broadcast or callbacks to schedule. Scheduled
//! callbacks carry the generation they were created under, and any callback that
//! arrives with a stale generation is a silent no-op. That is what makes a
//! restart safe while a ball is still in flight.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::EndRules;
use crate::util::time::{ANSWER_RESOLVE_DELAY, CELEBRATION_DURATION, TURN_SWITCH_DELAY};
use crate::ws::protocol::{RosterEntry, ScoreEntry, ServerMsg, Tier};

use super::questions::{Question, QuestionBank};

/// A batter in the match
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub score: u32,
    pub is_bot: bool,
}

impl Player {
    pub fn new(id: Uuid, name: String, color: String) -> Self {
        Self {
            id,
            name,
            color,
            score: 0,
            is_bot: false,
        }
    }

    pub fn bot(name: String, color: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            color,
            score: 0,
            is_bot: true,
        }
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// No match running, roster editable
    Lobby,
    /// Current player may answer, countdown running
    InProgress,
    /// Answer locked in, ball in flight or wicket pause; input blocked,
    /// countdown paused
    Resolving,
    /// Match over, waiting for restart
    Ended,
}

/// Callbacks the match task schedules on the controller's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEventKind {
    /// Ball flight finished, settle the pending answer
    ResolveAnswer,
    /// Clear the six celebration flag
    EndCelebration,
    /// Rotate the turn after a wicket pause
    AdvanceTurn,
    /// The bot opponent locks in its answer (handled by the match task)
    BotAnswer,
}

/// Output of a controller transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Broadcast to every connected client
    Send(ServerMsg),
    /// Deliver `kind` back to the controller after `delay`, unless the
    /// generation has moved on by then
    Schedule {
        delay: Duration,
        generation: u64,
        kind: TimedEventKind,
    },
}

/// Why a start request was refused
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MatchRejected {
    #[error("Need at least 2 players, got {0}")]
    NotEnoughPlayers(usize),

    #[error("Turn duration must be at least 1 second")]
    InvalidTurnDuration,

    #[error("A match is already in progress")]
    AlreadyRunning,
}

/// The authoritative match state. One instance per match, reset wholesale on
/// restart.
pub struct MatchController {
    phase: MatchPhase,
    players: Vec<Player>,
    current_player: usize,
    tier: Tier,
    /// Monotonic question counter, never reset mid-match
    question_cursor: usize,
    seconds_remaining: u32,
    turn_duration_secs: u32,
    last_answer_correct: Option<bool>,
    celebrating: bool,
    wicket_down: bool,
    /// Bumped on start, restart and end; invalidates scheduled callbacks
    generation: u64,
    bank: QuestionBank,
    end_rules: EndRules,
    rng: ChaCha8Rng,
}

impl MatchController {
    pub fn new(bank: QuestionBank, end_rules: EndRules, seed: u64) -> Self {
        Self {
            phase: MatchPhase::Lobby,
            players: Vec::new(),
            current_player: 0,
            tier: Tier::Medium,
            question_cursor: 0,
            seconds_remaining: 0,
            turn_duration_secs: 0,
            last_answer_correct: None,
            celebrating: false,
            wicket_down: false,
            generation: 0,
            bank,
            end_rules,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Start a match with the given roster. Shuffles each tier's question list
    /// independently, zeroes scores, starts at player 0 on the medium tier.
    pub fn start_match(
        &mut self,
        players: Vec<Player>,
        turn_duration_secs: u32,
    ) -> Result<Vec<Effect>, MatchRejected> {
        if matches!(self.phase, MatchPhase::InProgress | MatchPhase::Resolving) {
            return Err(MatchRejected::AlreadyRunning);
        }
        if players.len() < 2 {
            return Err(MatchRejected::NotEnoughPlayers(players.len()));
        }
        if turn_duration_secs == 0 {
            return Err(MatchRejected::InvalidTurnDuration);
        }

        self.generation += 1;
        self.bank.shuffle_all(&mut self.rng);

        self.players = players;
        for p in &mut self.players {
            p.score = 0;
        }
        self.current_player = 0;
        self.tier = Tier::Medium;
        self.question_cursor = 0;
        self.turn_duration_secs = turn_duration_secs;
        self.seconds_remaining = turn_duration_secs;
        self.last_answer_correct = None;
        self.celebrating = false;
        self.wicket_down = false;
        self.phase = MatchPhase::InProgress;

        Ok(vec![
            Effect::Send(ServerMsg::TurnChanged {
                player_id: self.players[0].id,
                seconds_remaining: self.seconds_remaining,
            }),
            Effect::Send(self.question_msg()),
        ])
    }

    /// Lock in an answer for the current player. A silent no-op while a
    /// previous answer is resolving, when the match is over, or when the
    /// submitter is not the current batter.
    pub fn submit_answer(&mut self, player_id: Uuid, option: &str) -> Vec<Effect> {
        if self.phase != MatchPhase::InProgress {
            return Vec::new();
        }
        if self.players[self.current_player].id != player_id {
            debug!(%player_id, "Answer from a player who is not batting, ignored");
            return Vec::new();
        }

        let correct = option == self.current_question().answer;
        self.last_answer_correct = Some(correct);
        self.phase = MatchPhase::Resolving;

        vec![
            Effect::Send(ServerMsg::BallBowled { player_id }),
            Effect::Schedule {
                delay: ANSWER_RESOLVE_DELAY,
                generation: self.generation,
                kind: TimedEventKind::ResolveAnswer,
            },
        ]
    }

    /// Settle the pending answer once the ball has landed.
    pub fn resolve_answer(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.phase != MatchPhase::Resolving {
            return Vec::new();
        }

        let correct = self.last_answer_correct.take().unwrap_or(false);
        let player_id = self.players[self.current_player].id;
        self.question_cursor += 1;

        let mut effects = Vec::new();
        if correct {
            let points = self.tier.points();
            self.players[self.current_player].score += points;
            self.tier = self.tier.escalate();
            self.celebrating = true;
            self.phase = MatchPhase::InProgress;

            effects.push(Effect::Send(ServerMsg::AnswerResolved {
                player_id,
                correct: true,
                points,
                tier: self.tier,
                scores: self.scores(),
            }));
            effects.push(Effect::Schedule {
                delay: CELEBRATION_DURATION,
                generation: self.generation,
                kind: TimedEventKind::EndCelebration,
            });
        } else {
            self.tier = self.tier.deescalate();
            self.wicket_down = true;
            // Phase stays Resolving through the wicket pause so no new answer
            // sneaks in before the turn rotates.

            effects.push(Effect::Send(ServerMsg::AnswerResolved {
                player_id,
                correct: false,
                points: 0,
                tier: self.tier,
                scores: self.scores(),
            }));
            effects.push(Effect::Schedule {
                delay: TURN_SWITCH_DELAY,
                generation: self.generation,
                kind: TimedEventKind::AdvanceTurn,
            });
        }
        effects.push(Effect::Send(self.question_msg()));
        effects
    }

    /// Clear the celebration flag.
    pub fn end_celebration(&mut self, generation: u64) -> Vec<Effect> {
        if generation == self.generation {
            self.celebrating = false;
        }
        Vec::new()
    }

    /// Rotate the turn after the wicket pause.
    pub fn advance_turn_scheduled(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.phase != MatchPhase::Resolving {
            return Vec::new();
        }
        self.wicket_down = false;
        self.phase = MatchPhase::InProgress;
        self.advance_turn()
    }

    /// One step of the countdown. The countdown is deliberately paused while an
    /// answer is resolving, so a late timer can never double-advance a turn.
    pub fn tick_second(&mut self) -> Vec<Effect> {
        if self.phase != MatchPhase::InProgress {
            return Vec::new();
        }

        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        let mut effects = vec![Effect::Send(ServerMsg::TimerTick {
            seconds_remaining: self.seconds_remaining,
        })];
        if self.seconds_remaining == 0 {
            effects.extend(self.advance_turn());
        }
        effects
    }

    /// Wipe scores and return to the lobby. Player identities and colors are
    /// preserved; anything scheduled before the restart is invalidated.
    pub fn restart_match(&mut self) -> Vec<Effect> {
        if self.phase == MatchPhase::Lobby {
            return Vec::new();
        }

        self.generation += 1;
        for p in &mut self.players {
            p.score = 0;
        }
        self.phase = MatchPhase::Lobby;
        self.tier = Tier::Medium;
        self.question_cursor = 0;
        self.current_player = 0;
        self.seconds_remaining = 0;
        self.last_answer_correct = None;
        self.celebrating = false;
        self.wicket_down = false;

        vec![Effect::Send(ServerMsg::MatchReset {
            players: self.roster(),
        })]
    }

    /// Rotate to the next player, or end the match when the rotation is about
    /// to wrap and an end condition holds.
    fn advance_turn(&mut self) -> Vec<Effect> {
        if self.current_player == self.players.len() - 1 && self.end_condition_met() {
            return self.end_match();
        }

        self.current_player = (self.current_player + 1) % self.players.len();
        self.seconds_remaining = self.turn_duration_secs;
        vec![Effect::Send(ServerMsg::TurnChanged {
            player_id: self.players[self.current_player].id,
            seconds_remaining: self.seconds_remaining,
        })]
    }

    fn end_condition_met(&self) -> bool {
        let max = self.players.iter().map(|p| p.score).max().unwrap_or(0);
        let min = self.players.iter().map(|p| p.score).min().unwrap_or(0);

        max >= self.end_rules.target_score
            || max - min >= self.end_rules.score_spread
            || self.completed_rounds() >= self.end_rules.max_rounds
    }

    /// A round is one full pass through all players.
    pub fn completed_rounds(&self) -> u32 {
        if self.players.is_empty() {
            return 0;
        }
        (self.question_cursor / self.players.len()) as u32 + 1
    }

    fn end_match(&mut self) -> Vec<Effect> {
        self.phase = MatchPhase::Ended;
        // Kill any celebration/resolution still in flight
        self.generation += 1;

        let winner_player_id = self
            .players
            .iter()
            .max_by_key(|p| p.score)
            .map(|p| p.id);

        vec![Effect::Send(ServerMsg::MatchEnded {
            winner_player_id,
            scores: self.scores(),
        })]
    }

    /// The question the current player is facing
    pub fn current_question(&self) -> &Question {
        let list = self.bank.tier(self.tier);
        &list[self.question_cursor % list.len()]
    }

    fn question_msg(&self) -> ServerMsg {
        let q = self.current_question();
        ServerMsg::Question {
            prompt: q.prompt.clone(),
            options: q.options.to_vec(),
            tier: self.tier,
        }
    }

    pub fn scores(&self) -> Vec<ScoreEntry> {
        self.players
            .iter()
            .map(|p| ScoreEntry {
                player_id: p.id,
                name: p.name.clone(),
                color: p.color.clone(),
                score: p.score,
            })
            .collect()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.players
            .iter()
            .map(|p| RosterEntry {
                player_id: p.id,
                name: p.name.clone(),
                color: p.color.clone(),
            })
            .collect()
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current_player]
    }

    pub fn current_player_index(&self) -> usize {
        self.current_player
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn celebrating(&self) -> bool {
        self.celebrating
    }

    pub fn wicket_down(&self) -> bool {
        self.wicket_down
    }

    pub fn is_over(&self) -> bool {
        self.phase == MatchPhase::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> MatchController {
        MatchController::new(QuestionBank::default(), EndRules::default(), 42)
    }

    fn roster(n: usize) -> Vec<Player> {
        let colors = ["#FF6347", "#4169E1", "#32CD32", "#9370DB"];
        (0..n)
            .map(|i| {
                Player::new(
                    Uuid::new_v4(),
                    format!("Player {}", i + 1),
                    colors[i % colors.len()].to_string(),
                )
            })
            .collect()
    }

    fn started(n: usize, turn_secs: u32) -> MatchController {
        let mut c = controller();
        c.start_match(roster(n), turn_secs).unwrap();
        c
    }

    /// Submit an answer for the current player and drive it through the
    /// resolution delay.
    fn answer(c: &mut MatchController, correct: bool) {
        let option = if correct {
            c.current_question().answer.clone()
        } else {
            let q = c.current_question();
            q.options
                .iter()
                .find(|o| **o != q.answer)
                .unwrap()
                .clone()
        };
        let effects = c.submit_answer(c.current_player().id, &option);
        assert!(!effects.is_empty(), "answer should have been accepted");
        c.resolve_answer(c.generation());
        if !correct {
            c.advance_turn_scheduled(c.generation());
        }
    }

    /// Run the current turn out via timer expiry.
    fn time_out_turn(c: &mut MatchController) {
        let remaining = c.seconds_remaining();
        for _ in 0..remaining {
            c.tick_second();
        }
    }

    #[test]
    fn start_sets_initial_state() {
        let c = started(3, 45);
        assert_eq!(c.phase(), MatchPhase::InProgress);
        assert_eq!(c.tier(), Tier::Medium);
        assert_eq!(c.current_player_index(), 0);
        assert_eq!(c.seconds_remaining(), 45);
        assert!(c.players().iter().all(|p| p.score == 0));
    }

    #[test]
    fn start_requires_two_players() {
        let mut c = controller();
        assert_eq!(
            c.start_match(roster(1), 45).unwrap_err(),
            MatchRejected::NotEnoughPlayers(1)
        );
        assert_eq!(c.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn start_requires_nonzero_turn_duration() {
        let mut c = controller();
        assert_eq!(
            c.start_match(roster(2), 0).unwrap_err(),
            MatchRejected::InvalidTurnDuration
        );
    }

    #[test]
    fn start_rejected_while_running() {
        let mut c = started(2, 45);
        assert_eq!(
            c.start_match(roster(2), 45).unwrap_err(),
            MatchRejected::AlreadyRunning
        );
    }

    #[test]
    fn correct_answer_scores_by_tier_and_escalates() {
        let mut c = started(2, 45);

        answer(&mut c, true); // medium: +4
        assert_eq!(c.players()[0].score, 4);
        assert_eq!(c.players()[1].score, 0);
        assert_eq!(c.tier(), Tier::Hard);
        assert!(c.celebrating());

        answer(&mut c, true); // hard: +6, clamped at hard
        assert_eq!(c.players()[0].score, 10);
        assert_eq!(c.tier(), Tier::Hard);
    }

    #[test]
    fn incorrect_answer_deescalates_and_rotates() {
        let mut c = started(2, 45);

        answer(&mut c, false);
        assert_eq!(c.players()[0].score, 0);
        assert_eq!(c.tier(), Tier::Easy);
        assert_eq!(c.current_player_index(), 1);
        assert_eq!(c.seconds_remaining(), 45, "timer resets on rotation");

        // Next correct answer at easy is worth 2
        answer(&mut c, true);
        assert_eq!(c.players()[1].score, 2);
        assert_eq!(c.tier(), Tier::Medium);
    }

    #[test]
    fn tier_never_leaves_range() {
        let mut c = started(2, 500);
        for _ in 0..4 {
            answer(&mut c, false);
        }
        assert_eq!(c.tier(), Tier::Easy);

        for _ in 0..5 {
            if c.is_over() {
                return;
            }
            answer(&mut c, true);
        }
        assert_eq!(c.tier(), Tier::Hard);
    }

    #[test]
    fn turn_rotation_is_cyclic() {
        let mut c = started(3, 1);
        for expected in [1, 2, 0, 1] {
            time_out_turn(&mut c);
            assert_eq!(c.current_player_index(), expected);
        }
        assert!(!c.is_over(), "all-zero scores should not end the match");
    }

    #[test]
    fn timer_expiry_advances_and_resets() {
        let mut c = started(2, 3);
        c.tick_second();
        assert_eq!(c.seconds_remaining(), 2);
        c.tick_second();
        c.tick_second();
        assert_eq!(c.current_player_index(), 1);
        assert_eq!(c.seconds_remaining(), 3);
    }

    #[test]
    fn countdown_pauses_while_resolving() {
        let mut c = started(2, 45);
        let opt = c.current_question().options[0].clone();
        c.submit_answer(c.current_player().id, &opt);
        assert_eq!(c.phase(), MatchPhase::Resolving);

        assert!(c.tick_second().is_empty());
        assert_eq!(c.seconds_remaining(), 45);
    }

    #[test]
    fn submit_is_idempotent_while_resolving() {
        let mut c = started(2, 45);
        let correct = c.current_question().answer.clone();
        let first = c.submit_answer(c.current_player().id, &correct);
        assert_eq!(first.len(), 2);

        // Second submission before resolution registers nothing
        let second = c.submit_answer(c.current_player().id, &correct);
        assert!(second.is_empty());

        c.resolve_answer(c.generation());
        assert_eq!(c.players()[0].score, 4);
    }

    #[test]
    fn only_current_player_may_answer() {
        let mut c = started(2, 45);
        let other = c.players()[1].id;
        let correct = c.current_question().answer.clone();
        assert!(c.submit_answer(other, &correct).is_empty());
        assert_eq!(c.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn ends_when_leader_reaches_target_score() {
        let mut c = started(2, 45);
        // Player 0 bats through: 4 + 6 + 6 + 6 = 22 >= 20
        for _ in 0..4 {
            answer(&mut c, true);
        }
        assert!(!c.is_over(), "end rule only fires at the wrap point");

        time_out_turn(&mut c); // player 0 -> player 1, no check yet
        assert_eq!(c.current_player_index(), 1);
        time_out_turn(&mut c); // wrap point: leader at 22 ends it
        assert!(c.is_over());
    }

    #[test]
    fn ends_when_spread_reaches_threshold() {
        let mut c = started(2, 45);
        answer(&mut c, true); // +4 medium
        answer(&mut c, true); // +6 hard, spread now 10
        time_out_turn(&mut c);
        time_out_turn(&mut c);
        assert!(c.is_over());
    }

    #[test]
    fn ends_after_max_rounds() {
        let mut c = started(2, 45);
        // Wrong answers only: no score, no spread, cursor climbs. With two
        // players the rounds cap is hit after 22 questions.
        let mut answers = 0;
        while !c.is_over() {
            answer(&mut c, false);
            answers += 1;
            assert!(answers <= 22, "rounds cap should have ended the match");
        }
        assert_eq!(answers, 22);
        assert_eq!(c.completed_rounds(), 12);
    }

    #[test]
    fn match_end_reports_winner() {
        let mut c = started(2, 45);
        answer(&mut c, true);
        answer(&mut c, true); // player 0 at 10, spread 10
        let winner = c.players()[0].id;
        time_out_turn(&mut c);

        // Run player 1's turn out; the wrap evaluation ends the match
        let mut effects = Vec::new();
        for _ in 0..c.seconds_remaining() {
            effects.extend(c.tick_second());
        }
        assert!(c.is_over());
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Send(ServerMsg::MatchEnded { winner_player_id: Some(id), .. }) if *id == winner
        )));
    }

    #[test]
    fn two_player_reference_sequence() {
        // 2 players, 30s turns. Player 1 takes medium (+4, tier -> hard) and
        // hard (+6, stays hard), times out; player 2 falls to a wicket at
        // hard, tier drops one step. The wrap evaluation that follows the
        // wicket ends the match on the ten-run spread, player 1 the winner.
        let mut c = started(2, 30);
        let winner = c.players()[0].id;
        answer(&mut c, true);
        answer(&mut c, true);
        assert_eq!(c.players()[0].score, 10);

        time_out_turn(&mut c);
        assert_eq!(c.current_player_index(), 1);
        assert_eq!(c.tier(), Tier::Hard);

        let wrong = {
            let q = c.current_question();
            q.options
                .iter()
                .find(|o| **o != q.answer)
                .unwrap()
                .clone()
        };
        c.submit_answer(c.players()[1].id, &wrong);
        c.resolve_answer(c.generation());
        assert_eq!(c.players()[1].score, 0);
        assert_eq!(c.tier(), Tier::Medium);

        let effects = c.advance_turn_scheduled(c.generation());
        assert!(c.is_over());
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Send(ServerMsg::MatchEnded { winner_player_id: Some(id), .. }) if *id == winner
        )));
    }

    #[test]
    fn restart_preserves_identity_and_zeroes_scores() {
        let mut c = started(3, 45);
        let ids: Vec<Uuid> = c.players().iter().map(|p| p.id).collect();
        let colors: Vec<String> = c.players().iter().map(|p| p.color.clone()).collect();

        answer(&mut c, true);
        answer(&mut c, false);
        assert!(c.players().iter().any(|p| p.score > 0));

        c.restart_match();
        assert_eq!(c.phase(), MatchPhase::Lobby);
        assert!(!c.is_over());
        assert!(c.players().iter().all(|p| p.score == 0));
        assert_eq!(ids, c.players().iter().map(|p| p.id).collect::<Vec<_>>());
        assert_eq!(
            colors,
            c.players().iter().map(|p| p.color.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn stale_resolution_after_restart_is_discarded() {
        let mut c = started(2, 45);
        let correct = c.current_question().answer.clone();
        c.submit_answer(c.current_player().id, &correct);
        let stale_generation = c.generation();

        c.restart_match();
        let effects = c.resolve_answer(stale_generation);
        assert!(effects.is_empty());
        assert!(c.players().iter().all(|p| p.score == 0));
        assert_eq!(c.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn stale_advance_after_new_match_is_discarded() {
        let mut c = started(2, 45);
        answer(&mut c, true);
        let stale_generation = c.generation();

        c.restart_match();
        c.start_match(roster(2), 45).unwrap();
        assert!(c.advance_turn_scheduled(stale_generation).is_empty());
        assert_eq!(c.current_player_index(), 0);
    }

    #[test]
    fn ticks_after_match_end_are_noops() {
        let mut c = started(2, 45);
        answer(&mut c, true);
        answer(&mut c, true);
        time_out_turn(&mut c);
        time_out_turn(&mut c);
        assert!(c.is_over());

        assert!(c.tick_second().is_empty());
        assert!(c.submit_answer(c.players()[0].id, "4").is_empty());
    }

    #[test]
    fn question_selection_wraps_around_tier_list() {
        let mut c = started(2, 45);
        let easy_len = c.bank.tier(Tier::Easy).len();

        // Drop to easy and stay there with wrong answers; the cursor keeps
        // climbing but the prompt must always come from the easy list.
        for _ in 0..easy_len + 2 {
            if c.is_over() {
                return;
            }
            answer(&mut c, false);
            let prompt = c.current_question().prompt.clone();
            assert!(c
                .bank
                .tier(c.tier())
                .iter()
                .any(|q| q.prompt == prompt));
        }
    }
}
