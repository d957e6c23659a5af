//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty tier of the active question pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

impl Tier {
    /// Points awarded for a correct answer at this tier
    pub fn points(self) -> u32 {
        match self {
            Tier::Easy => 2,
            Tier::Medium => 4,
            Tier::Hard => 6,
        }
    }

    /// One step harder, clamped at Hard
    pub fn escalate(self) -> Self {
        match self {
            Tier::Easy => Tier::Medium,
            Tier::Medium | Tier::Hard => Tier::Hard,
        }
    }

    /// One step easier, clamped at Easy
    pub fn deescalate(self) -> Self {
        match self {
            Tier::Hard => Tier::Medium,
            Tier::Medium | Tier::Easy => Tier::Easy,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Medium
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Set or update the player's name and batting color
    Join {
        name: Option<String>,
        /// Hex display color, assigned from the palette if omitted
        color: Option<String>,
    },

    /// Request match start with everyone currently in the lobby
    StartMatch {
        /// Seconds per turn, server default if omitted
        turn_duration_secs: Option<u32>,
        /// Play against the built-in opponent instead of waiting for others
        #[serde(default)]
        vs_bot: bool,
    },

    /// Answer the current question
    SubmitAnswer {
        option: String,
    },

    /// Reset scores and return everyone to the lobby
    RestartMatch,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the lobby
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        player_id: Uuid,
        server_time: u64,
    },

    /// The lobby roster changed (join, leave, rename)
    RosterChanged {
        players: Vec<RosterEntry>,
    },

    /// A match is starting with the current roster
    MatchStarted,

    /// The question the current player is facing
    Question {
        prompt: String,
        options: Vec<String>,
        tier: Tier,
    },

    /// One second elapsed on the turn countdown
    TimerTick {
        seconds_remaining: u32,
    },

    /// An answer was locked in, the ball is in flight
    BallBowled {
        player_id: Uuid,
    },

    /// The ball landed: six or wicket
    AnswerResolved {
        player_id: Uuid,
        correct: bool,
        /// Points awarded (0 on a wicket)
        points: u32,
        /// Tier after escalation/de-escalation
        tier: Tier,
        scores: Vec<ScoreEntry>,
    },

    /// The turn rotated to another batter
    TurnChanged {
        player_id: Uuid,
        seconds_remaining: u32,
    },

    /// Match is over
    MatchEnded {
        winner_player_id: Option<Uuid>,
        scores: Vec<ScoreEntry>,
    },

    /// Match was restarted, scores wiped, back to the lobby
    MatchReset {
        players: Vec<RosterEntry>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Roster entry for lobby broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub player_id: Uuid,
    pub name: String,
    pub color: String,
}

/// Per-player score line for leaderboard updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player_id: Uuid,
    pub name: String,
    pub color: String,
    pub score: u32,
}
