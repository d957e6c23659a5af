//! Game simulation modules

pub mod controller;
pub mod r#match;
pub mod questions;

pub use controller::Player;
pub use r#match::{MatchHandle, MatchOptions, MatchRegistry, QuizMatch};

use crate::ws::protocol::ClientMsg;
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub msg: ClientMsg,
    pub received_at: u64,
}
