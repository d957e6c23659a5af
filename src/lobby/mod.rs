//! Lobby service: connected roster and match start
//!
//! One shared room. Connections register into the roster, every roster change
//! is broadcast, and any player can start a match with whoever is present. The
//! lobby owns the room-wide broadcast channel; a running match sends its events
//! on the same channel, so a connection only ever holds one receiver.

use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::game::questions::QuestionBank;
use crate::game::{MatchHandle, MatchOptions, MatchRegistry, Player, PlayerInput, QuizMatch};
use crate::ws::protocol::{ClientMsg, RosterEntry, ServerMsg};

/// Batting colors offered in order of join; late joiners get the fallback
const PALETTE: [&str; 4] = ["#FF6347", "#4169E1", "#32CD32", "#9370DB"];
const FALLBACK_COLOR: &str = "#FFD700";
const BOT_NAME: &str = "The Wall";

/// A connected player waiting in the lobby
#[derive(Debug, Clone)]
pub struct LobbyPlayer {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

/// The match currently being played by this room
struct CurrentMatch {
    handle: MatchHandle,
    /// Roster members who went into the match (bots excluded)
    members: Vec<Uuid>,
}

/// Why a start request was refused at the lobby level
#[derive(Debug, thiserror::Error)]
pub enum StartMatchError {
    #[error("Need at least 2 players in the lobby, got {0}")]
    NotEnoughPlayers(usize),

    #[error("A match is already running")]
    MatchAlreadyRunning,
}

/// Shared lobby state, injected into the WebSocket sessions and HTTP routes
pub struct LobbyService {
    config: Arc<Config>,
    bank: QuestionBank,
    registry: Arc<MatchRegistry>,
    roster: RwLock<Vec<LobbyPlayer>>,
    events_tx: broadcast::Sender<ServerMsg>,
    input_tx: mpsc::Sender<PlayerInput>,
    /// Taken once by `run`
    input_rx: Mutex<Option<mpsc::Receiver<PlayerInput>>>,
    current_match: Arc<RwLock<Option<CurrentMatch>>>,
}

impl LobbyService {
    pub fn new(config: Arc<Config>, bank: QuestionBank, registry: Arc<MatchRegistry>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        let (input_tx, input_rx) = mpsc::channel(256);

        Self {
            config,
            bank,
            registry,
            roster: RwLock::new(Vec::new()),
            events_tx,
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            current_match: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe to the room-wide event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events_tx.subscribe()
    }

    /// Sender WebSocket sessions push parsed client messages into
    pub fn input_sender(&self) -> mpsc::Sender<PlayerInput> {
        self.input_tx.clone()
    }

    pub fn roster_size(&self) -> usize {
        self.roster.read().len()
    }

    pub fn roster_entries(&self) -> Vec<RosterEntry> {
        self.roster
            .read()
            .iter()
            .map(|p| RosterEntry {
                player_id: p.id,
                name: p.name.clone(),
                color: p.color.clone(),
            })
            .collect()
    }

    /// Add a connection to the roster and broadcast the change
    pub fn register_player(&self, name: Option<String>, color: Option<String>) -> LobbyPlayer {
        let player = {
            let mut roster = self.roster.write();
            let name = name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Player {}", roster.len() + 1));
            let color = color.unwrap_or_else(|| {
                PALETTE
                    .iter()
                    .find(|c| !roster.iter().any(|p| p.color == **c))
                    .copied()
                    .unwrap_or(FALLBACK_COLOR)
                    .to_string()
            });

            let player = LobbyPlayer {
                id: Uuid::new_v4(),
                name,
                color,
            };
            roster.push(player.clone());
            player
        };

        info!(player_id = %player.id, name = %player.name, "Player joined lobby");
        self.broadcast_roster();
        player
    }

    /// Update a player's name/color after the fact
    pub fn update_player(&self, id: Uuid, name: Option<String>, color: Option<String>) {
        {
            let mut roster = self.roster.write();
            let Some(player) = roster.iter_mut().find(|p| p.id == id) else {
                return;
            };
            if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
                player.name = name;
            }
            if let Some(color) = color {
                player.color = color;
            }
        }
        self.broadcast_roster();
    }

    /// Drop a connection from the roster. If the player was in the running
    /// match, the match's connected count goes down with them.
    pub fn unregister_player(&self, id: Uuid) {
        let removed = {
            let mut roster = self.roster.write();
            let before = roster.len();
            roster.retain(|p| p.id != id);
            roster.len() != before
        };
        if !removed {
            return;
        }

        if let Some(current) = self.current_match.read().as_ref() {
            if current.members.contains(&id) {
                current.handle.player_count.fetch_sub(1, Ordering::Relaxed);
            }
        }

        info!(player_id = %id, "Player left lobby");
        self.broadcast_roster();
    }

    /// Start a match with everyone currently in the roster
    pub fn start_match(
        &self,
        turn_duration_secs: Option<u32>,
        vs_bot: bool,
    ) -> Result<Uuid, StartMatchError> {
        let mut current = self.current_match.write();
        if current.is_some() {
            return Err(StartMatchError::MatchAlreadyRunning);
        }

        let mut players: Vec<Player> = self
            .roster
            .read()
            .iter()
            .take(self.config.max_players)
            .map(|p| Player::new(p.id, p.name.clone(), p.color.clone()))
            .collect();
        let members: Vec<Uuid> = players.iter().map(|p| p.id).collect();

        if vs_bot && players.len() < self.config.max_players {
            players.push(Player::bot(
                BOT_NAME.to_string(),
                FALLBACK_COLOR.to_string(),
            ));
        }
        if players.len() < 2 {
            return Err(StartMatchError::NotEnoughPlayers(players.len()));
        }

        let match_id = Uuid::new_v4();
        let seed = rand::thread_rng().gen::<u64>();
        let options = MatchOptions {
            turn_duration_secs: turn_duration_secs.unwrap_or(self.config.default_turn_secs),
            end_rules: self.config.end_rules,
            vs_bot,
        };

        let (quiz_match, handle) = QuizMatch::new(
            match_id,
            seed,
            players,
            self.bank.clone(),
            options,
            self.events_tx.clone(),
        );

        self.registry.insert(handle.clone());
        *current = Some(CurrentMatch { handle, members });
        drop(current);

        info!(match_id = %match_id, "Created new match");
        let _ = self.events_tx.send(ServerMsg::MatchStarted);

        // The match task cleans itself out of the registry and frees the room
        // for the next start when it finishes
        let registry = self.registry.clone();
        let current_match = self.current_match.clone();
        tokio::spawn(async move {
            quiz_match.run().await;

            registry.remove(&match_id);
            let mut current = current_match.write();
            if current
                .as_ref()
                .map(|c| c.handle.id == match_id)
                .unwrap_or(false)
            {
                *current = None;
            }
            info!(match_id = %match_id, "Match removed from registry");
        });

        Ok(match_id)
    }

    /// Process client messages for as long as the server runs
    pub async fn run(&self) {
        let Some(mut input_rx) = self.input_rx.lock().await.take() else {
            warn!("Lobby run() called twice, ignoring");
            return;
        };

        while let Some(input) = input_rx.recv().await {
            match input.msg {
                ClientMsg::Join { name, color } => {
                    self.update_player(input.player_id, name, color);
                }
                ClientMsg::StartMatch {
                    turn_duration_secs,
                    vs_bot,
                } => {
                    if let Err(e) = self.start_match(turn_duration_secs, vs_bot) {
                        warn!(player_id = %input.player_id, error = %e, "Match start refused");
                        let _ = self.events_tx.send(ServerMsg::Error {
                            code: "start_rejected".to_string(),
                            message: e.to_string(),
                        });
                    }
                }
                ClientMsg::Leave => {
                    self.unregister_player(input.player_id);
                }
                msg @ (ClientMsg::SubmitAnswer { .. }
                | ClientMsg::RestartMatch
                | ClientMsg::Ping { .. }) => {
                    let handle = self
                        .current_match
                        .read()
                        .as_ref()
                        .map(|c| c.handle.clone());

                    match (handle, msg) {
                        (Some(handle), msg) => {
                            let forwarded = PlayerInput {
                                player_id: input.player_id,
                                msg,
                                received_at: input.received_at,
                            };
                            if handle.input_tx.send(forwarded).await.is_err() {
                                debug!(match_id = %handle.id, "Match input channel closed");
                            }
                        }
                        (None, ClientMsg::Ping { t }) => {
                            let _ = self.events_tx.send(ServerMsg::Pong { t });
                        }
                        (None, msg) => {
                            debug!(player_id = %input.player_id, ?msg, "No match running, dropped");
                        }
                    }
                }
            }
        }
    }

    fn broadcast_roster(&self) {
        let _ = self.events_tx.send(ServerMsg::RosterChanged {
            players: self.roster_entries(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndRules;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            client_origin: "http://localhost:5173".to_string(),
            question_file: None,
            end_rules: EndRules::default(),
            max_players: 4,
            default_turn_secs: 45,
        })
    }

    fn lobby() -> LobbyService {
        LobbyService::new(
            test_config(),
            QuestionBank::default(),
            Arc::new(MatchRegistry::new()),
        )
    }

    #[test]
    fn register_assigns_palette_colors_in_order() {
        let lobby = lobby();
        let p1 = lobby.register_player(None, None);
        let p2 = lobby.register_player(Some("Rahul".to_string()), None);
        let p3 = lobby.register_player(None, Some("#123456".to_string()));

        assert_eq!(p1.name, "Player 1");
        assert_eq!(p1.color, "#FF6347");
        assert_eq!(p2.name, "Rahul");
        assert_eq!(p2.color, "#4169E1");
        assert_eq!(p3.color, "#123456");
        assert_eq!(lobby.roster_size(), 3);
    }

    #[test]
    fn roster_changes_are_broadcast() {
        let lobby = lobby();
        let mut rx = lobby.subscribe();

        let p1 = lobby.register_player(None, None);
        match rx.try_recv().unwrap() {
            ServerMsg::RosterChanged { players } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].player_id, p1.id);
            }
            other => panic!("expected roster change, got {other:?}"),
        }

        lobby.unregister_player(p1.id);
        match rx.try_recv().unwrap() {
            ServerMsg::RosterChanged { players } => assert!(players.is_empty()),
            other => panic!("expected roster change, got {other:?}"),
        }
    }

    #[test]
    fn unregister_unknown_player_is_a_noop() {
        let lobby = lobby();
        lobby.register_player(None, None);
        let mut rx = lobby.subscribe();

        lobby.unregister_player(Uuid::new_v4());
        assert!(rx.try_recv().is_err());
        assert_eq!(lobby.roster_size(), 1);
    }

    #[tokio::test]
    async fn start_requires_two_players_unless_vs_bot() {
        let lobby = lobby();
        lobby.register_player(None, None);

        assert!(matches!(
            lobby.start_match(None, false),
            Err(StartMatchError::NotEnoughPlayers(1))
        ));

        // Against the bot a single player is enough
        lobby.start_match(None, true).unwrap();
    }

    #[tokio::test]
    async fn second_start_is_refused_while_match_runs() {
        let registry = Arc::new(MatchRegistry::new());
        let lobby = LobbyService::new(test_config(), QuestionBank::default(), registry.clone());
        lobby.register_player(None, None);
        lobby.register_player(None, None);

        let mut rx = lobby.subscribe();
        let match_id = lobby.start_match(Some(30), false).unwrap();
        assert!(registry.get(&match_id).is_some());
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::MatchStarted)));

        assert!(matches!(
            lobby.start_match(Some(30), false),
            Err(StartMatchError::MatchAlreadyRunning)
        ));
    }
}
