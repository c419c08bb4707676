//! Room actor: an isolated Tokio task that owns one room's membership,
//! secrets, and game instance.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel — no shared mutable state, just message
//! passing. Whatever order commands arrive in on the channel is the
//! room's serialization order, so two racing moves can never both see
//! the same turn.

use std::sync::Arc;

use parlor_protocol::{
    GameOverReason, GameType, PlayerId, PlayerInfo, PublicState, RoomCode,
    ServerEvent,
};
use parlor_vault::{SealedSecret, SecretVault};
use tokio::sync::{mpsc, oneshot};

use crate::error::RoomError;
use crate::games::{DelegatedGame, Game, GridGame, RaceGame, RulesOracle, Terminal};

/// Command channel depth per room. Senders wait when it fills.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Channel sender for delivering server events to a player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerEvent>;

/// A snapshot of room metadata, shaped for `room_update`/`room_info`.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub players: Vec<PlayerInfo>,
    pub host: PlayerId,
    pub game: GameType,
}

/// What happened when a player left, as the registry needs to know it.
#[derive(Debug, Clone, Copy)]
pub struct LeaveOutcome {
    /// The room has no members left and its task has stopped.
    pub room_empty: bool,
}

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in each variant is the reply channel: the
/// caller sends a command and waits for the response on it.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<LeaveOutcome, RoomError>>,
    },
    SetGame {
        player_id: PlayerId,
        game: GameType,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    SubmitSecret {
        player_id: PlayerId,
        secret: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    GridMove {
        player_id: PlayerId,
        cell: usize,
        reply: oneshot::Sender<Result<PublicState, RoomError>>,
    },
    RaceRoll {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<u8, RoomError>>,
    },
    RaceMove {
        player_id: PlayerId,
        token: usize,
        reply: oneshot::Sender<Result<PublicState, RoomError>>,
    },
    RulesMove {
        player_id: PlayerId,
        from: String,
        to: String,
        reply: oneshot::Sender<Result<PublicState, RoomError>>,
    },
    /// Synthetic forfeit, for timer layers built on top of the room.
    /// Not reachable from any client action.
    Forfeit {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Handle to a running room actor. Cheap to clone — just an
/// `mpsc::Sender` wrapper. The registry holds one per room; callers
/// clone it out and drop the registry lock before awaiting anything.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join {
            player_id,
            name,
            sender,
            reply,
        })
        .await?
    }

    pub async fn leave(
        &self,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Leave { player_id, reply })
            .await?
    }

    pub async fn set_game(
        &self,
        player_id: PlayerId,
        game: GameType,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetGame {
            player_id,
            game,
            reply,
        })
        .await?
    }

    pub async fn submit_secret(
        &self,
        player_id: PlayerId,
        secret: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SubmitSecret {
            player_id,
            secret,
            reply,
        })
        .await?
    }

    pub async fn grid_move(
        &self,
        player_id: PlayerId,
        cell: usize,
    ) -> Result<PublicState, RoomError> {
        self.request(|reply| RoomCommand::GridMove {
            player_id,
            cell,
            reply,
        })
        .await?
    }

    pub async fn race_roll(
        &self,
        player_id: PlayerId,
    ) -> Result<u8, RoomError> {
        self.request(|reply| RoomCommand::RaceRoll { player_id, reply })
            .await?
    }

    pub async fn race_move(
        &self,
        player_id: PlayerId,
        token: usize,
    ) -> Result<PublicState, RoomError> {
        self.request(|reply| RoomCommand::RaceMove {
            player_id,
            token,
            reply,
        })
        .await?
    }

    pub async fn rules_move(
        &self,
        player_id: PlayerId,
        from: String,
        to: String,
    ) -> Result<PublicState, RoomError> {
        self.request(|reply| RoomCommand::RulesMove {
            player_id,
            from,
            to,
            reply,
        })
        .await?
    }

    /// Injects a forfeit into the room's serialized queue.
    ///
    /// This is the seam for per-turn timers: a timer task holds a clone
    /// of the handle and forfeits the player whose clock ran out. Going
    /// through the queue means a forfeit can never race a move the same
    /// player already submitted.
    pub async fn forfeit(
        &self,
        player_id: PlayerId,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Forfeit { player_id, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }
}

/// One room member. Join order is the index in the actor's `players`
/// vec; the host is always index 0.
struct PlayerSlot {
    id: PlayerId,
    name: String,
    sealed: Option<SealedSecret>,
    sender: PlayerSender,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    code: RoomCode,
    players: Vec<PlayerSlot>,
    game: Option<Game>,
    /// Set on any terminal transition, including forfeit-by-departure
    /// (which the machine itself never sees). Cleared by `set_game`.
    game_over: bool,
    vault: Arc<SecretVault>,
    oracle: Arc<dyn RulesOracle>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(code = %self.code, "room actor started");
        self.broadcast_room_update();

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    player_id,
                    name,
                    sender,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(
                        player_id, name, sender,
                    ));
                }
                RoomCommand::Leave { player_id, reply } => {
                    let outcome = self.handle_leave(player_id);
                    let stop = matches!(
                        outcome,
                        Ok(LeaveOutcome { room_empty: true })
                    );
                    let _ = reply.send(outcome);
                    if stop {
                        break;
                    }
                }
                RoomCommand::SetGame {
                    player_id,
                    game,
                    reply,
                } => {
                    let _ =
                        reply.send(self.handle_set_game(player_id, game));
                }
                RoomCommand::SubmitSecret {
                    player_id,
                    secret,
                    reply,
                } => {
                    let _ = reply
                        .send(self.handle_submit_secret(player_id, secret));
                }
                RoomCommand::GridMove {
                    player_id,
                    cell,
                    reply,
                } => {
                    let _ =
                        reply.send(self.handle_grid_move(player_id, cell));
                }
                RoomCommand::RaceRoll { player_id, reply } => {
                    let _ = reply.send(self.handle_race_roll(player_id));
                }
                RoomCommand::RaceMove {
                    player_id,
                    token,
                    reply,
                } => {
                    let _ =
                        reply.send(self.handle_race_move(player_id, token));
                }
                RoomCommand::RulesMove {
                    player_id,
                    from,
                    to,
                    reply,
                } => {
                    let _ = reply.send(
                        self.handle_rules_move(player_id, &from, &to),
                    );
                }
                RoomCommand::Forfeit { player_id, reply } => {
                    let _ = reply.send(self.handle_forfeit(player_id));
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        tracing::info!(code = %self.code, "room actor stopped");
    }

    fn game_type(&self) -> GameType {
        self.game
            .as_ref()
            .map(Game::game_type)
            .unwrap_or_default()
    }

    fn member_index(&self, player_id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player_id)
    }

    fn require_member(
        &self,
        player_id: PlayerId,
    ) -> Result<(), RoomError> {
        self.member_index(player_id)
            .map(|_| ())
            .ok_or(RoomError::NotInRoom(player_id))
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            players: self
                .players
                .iter()
                .map(|p| PlayerInfo {
                    id: p.id,
                    name: p.name.clone(),
                    has_secret: p.sealed.is_some(),
                })
                .collect(),
            host: self.players[0].id,
            game: self.game_type(),
        }
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        if self.member_index(player_id).is_some() {
            return Err(RoomError::AlreadyJoined(player_id));
        }
        if self.players.len() >= self.game_type().capacity() {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        self.players.push(PlayerSlot {
            id: player_id,
            name,
            sealed: None,
            sender,
        });
        tracing::info!(
            code = %self.code,
            %player_id,
            players = self.players.len(),
            "player joined"
        );
        self.broadcast_room_update();
        Ok(())
    }

    fn handle_leave(
        &mut self,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, RoomError> {
        let idx = self
            .member_index(player_id)
            .ok_or(RoomError::NotInRoom(player_id))?;
        let leaver = self.players.remove(idx);

        tracing::info!(
            code = %self.code,
            %player_id,
            players = self.players.len(),
            "player left"
        );

        if self.players.is_empty() {
            return Ok(LeaveOutcome { room_empty: true });
        }

        if !self.game_over {
            match &mut self.game {
                Some(Game::Grid(_)) | Some(Game::Rules(_)) => {
                    // Two-player games: the departure forfeits to the
                    // one player left at the table.
                    let winner = self.players[0].id;
                    self.finish(
                        Terminal::win(
                            GameOverReason::Forfeit,
                            winner,
                            vec![leaver.id],
                        ),
                        vec![(leaver.id, leaver.sealed)],
                    );
                }
                Some(Game::Race(race)) => {
                    race.remove_player(leaver.id);
                    if race.player_count() >= 2 {
                        let state = race.public_state();
                        self.broadcast(ServerEvent::StateUpdate {
                            code: self.code.clone(),
                            state,
                        });
                    } else {
                        // One racer is no race: back to the lobby.
                        self.game = None;
                    }
                }
                None => {}
            }
        }

        self.broadcast_room_update();
        Ok(LeaveOutcome { room_empty: false })
    }

    fn handle_set_game(
        &mut self,
        player_id: PlayerId,
        game: GameType,
    ) -> Result<(), RoomError> {
        self.require_member(player_id)?;

        let count = self.players.len();
        self.game = match game {
            GameType::None => None,
            GameType::Grid | GameType::DelegatedRules if count != 2 => {
                return Err(RoomError::InvalidForPlayerCount {
                    game,
                    players: count,
                });
            }
            GameType::Race if !(2..=4).contains(&count) => {
                return Err(RoomError::InvalidForPlayerCount {
                    game,
                    players: count,
                });
            }
            GameType::Grid => Some(Game::Grid(GridGame::new([
                self.players[0].id,
                self.players[1].id,
            ]))),
            GameType::Race => Some(Game::Race(RaceGame::new(
                self.players.iter().map(|p| p.id).collect(),
            ))),
            GameType::DelegatedRules => {
                Some(Game::Rules(DelegatedGame::new(
                    [self.players[0].id, self.players[1].id],
                    Arc::clone(&self.oracle),
                )))
            }
        };
        self.game_over = false;

        tracing::info!(code = %self.code, %game, "game selected");
        self.broadcast_room_update();
        if let Some(game) = &self.game {
            let state = game.public_state();
            self.broadcast(ServerEvent::StateUpdate {
                code: self.code.clone(),
                state,
            });
        }
        Ok(())
    }

    /// Forfeits the current game for `player_id`, who stays a member.
    ///
    /// Mirrors the departure policy: two-player games end in the
    /// opponent's favor (secret revealed); a race drops the lane and
    /// reverts to the lobby if fewer than two lanes remain.
    fn handle_forfeit(
        &mut self,
        player_id: PlayerId,
    ) -> Result<(), RoomError> {
        let idx = self
            .member_index(player_id)
            .ok_or(RoomError::NotInRoom(player_id))?;
        if self.game_over {
            return Err(RoomError::GameFinished);
        }
        match &mut self.game {
            Some(Game::Grid(_)) | Some(Game::Rules(_)) => {
                let winner = self
                    .players
                    .iter()
                    .map(|p| p.id)
                    .find(|&id| id != player_id)
                    .ok_or_else(|| {
                        RoomError::Internal("no opponent left".into())
                    })?;
                let sealed = self.players[idx].sealed.clone();
                self.finish(
                    Terminal::win(
                        GameOverReason::Forfeit,
                        winner,
                        vec![player_id],
                    ),
                    vec![(player_id, sealed)],
                );
                Ok(())
            }
            Some(Game::Race(race)) => {
                race.remove_player(player_id);
                if race.player_count() >= 2 {
                    let state = race.public_state();
                    self.broadcast(ServerEvent::StateUpdate {
                        code: self.code.clone(),
                        state,
                    });
                } else {
                    self.game = None;
                    self.broadcast_room_update();
                }
                Ok(())
            }
            None => Err(RoomError::NoActiveGame),
        }
    }

    fn handle_submit_secret(
        &mut self,
        player_id: PlayerId,
        secret: String,
    ) -> Result<(), RoomError> {
        let idx = self
            .member_index(player_id)
            .ok_or(RoomError::NotInRoom(player_id))?;
        let sealed = self
            .vault
            .seal(&secret)
            .map_err(|e| RoomError::Internal(e.to_string()))?;
        self.players[idx].sealed = Some(sealed);
        self.broadcast_room_update();
        Ok(())
    }

    fn handle_grid_move(
        &mut self,
        player_id: PlayerId,
        cell: usize,
    ) -> Result<PublicState, RoomError> {
        self.require_member(player_id)?;
        if self.game_over {
            return Err(RoomError::GameFinished);
        }
        let outcome = match &mut self.game {
            Some(Game::Grid(grid)) => grid.apply_move(player_id, cell)?,
            Some(other) => {
                return Err(RoomError::WrongGame(other.game_type()))
            }
            None => return Err(RoomError::NoActiveGame),
        };
        self.after_move(outcome)
    }

    fn handle_race_roll(
        &mut self,
        player_id: PlayerId,
    ) -> Result<u8, RoomError> {
        self.require_member(player_id)?;
        if self.game_over {
            return Err(RoomError::GameFinished);
        }
        let (value, state) = match &mut self.game {
            Some(Game::Race(race)) => {
                let value = race.roll(player_id)?;
                (value, race.public_state())
            }
            Some(other) => {
                return Err(RoomError::WrongGame(other.game_type()))
            }
            None => return Err(RoomError::NoActiveGame),
        };
        self.broadcast(ServerEvent::StateUpdate {
            code: self.code.clone(),
            state,
        });
        Ok(value)
    }

    fn handle_race_move(
        &mut self,
        player_id: PlayerId,
        token: usize,
    ) -> Result<PublicState, RoomError> {
        self.require_member(player_id)?;
        if self.game_over {
            return Err(RoomError::GameFinished);
        }
        let outcome = match &mut self.game {
            Some(Game::Race(race)) => race.apply_move(player_id, token)?,
            Some(other) => {
                return Err(RoomError::WrongGame(other.game_type()))
            }
            None => return Err(RoomError::NoActiveGame),
        };
        self.after_move(outcome)
    }

    fn handle_rules_move(
        &mut self,
        player_id: PlayerId,
        from: &str,
        to: &str,
    ) -> Result<PublicState, RoomError> {
        self.require_member(player_id)?;
        if self.game_over {
            return Err(RoomError::GameFinished);
        }
        let outcome = match &mut self.game {
            Some(Game::Rules(rules)) => {
                rules.apply_move(player_id, from, to)?
            }
            Some(other) => {
                return Err(RoomError::WrongGame(other.game_type()))
            }
            None => return Err(RoomError::NoActiveGame),
        };
        self.after_move(outcome)
    }

    /// Broadcasts the state after an accepted move and finishes the game
    /// if the move was terminal.
    fn after_move(
        &mut self,
        outcome: crate::games::MoveOutcome,
    ) -> Result<PublicState, RoomError> {
        self.broadcast(ServerEvent::StateUpdate {
            code: self.code.clone(),
            state: outcome.state.clone(),
        });
        if let Some(terminal) = outcome.terminal {
            let loser_secrets = terminal
                .losers
                .iter()
                .map(|&loser| {
                    let sealed = self
                        .member_index(loser)
                        .and_then(|i| self.players[i].sealed.clone());
                    (loser, sealed)
                })
                .collect();
            self.finish(terminal, loser_secrets);
        }
        Ok(outcome.state)
    }

    /// Broadcasts `game_over` and privately reveals each loser's secret
    /// to the winner. A vault failure degrades to no reveal; the game
    /// still ends.
    fn finish(
        &mut self,
        terminal: Terminal,
        loser_secrets: Vec<(PlayerId, Option<SealedSecret>)>,
    ) {
        self.game_over = true;
        tracing::info!(
            code = %self.code,
            reason = ?terminal.reason,
            winner = ?terminal.winner,
            "game over"
        );
        self.broadcast(ServerEvent::GameOver {
            code: self.code.clone(),
            reason: terminal.reason,
            winner: terminal.winner,
        });

        let Some(winner) = terminal.winner else {
            return;
        };
        let Some(winner_idx) = self.member_index(winner) else {
            return;
        };
        for (loser, sealed) in loser_secrets {
            let Some(sealed) = sealed else { continue };
            match self.vault.open(&sealed) {
                Ok(secret) => {
                    let _ = self.players[winner_idx].sender.send(
                        ServerEvent::SecretRevealed {
                            code: self.code.clone(),
                            secret,
                        },
                    );
                }
                Err(e) => {
                    tracing::error!(
                        code = %self.code,
                        %loser,
                        error = %e,
                        "failed to open loser's secret"
                    );
                }
            }
        }
    }

    fn broadcast_room_update(&self) {
        let snap = self.snapshot();
        self.broadcast(ServerEvent::RoomUpdate {
            code: snap.code,
            players: snap.players,
            host: snap.host,
            game: snap.game,
        });
    }

    /// Sends an event to every member. Silently drops members whose
    /// receiver is gone — their departure is handled by `Leave`.
    fn broadcast(&self, event: ServerEvent) {
        for player in &self.players {
            let _ = player.sender.send(event.clone());
        }
    }
}

/// Spawns a room actor task with the creator already seated at join
/// order 0, and returns a handle to it.
pub(crate) fn spawn_room(
    code: RoomCode,
    creator: PlayerId,
    creator_name: String,
    creator_sender: PlayerSender,
    vault: Arc<SecretVault>,
    oracle: Arc<dyn RulesOracle>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);

    let actor = RoomActor {
        code: code.clone(),
        players: vec![PlayerSlot {
            id: creator,
            name: creator_name,
            sealed: None,
            sender: creator_sender,
        }],
        game: None,
        game_over: false,
        vault,
        oracle,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
