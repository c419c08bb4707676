//! The delegated-rules game: a two-player board game whose legality and
//! termination rules live behind the [`RulesOracle`] trait.
//!
//! The room never interprets positions or moves. It tracks whose turn it
//! is, hands each attempted move to the oracle, and relays whatever
//! position the oracle hands back. Swapping the oracle swaps the game.

use std::fmt;
use std::sync::Arc;

use parlor_protocol::{Color, GameOverReason, PlayerId, PublicState};

use crate::error::RoomError;
use crate::games::{MoveOutcome, Terminal};

/// An opaque position encoding owned by the oracle.
///
/// The engine stores and forwards it verbatim; only the oracle (and the
/// clients speaking its dialect) can read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionToken(pub String);

impl PositionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a game ended, as judged by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReport {
    /// The mover delivered mate and wins.
    Checkmate,
    /// The opponent has no legal reply; nobody wins.
    Stalemate,
}

/// The oracle's verdict on an accepted move.
#[derive(Debug, Clone)]
pub struct MoveReport {
    /// The position after the move.
    pub position: PositionToken,
    /// A human-readable move descriptor (e.g. algebraic notation).
    pub descriptor: String,
    /// Present when the move ended the game.
    pub terminal: Option<TerminalReport>,
}

/// Why the oracle declined to produce a new position.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The move is illegal in the current position.
    #[error("{0}")]
    Rejected(String),

    /// The oracle itself failed (bad state, internal fault).
    #[error("{0}")]
    Failure(String),
}

/// The pluggable rules engine for the delegated-rules game.
pub trait RulesOracle: Send + Sync {
    /// The position a fresh game starts from.
    fn starting_position(&self) -> PositionToken;

    /// Applies `from`/`to` for the side `mover` to `position`.
    ///
    /// Must leave no side effects on rejection or failure: the engine
    /// keeps its current position whenever this returns `Err`.
    fn apply_move(
        &self,
        position: &PositionToken,
        mover: Color,
        from: &str,
        to: &str,
    ) -> Result<MoveReport, OracleError>;
}

pub struct DelegatedGame {
    players: [PlayerId; 2],
    oracle: Arc<dyn RulesOracle>,
    position: PositionToken,
    to_move: Color,
    finished: bool,
}

impl DelegatedGame {
    /// Starts a game; the first player (join order 0) plays `First`.
    pub fn new(players: [PlayerId; 2], oracle: Arc<dyn RulesOracle>) -> Self {
        let position = oracle.starting_position();
        Self {
            players,
            oracle,
            position,
            to_move: Color::First,
            finished: false,
        }
    }

    pub fn public_state(&self) -> PublicState {
        PublicState::DelegatedRules {
            position: self.position.0.clone(),
            to_move: self.to_move,
        }
    }

    fn color_of(&self, player: PlayerId) -> Option<Color> {
        if self.players[0] == player {
            Some(Color::First)
        } else if self.players[1] == player {
            Some(Color::Second)
        } else {
            None
        }
    }

    /// Forwards a move to the oracle and applies its verdict.
    pub fn apply_move(
        &mut self,
        player: PlayerId,
        from: &str,
        to: &str,
    ) -> Result<MoveOutcome, RoomError> {
        if self.finished {
            return Err(RoomError::GameFinished);
        }
        let color = self.color_of(player).ok_or(RoomError::NotYourTurn)?;
        if color != self.to_move {
            return Err(RoomError::NotYourTurn);
        }

        let report = self
            .oracle
            .apply_move(&self.position, color, from, to)
            .map_err(|e| match e {
                OracleError::Rejected(msg) => RoomError::IllegalMove(msg),
                OracleError::Failure(msg) => RoomError::Oracle(msg),
            })?;

        tracing::debug!(
            player = %player,
            descriptor = %report.descriptor,
            "oracle accepted move"
        );
        self.position = report.position;
        self.to_move = self.to_move.opponent();

        let terminal = report.terminal.map(|t| {
            self.finished = true;
            match t {
                TerminalReport::Checkmate => {
                    let loser = if self.players[0] == player {
                        self.players[1]
                    } else {
                        self.players[0]
                    };
                    Terminal::win(
                        GameOverReason::Checkmate,
                        player,
                        vec![loser],
                    )
                }
                TerminalReport::Stalemate => Terminal {
                    reason: GameOverReason::Stalemate,
                    winner: None,
                    losers: Vec::new(),
                },
            }
        });

        Ok(MoveOutcome {
            state: self.public_state(),
            terminal,
        })
    }
}
