//! The three game state machines a room can run.
//!
//! The game set is fixed and small, so the machines form a closed
//! [`Game`] enum switched explicitly, rather than an open trait object.
//! Each machine owns one room's in-progress state and its turn logic;
//! the room actor owns the machine and serializes all access to it.

mod delegated;
mod grid;
mod race;

pub use delegated::{
    DelegatedGame, MoveReport, OracleError, PositionToken, RulesOracle,
    TerminalReport,
};
pub use grid::GridGame;
pub use race::{RaceGame, RACE_GOAL};

use parlor_protocol::{GameOverReason, GameType, PlayerId, PublicState};

/// A terminal transition: why the game ended and who won/lost.
///
/// Losers are listed so the room can reveal each loser's secret to the
/// winner. A draw has no winner and no losers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub reason: GameOverReason,
    pub winner: Option<PlayerId>,
    pub losers: Vec<PlayerId>,
}

impl Terminal {
    /// A win by `winner` over `losers`.
    pub fn win(
        reason: GameOverReason,
        winner: PlayerId,
        losers: Vec<PlayerId>,
    ) -> Self {
        Self {
            reason,
            winner: Some(winner),
            losers,
        }
    }

    /// A draw: nobody wins, nothing is revealed.
    pub fn draw() -> Self {
        Self {
            reason: GameOverReason::Draw,
            winner: None,
            losers: Vec::new(),
        }
    }
}

/// The result of an accepted move: the new public state, plus the
/// terminal transition if this move ended the game.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub state: PublicState,
    pub terminal: Option<Terminal>,
}

/// A room's active game. At most one per room; `None` at the room level
/// means the room is still a lobby.
pub enum Game {
    Grid(GridGame),
    Race(RaceGame),
    Rules(DelegatedGame),
}

impl Game {
    /// The wire-level tag for this variant.
    pub fn game_type(&self) -> GameType {
        match self {
            Game::Grid(_) => GameType::Grid,
            Game::Race(_) => GameType::Race,
            Game::Rules(_) => GameType::DelegatedRules,
        }
    }

    /// A broadcast-safe snapshot of the current state.
    pub fn public_state(&self) -> PublicState {
        match self {
            Game::Grid(g) => g.public_state(),
            Game::Race(g) => g.public_state(),
            Game::Rules(g) => g.public_state(),
        }
    }
}
