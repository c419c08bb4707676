//! Error types for the room layer.
//!
//! Every error here is local to the action that triggered it: it is
//! returned to the initiator and never terminates the owning room task,
//! mutates state, or reaches other players.

use parlor_protocol::{GameType, PlayerId, RoomCode};

/// Errors that can occur during room and game operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room exists under this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room has no free player slot for its current game type.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The player is already a member of this room.
    #[error("player {0} already joined")]
    AlreadyJoined(PlayerId),

    /// The acting player is not (or no longer) a member of the room.
    #[error("player {0} is not in the room")]
    NotInRoom(PlayerId),

    /// The room's member count doesn't fit the requested game.
    #[error("{players} players cannot play {game}")]
    InvalidForPlayerCount { game: GameType, players: usize },

    /// A game action arrived while no game is selected.
    #[error("no game in progress")]
    NoActiveGame,

    /// A game action targeted a different game than the one in progress.
    #[error("room is playing {0}, not the requested game")]
    WrongGame(GameType),

    /// It is not the acting player's turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The targeted grid cell is already marked.
    #[error("cell {0} is occupied")]
    CellOccupied(usize),

    /// The grid cell index is outside the board.
    #[error("cell {0} is out of range")]
    CellOutOfRange(usize),

    /// The game already reached a terminal state.
    #[error("game is finished")]
    GameFinished,

    /// A race move arrived without a preceding roll.
    #[error("roll the die first")]
    NoPendingRoll,

    /// The race token index is outside 0..4.
    #[error("token {0} is out of range")]
    TokenOutOfRange(usize),

    /// An off-board race token needs a roll of exactly 6 to enter.
    #[error("need a 6 to enter the board")]
    EntryNeedsSix,

    /// The rules oracle rejected the move.
    #[error("illegal move: {0}")]
    IllegalMove(String),

    /// The rules oracle failed outright. Still local to the action —
    /// the room task carries on.
    #[error("rules oracle error: {0}")]
    Oracle(String),

    /// Something on the server side went wrong (e.g. sealing a secret).
    #[error("internal error: {0}")]
    Internal(String),

    /// The room's command channel is closed — the actor is gone.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}
