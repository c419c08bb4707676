//! Room lifecycle, registry, and game state machines for Parlor.
//!
//! The model is actor-per-room: every room is an isolated Tokio task
//! owning its membership, sealed secrets, and the active game. The
//! [`RoomRegistry`] maps short shareable codes to room handles and is
//! the only place rooms are created or destroyed.
//!
//! # Architecture
//!
//! ```text
//! RoomRegistry ──codes──▶ RoomHandle ──mpsc──▶ RoomActor (task)
//!                                                  │
//!                                                  ├── Game (grid | race | rules)
//!                                                  └── sealed secrets (vault)
//! ```
//!
//! Callers never touch room state directly; they clone a handle out of
//! the registry and await a reply. The room's command channel is its
//! serialization point, so concurrent moves resolve in arrival order
//! with no locking.

pub mod error;
pub mod games;
pub mod registry;
pub mod room;

pub use error::RoomError;
pub use games::{
    DelegatedGame, Game, GridGame, MoveOutcome, MoveReport, OracleError,
    PositionToken, RaceGame, RulesOracle, Terminal, TerminalReport,
    RACE_GOAL,
};
pub use registry::RoomRegistry;
pub use room::{
    LeaveOutcome, PlayerSender, RoomHandle, RoomSnapshot,
    DEFAULT_CHANNEL_SIZE,
};
