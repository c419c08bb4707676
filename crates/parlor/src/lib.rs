//! # Parlor
//!
//! A server-authoritative room and game session engine for small
//! real-time multiplayer games.
//!
//! Players connect over WebSocket, create or join rooms by short
//! shareable code, optionally lock in an encrypted secret, and play one
//! of three built-in games: a 3x3 grid duel, a 2-4 player token race,
//! or a chess-like game whose rules live behind a pluggable
//! [`RulesOracle`]. When a game ends, the loser's secret is decrypted
//! and delivered to the winner — and to no one else.
//!
//! All game state lives on the server; clients only ever see the public
//! snapshots the server broadcasts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//!
//! # async fn run(my_oracle: impl RulesOracle + 'static) -> Result<(), ParlorError> {
//! let server = ParlorServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(my_oracle)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod gateway;
mod server;

pub use error::ParlorError;
pub use server::{ParlorServer, ParlorServerBuilder};

/// Installs a `tracing` subscriber reading the `RUST_LOG` environment
/// variable. Call once at startup; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

pub use parlor_protocol::{
    ClientAction, ClientRequest, Color, GameOverReason, GameType, PlayerId,
    PlayerInfo, PublicState, RoomCode, ServerEvent, PROTOCOL_VERSION,
};
pub use parlor_room::{
    MoveReport, OracleError, PositionToken, RoomError, RulesOracle,
    TerminalReport,
};
pub use parlor_vault::SecretVault;

/// Commonly used items, for glob import.
pub mod prelude {
    pub use crate::{
        ClientAction, ClientRequest, Color, GameOverReason, GameType, MoveReport,
        OracleError, ParlorError, ParlorServer, PlayerId, PositionToken,
        PublicState, RoomCode, RulesOracle, SecretVault, ServerEvent,
        TerminalReport, PROTOCOL_VERSION,
    };
}
