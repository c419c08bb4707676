//! Wire protocol for Parlor.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Types** ([`ClientRequest`], [`ServerEvent`], [`PublicState`],
//!   identity newtypes) — the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   become bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong along the way.
//!
//! The protocol layer knows nothing about connections or rooms; it only
//! describes messages.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientAction, ClientRequest, Color, GameOverReason, GameType, Mark,
    PlayerId, PlayerInfo, PublicState, RaceLane, RoomCode, ServerEvent,
    PROTOCOL_VERSION,
};
