//! Core protocol types for Parlor's wire format.
//!
//! Everything a client and the server exchange is defined here: identity
//! types, the inbound [`ClientRequest`] (an action plus an optional
//! correlation `seq`), and the outbound [`ServerEvent`] (correlated
//! replies, room-wide broadcasts, and the winner-only secret reveal).

use serde::{Deserialize, Serialize};

use std::fmt;

/// The protocol version clients must announce in their `hello`.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Player identity is connection-scoped: the transport assigns one id per
/// accepted connection, and a disconnect retires it for good. There is no
/// reconnect-and-resume; a returning client is a new player.
///
/// `#[serde(transparent)]` keeps the JSON shape a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A short, human-shareable room code (4-5 uppercase alphanumerics).
///
/// Codes are generated by the registry from an alphabet with the
/// easily-confused characters (0/O, 1/I) removed, so they survive being
/// read out loud. The code is the room's only address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Game selection
// ---------------------------------------------------------------------------

/// Which game a room is running (or `None` while still in the lobby).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum GameType {
    /// No game selected yet — the room is a lobby.
    #[default]
    None,
    /// The 3x3 grid-marking game.
    Grid,
    /// The token-race game.
    Race,
    /// The chess-like game whose rules live in an external oracle.
    DelegatedRules,
}

impl GameType {
    /// Maximum players a room may hold under this game type.
    ///
    /// A lobby defaults to the largest supported game (4) until a game
    /// is selected, at which point the tighter bound applies.
    pub fn capacity(&self) -> usize {
        match self {
            GameType::None | GameType::Race => 4,
            GameType::Grid | GameType::DelegatedRules => 2,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::None => write!(f, "none"),
            GameType::Grid => write!(f, "grid"),
            GameType::Race => write!(f, "race"),
            GameType::DelegatedRules => write!(f, "delegated-rules"),
        }
    }
}

/// A player's side in a two-player game, assigned from join order.
///
/// `First` is the creator's side (join order 0): mark A on the grid,
/// the first-moving color in the delegated-rules game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    First,
    Second,
}

impl Color {
    /// The other side.
    pub fn opponent(&self) -> Color {
        match self {
            Color::First => Color::Second,
            Color::Second => Color::First,
        }
    }
}

/// A mark on the grid board. `A` belongs to join order 0, `B` to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    A,
    B,
}

// ---------------------------------------------------------------------------
// Public game state
// ---------------------------------------------------------------------------

/// One player's four token positions in the race game.
///
/// `-1` means off-board; positions count steps along the shared track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceLane {
    pub player: PlayerId,
    pub tokens: [i32; 4],
}

/// A full, broadcast-safe snapshot of a room's game state.
///
/// This is what every member receives in a `state_update`. It never
/// contains secrets — those travel only through `secret_revealed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "kebab-case")]
pub enum PublicState {
    Grid {
        /// Nine cells, row-major. `None` is an empty cell.
        cells: [Option<Mark>; 9],
        turn_index: usize,
    },
    Race {
        /// Lanes in join order — index i is the player with join order i.
        lanes: Vec<RaceLane>,
        turn_index: usize,
        last_roll: Option<u8>,
    },
    DelegatedRules {
        /// The oracle's opaque position encoding. Forwarded verbatim.
        position: String,
        to_move: Color,
    },
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Win,
    Draw,
    Forfeit,
    Checkmate,
    Stalemate,
}

/// A room member as seen in `room_update` broadcasts.
///
/// `has_secret` tells the lobby who has locked in a secret without
/// disclosing anything about its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub has_secret: bool,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// An action a client asks the server to perform.
///
/// `#[serde(tag = "type")]` gives internally tagged JSON, e.g.
/// `{ "type": "grid_move", "code": "AB12", "cell": 4 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    /// First message on every connection. The server answers `welcome`
    /// (or `error` on a version mismatch) before anything else.
    Hello { version: u32 },

    /// Create a room; the sender becomes its first member and host.
    CreateRoom { display_name: String },

    /// Join an existing room by code.
    JoinRoom { code: RoomCode, display_name: String },

    /// Select (or re-select) the room's game. Lobby-only capacity rules
    /// apply: the current member count must fit the chosen game.
    SetGame { code: RoomCode, game: GameType },

    /// Submit the secret that will be revealed to whoever beats you.
    SubmitSecret { code: RoomCode, secret: String },

    /// Mark a cell in the grid game.
    GridMove { code: RoomCode, cell: usize },

    /// Roll the die in the race game.
    RaceRoll { code: RoomCode },

    /// Move a token by the pending roll in the race game.
    RaceMove { code: RoomCode, token: usize },

    /// Forward a move to the rules oracle in the delegated-rules game.
    RulesMove {
        code: RoomCode,
        from: String,
        to: String,
    },

    /// Request a one-off room snapshot (same shape as `room_update`).
    RoomInfo { code: RoomCode },

    /// Leave the room. Also issued implicitly on disconnect.
    LeaveRoom { code: RoomCode },
}

/// The top-level inbound message: an action plus an optional correlation
/// token. When `seq` is present, the direct reply echoes it back so the
/// client can pair requests with responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub action: ClientAction,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A message from the server.
///
/// Three delivery classes share this enum:
/// - correlated replies (`welcome`, `ack`, `room_created`, `roll_result`,
///   `accepted`, `room_info`, `error`) — sent only to the initiator;
/// - room broadcasts (`room_update`, `state_update`, `game_over`) — sent
///   to every current member;
/// - `secret_revealed` — sent to the winner's connection only, never
///   part of any broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `hello`: the connection's assigned player id.
    Welcome { player_id: PlayerId, protocol: u32 },

    /// Reply to `create_room`.
    RoomCreated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        code: RoomCode,
    },

    /// Generic success reply for actions with no payload.
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },

    /// Reply to `race_roll` with the die value.
    RollResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        value: u8,
    },

    /// Reply to an accepted move, carrying the resulting public state.
    Accepted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        state: PublicState,
    },

    /// Reply to `room_info`.
    RoomInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        code: RoomCode,
        players: Vec<PlayerInfo>,
        host: PlayerId,
        game: GameType,
    },

    /// A rejected action. `code` follows HTTP-ish conventions
    /// (400 validation, 404 not found, 409 capacity/conflict).
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        code: u16,
        message: String,
    },

    /// Broadcast: membership, host, or secret-submission changed.
    RoomUpdate {
        code: RoomCode,
        players: Vec<PlayerInfo>,
        host: PlayerId,
        game: GameType,
    },

    /// Broadcast: the game state after an accepted mutation.
    StateUpdate { code: RoomCode, state: PublicState },

    /// Broadcast: the game reached a terminal state.
    GameOver {
        code: RoomCode,
        reason: GameOverReason,
        winner: Option<PlayerId>,
    },

    /// Winner-only: a loser's decrypted secret.
    SecretRevealed { code: RoomCode, secret: String },
}

// =========================================================================
// Tests
// =========================================================================
