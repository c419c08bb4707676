//! Room registry: creates, looks up, and destroys rooms by code.
//!
//! The registry is the only place a room's lifetime is decided. It maps
//! codes to [`RoomHandle`]s; the rooms themselves run as independent
//! tasks. Lookups clone the handle out, so no registry lock is ever
//! held across a room operation.

use std::collections::HashMap;
use std::sync::Arc;

use parlor_protocol::{PlayerId, RoomCode};
use parlor_vault::SecretVault;
use rand::seq::IndexedRandom;

use crate::error::RoomError;
use crate::games::RulesOracle;
use crate::room::{spawn_room, LeaveOutcome, PlayerSender, RoomHandle};

/// Code alphabet with the easily-confused characters (0/O, 1/I) removed.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Starting code length; widened after too many collisions.
const CODE_LEN: usize = 4;

/// Collisions tolerated before widening the code by one character.
const CODE_WIDEN_AFTER: usize = 16;

/// Creates and owns all rooms.
///
/// Callers wrap this in a `Mutex`; every method here is synchronous or
/// resolves a handle before doing any waiting, so the lock is only ever
/// held for map operations.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,
    vault: Arc<SecretVault>,
    oracle: Arc<dyn RulesOracle>,
}

impl RoomRegistry {
    pub fn new(
        vault: Arc<SecretVault>,
        oracle: Arc<dyn RulesOracle>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            vault,
            oracle,
        }
    }

    /// Creates a room with `creator` seated as host and returns its code.
    ///
    /// Code generation is rejection sampling: draw, check the map, draw
    /// again. Never blocks — after [`CODE_WIDEN_AFTER`] collisions the
    /// code widens by one character, which multiplies the space by 32.
    pub fn create_room(
        &mut self,
        creator: PlayerId,
        creator_name: String,
        sender: PlayerSender,
    ) -> RoomCode {
        let code = self.generate_code();
        let handle = spawn_room(
            code.clone(),
            creator,
            creator_name,
            sender,
            Arc::clone(&self.vault),
            Arc::clone(&self.oracle),
        );
        tracing::info!(%code, %creator, rooms = self.rooms.len() + 1, "room created");
        self.rooms.insert(code.clone(), handle);
        code
    }

    fn generate_code(&self) -> RoomCode {
        let mut rng = rand::rng();
        let mut len = CODE_LEN;
        let mut collisions = 0;
        loop {
            let code: String = (0..len)
                .map(|_| {
                    *CODE_ALPHABET.choose(&mut rng).unwrap_or(&b'A') as char
                })
                .collect();
            let code = RoomCode(code);
            if !self.rooms.contains_key(&code) {
                return code;
            }
            collisions += 1;
            if collisions >= CODE_WIDEN_AFTER {
                len += 1;
                collisions = 0;
            }
        }
    }

    /// Looks up a room's handle by code.
    pub fn handle(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Drops a room whose last member has left. Called with the
    /// [`LeaveOutcome`] from the room's own `leave` reply.
    pub fn reap(&mut self, code: &RoomCode, outcome: LeaveOutcome) {
        if outcome.room_empty && self.rooms.remove(code).is_some() {
            tracing::info!(%code, rooms = self.rooms.len(), "room destroyed");
        }
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
