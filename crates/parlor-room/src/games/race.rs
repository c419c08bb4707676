//! The token-race game: 2-4 players, four tokens each, a d6, first to
//! bring every token home wins.
//!
//! Tokens start off-board (`-1`) and need an exact 6 to enter at step 0.
//! Rolling a 6 also grants a bonus turn. The track is `RACE_GOAL` steps
//! long; moves past the end clamp to it. A turn is roll-then-move; if
//! the roll leaves no legal move the turn passes automatically.

use parlor_protocol::{GameOverReason, PlayerId, PublicState, RaceLane};
use rand::Rng;

use crate::error::RoomError;
use crate::games::{MoveOutcome, Terminal};

/// Track length; a token at this step is home.
pub const RACE_GOAL: i32 = 57;

const TOKENS_PER_PLAYER: usize = 4;
const OFF_BOARD: i32 = -1;

pub struct RaceGame {
    players: Vec<PlayerId>,
    tokens: Vec<[i32; 4]>,
    turn_index: usize,
    last_roll: Option<u8>,
    finished: bool,
}

impl RaceGame {
    /// Starts a race between the given players, in join order.
    pub fn new(players: Vec<PlayerId>) -> Self {
        let tokens = vec![[OFF_BOARD; 4]; players.len()];
        Self {
            players,
            tokens,
            turn_index: 0,
            last_roll: None,
            finished: false,
        }
    }

    pub fn public_state(&self) -> PublicState {
        PublicState::Race {
            lanes: self
                .players
                .iter()
                .zip(&self.tokens)
                .map(|(&player, &tokens)| RaceLane { player, tokens })
                .collect(),
            turn_index: self.turn_index,
            last_roll: self.last_roll,
        }
    }

    /// Rolls the die for `player`.
    ///
    /// If the roll leaves no legal move, the turn passes immediately and
    /// the caller still gets the rolled value to report.
    pub fn roll(&mut self, player: PlayerId) -> Result<u8, RoomError> {
        let value = rand::rng().random_range(1..=6);
        self.roll_with(player, value)?;
        Ok(value)
    }

    fn roll_with(
        &mut self,
        player: PlayerId,
        value: u8,
    ) -> Result<(), RoomError> {
        if self.finished {
            return Err(RoomError::GameFinished);
        }
        if self.players[self.turn_index] != player {
            return Err(RoomError::NotYourTurn);
        }
        if self.last_roll.is_some() {
            return Err(RoomError::IllegalMove(
                "already rolled; move a token".into(),
            ));
        }
        self.last_roll = Some(value);
        if !self.any_movable(self.turn_index, value) {
            self.last_roll = None;
            self.advance_turn();
        }
        Ok(())
    }

    /// Moves `player`'s `token` by the pending roll.
    pub fn apply_move(
        &mut self,
        player: PlayerId,
        token: usize,
    ) -> Result<MoveOutcome, RoomError> {
        if self.finished {
            return Err(RoomError::GameFinished);
        }
        if self.players[self.turn_index] != player {
            return Err(RoomError::NotYourTurn);
        }
        let roll = self.last_roll.ok_or(RoomError::NoPendingRoll)?;
        if token >= TOKENS_PER_PLAYER {
            return Err(RoomError::TokenOutOfRange(token));
        }

        let pos = self.tokens[self.turn_index][token];
        let next = if pos == OFF_BOARD {
            if roll != 6 {
                return Err(RoomError::EntryNeedsSix);
            }
            0
        } else if pos >= RACE_GOAL {
            return Err(RoomError::IllegalMove("token is already home".into()));
        } else {
            (pos + i32::from(roll)).min(RACE_GOAL)
        };
        self.tokens[self.turn_index][token] = next;
        self.last_roll = None;

        let terminal = if self.tokens[self.turn_index]
            .iter()
            .all(|&p| p >= RACE_GOAL)
        {
            self.finished = true;
            let losers = self
                .players
                .iter()
                .copied()
                .filter(|&p| p != player)
                .collect();
            Some(Terminal::win(GameOverReason::Win, player, losers))
        } else {
            if roll != 6 {
                self.advance_turn();
            }
            None
        };

        Ok(MoveOutcome {
            state: self.public_state(),
            terminal,
        })
    }

    /// Removes a departing player's lane mid-game.
    ///
    /// Departure policy (whether the race continues or the room reverts
    /// to the lobby) belongs to the room; this only drops the lane and
    /// repairs the turn pointer. If the leaver was on turn, the turn
    /// passes to the next remaining player and any pending roll is lost.
    pub fn remove_player(&mut self, player: PlayerId) {
        let Some(idx) = self.players.iter().position(|&p| p == player)
        else {
            return;
        };
        let was_on_turn = idx == self.turn_index;
        self.players.remove(idx);
        self.tokens.remove(idx);
        if idx < self.turn_index {
            self.turn_index -= 1;
        }
        if was_on_turn && !self.players.is_empty() {
            self.last_roll = None;
            self.turn_index %= self.players.len();
        }
    }

    /// How many lanes are still racing.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    fn any_movable(&self, lane: usize, roll: u8) -> bool {
        self.tokens[lane].iter().any(|&pos| {
            if pos == OFF_BOARD {
                roll == 6
            } else {
                pos < RACE_GOAL
            }
        })
    }

    fn advance_turn(&mut self) {
        self.turn_index = (self.turn_index + 1) % self.players.len();
    }
}
