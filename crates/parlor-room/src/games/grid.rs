//! Two-player 3x3 grid duel.
//!
//! Player 0 marks `A`, player 1 marks `B`. First to complete a row,
//! column, or diagonal wins; a full board with no line is a draw.

use parlor_protocol::{GameOverReason, Mark, PlayerId, PublicState};

use crate::error::RoomError;
use crate::games::{MoveOutcome, Terminal};

/// The eight winning lines on a 3x3 board.
const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

pub struct GridGame {
    players: [PlayerId; 2],
    cells: [Option<Mark>; 9],
    turn_index: usize,
    finished: bool,
}

impl GridGame {
    /// Starts a game between exactly two players; the first moves first.
    pub fn new(players: [PlayerId; 2]) -> Self {
        Self {
            players,
            cells: [None; 9],
            turn_index: 0,
            finished: false,
        }
    }

    pub fn public_state(&self) -> PublicState {
        PublicState::Grid {
            cells: self.cells,
            turn_index: self.turn_index,
        }
    }

    /// Marks `cell` for `player`, validating turn order and occupancy.
    pub fn apply_move(
        &mut self,
        player: PlayerId,
        cell: usize,
    ) -> Result<MoveOutcome, RoomError> {
        if self.finished {
            return Err(RoomError::GameFinished);
        }
        if self.players[self.turn_index] != player {
            return Err(RoomError::NotYourTurn);
        }
        if cell >= 9 {
            return Err(RoomError::CellOutOfRange(cell));
        }
        if self.cells[cell].is_some() {
            return Err(RoomError::CellOccupied(cell));
        }

        let mark = if self.turn_index == 0 { Mark::A } else { Mark::B };
        self.cells[cell] = Some(mark);

        let terminal = if self.has_line(mark) {
            self.finished = true;
            let loser = self.players[1 - self.turn_index];
            Some(Terminal::win(GameOverReason::Win, player, vec![loser]))
        } else if self.cells.iter().all(Option::is_some) {
            self.finished = true;
            Some(Terminal::draw())
        } else {
            self.turn_index = 1 - self.turn_index;
            None
        };

        Ok(MoveOutcome {
            state: self.public_state(),
            terminal,
        })
    }

    fn has_line(&self, mark: Mark) -> bool {
        WIN_LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.cells[i] == Some(mark)))
    }
}
