//! Wire-friendly game snapshots.
//!
//! A snapshot is a complete, self-contained view of one game: the ruleset,
//! every piece position, whose turn it is and the pending roll. Sessions
//! send one after every state change so a rejoining client needs no
//! history to resume rendering.

use serde::{Deserialize, Serialize};

use crate::protocol::board::{BoardState, BoardStateBuilder, PlayerSide, Piece};
use crate::protocol::engine::Move;
use crate::protocol::rules::RuleSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub rules: RuleSet,
    pub light_pieces: Vec<Piece>,
    pub dark_pieces: Vec<Piece>,
    pub current_side: PlayerSide,
    pub winner: Option<PlayerSide>,
    /// Raw roll of the turn in progress, -1 when nothing is pending.
    pub last_roll: i8,
    /// Roll after zero substitution, -1 when nothing is pending.
    pub effective_roll: i8,
}

impl GameSnapshot {
    pub fn capture(board: &BoardState) -> Self {
        Self {
            rules: board.rules().clone(),
            light_pieces: board.pieces(PlayerSide::Light).to_vec(),
            dark_pieces: board.pieces(PlayerSide::Dark).to_vec(),
            current_side: board.current_side(),
            winner: board.winner(),
            last_roll: board.last_roll(),
            effective_roll: board.effective_roll(),
        }
    }

    /// Rebuild a board equivalent to the one this snapshot was taken from.
    pub fn restore(&self) -> BoardState {
        let mut builder = BoardStateBuilder::new(self.rules.clone())
            .with_current_side(self.current_side);
        for piece in &self.light_pieces {
            builder = builder.with_piece_id(PlayerSide::Light, piece.id, piece.position);
        }
        for piece in &self.dark_pieces {
            builder = builder.with_piece_id(PlayerSide::Dark, piece.id, piece.position);
        }
        let mut board = builder.build();
        board.set_rolls(self.last_roll, self.effective_roll);
        if let Some(side) = self.winner {
            board.set_winner(side);
        }
        board
    }
}

/// A move-selection request as presented to a participant: the position
/// it must be answered against and the full legal set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub snapshot: GameSnapshot,
    pub roll: u8,
    pub legal_moves: Vec<Move>,
}
