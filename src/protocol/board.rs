//! Board state: piece positions plus turn and roll bookkeeping.
//!
//! Each side owns a fixed-length piece vector; pieces are never added or
//! removed, only repositioned. Only the turn engine mutates a board.

use serde::{Deserialize, Serialize};

use crate::protocol::rules::RuleSet;

/// Position of a piece still in the start pool.
pub const START: i8 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSide {
    Light,
    Dark,
}

impl PlayerSide {
    pub fn opponent(&self) -> PlayerSide {
        match self {
            PlayerSide::Light => PlayerSide::Dark,
            PlayerSide::Dark => PlayerSide::Light,
        }
    }
}

/// A single playing piece: stable identity plus current track position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: usize,
    pub position: i8,
}

/// Mutable per-game board state. Owned exclusively by one `TurnEngine`.
#[derive(Debug, Clone)]
pub struct BoardState {
    rules: RuleSet,
    light_pieces: Vec<Piece>,
    dark_pieces: Vec<Piece>,
    current_side: PlayerSide,
    winner: Option<PlayerSide>,
    last_roll: i8,
    effective_roll: i8,
}

impl BoardState {
    pub fn new(rules: RuleSet) -> Self {
        BoardStateBuilder::new(rules).build()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn pieces(&self, side: PlayerSide) -> &[Piece] {
        match side {
            PlayerSide::Light => &self.light_pieces,
            PlayerSide::Dark => &self.dark_pieces,
        }
    }

    pub(crate) fn pieces_mut(&mut self, side: PlayerSide) -> &mut [Piece] {
        match side {
            PlayerSide::Light => &mut self.light_pieces,
            PlayerSide::Dark => &mut self.dark_pieces,
        }
    }

    pub fn current_side(&self) -> PlayerSide {
        self.current_side
    }

    pub(crate) fn set_current_side(&mut self, side: PlayerSide) {
        self.current_side = side;
    }

    pub fn winner(&self) -> Option<PlayerSide> {
        self.winner
    }

    pub(crate) fn set_winner(&mut self, side: PlayerSide) {
        self.winner = Some(side);
    }

    pub fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }

    /// Raw roll of the current turn, or -1 before the first roll.
    pub fn last_roll(&self) -> i8 {
        self.last_roll
    }

    /// Effective roll after zero substitution, or -1 before the first roll.
    pub fn effective_roll(&self) -> i8 {
        self.effective_roll
    }

    pub(crate) fn set_rolls(&mut self, raw: i8, effective: i8) {
        self.last_roll = raw;
        self.effective_roll = effective;
    }

    pub fn pieces_at_start(&self, side: PlayerSide) -> usize {
        self.pieces(side)
            .iter()
            .filter(|p| p.position == START)
            .count()
    }

    pub fn pieces_borne_off(&self, side: PlayerSide) -> usize {
        self.pieces(side)
            .iter()
            .filter(|p| p.position == self.rules.path_length)
            .count()
    }

    pub fn pieces_on_track(&self, side: PlayerSide) -> usize {
        self.pieces(side)
            .iter()
            .filter(|p| p.position >= 0 && p.position < self.rules.path_length)
            .count()
    }

    pub fn is_occupied_by(&self, side: PlayerSide, position: i8) -> bool {
        self.pieces(side).iter().any(|p| p.position == position)
    }

    pub fn piece_count_at(&self, side: PlayerSide, position: i8) -> usize {
        self.pieces(side)
            .iter()
            .filter(|p| p.position == position)
            .count()
    }
}

/// Builder for scenario setup. Unplaced slots default to the start pool.
pub struct BoardStateBuilder {
    rules: RuleSet,
    light: Vec<(usize, i8)>,
    dark: Vec<(usize, i8)>,
    current_side: PlayerSide,
}

impl BoardStateBuilder {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            light: Vec::new(),
            dark: Vec::new(),
            current_side: PlayerSide::Light,
        }
    }

    /// Place the next unassigned piece of `side` at `position`.
    pub fn with_piece(mut self, side: PlayerSide, position: i8) -> Self {
        let list = match side {
            PlayerSide::Light => &mut self.light,
            PlayerSide::Dark => &mut self.dark,
        };
        let id = list.len();
        list.push((id, position));
        self
    }

    /// Place a piece with an explicit id, used by snapshot replay.
    pub fn with_piece_id(mut self, side: PlayerSide, id: usize, position: i8) -> Self {
        let list = match side {
            PlayerSide::Light => &mut self.light,
            PlayerSide::Dark => &mut self.dark,
        };
        list.push((id, position));
        self
    }

    pub fn with_current_side(mut self, side: PlayerSide) -> Self {
        self.current_side = side;
        self
    }

    pub fn build(self) -> BoardState {
        let n = self.rules.pieces_per_player;
        BoardState {
            light_pieces: Self::fill(&self.light, n),
            dark_pieces: Self::fill(&self.dark, n),
            current_side: self.current_side,
            winner: None,
            last_roll: -1,
            effective_roll: -1,
            rules: self.rules,
        }
    }

    fn fill(explicit: &[(usize, i8)], n: usize) -> Vec<Piece> {
        let mut pieces: Vec<Piece> = (0..n)
            .map(|id| Piece {
                id,
                position: START,
            })
            .collect();
        for (slot, &(id, position)) in explicit.iter().enumerate().take(n) {
            pieces[slot] = Piece { id, position };
        }
        pieces
    }
}
