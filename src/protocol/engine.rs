//! Turn engine: the roll → query-moves → execute-or-forfeit state machine.
//!
//! The engine owns its board exclusively. Protocol misuse (rolling twice,
//! querying moves before rolling, acting after game over) is a contract
//! violation and fails loudly; see `crate::error`.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::board::{BoardState, PlayerSide, START};

/// Source of raw rolls: the sum of `dice_count` independent binary draws.
pub trait DiceRoller: Send {
    fn roll(&mut self) -> u8;
}

/// Standard dice: each of `count` coins contributes 0 or 1.
pub struct CoinDice {
    rng: StdRng,
    count: u8,
}

impl CoinDice {
    pub fn new(count: u8) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            count,
        }
    }

    pub fn seeded(count: u8, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            count,
        }
    }
}

impl DiceRoller for CoinDice {
    fn roll(&mut self) -> u8 {
        (0..self.count).map(|_| self.rng.gen_range(0..=1u8)).sum()
    }
}

/// Deterministic roller fed a fixed sequence. Panics when exhausted,
/// which in a test means the script was wrong.
pub struct FixedDice {
    rolls: std::collections::VecDeque<u8>,
}

impl FixedDice {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl DiceRoller for FixedDice {
    fn roll(&mut self) -> u8 {
        self.rolls
            .pop_front()
            .expect("FixedDice ran out of predetermined rolls")
    }
}

/// A single piece relocation. Submissions are matched on (side, from, to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub side: PlayerSide,
    pub piece: usize,
    pub from: i8,
    pub to: i8,
}

impl Move {
    /// Equality used for move validation: the piece index is an engine
    /// detail, equivalent transitions are interchangeable.
    pub fn same_transition(&self, other: &Move) -> bool {
        self.side == other.side && self.from == other.from && self.to == other.to
    }

    pub fn is_backward(&self) -> bool {
        self.to < self.from
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveResult {
    Moved,
    ExtraTurn,
    Captured,
    CapturedExtraTurn,
    BorneOff,
    BorneOffExtraTurn,
    Win,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub result: MoveResult,
    /// Index of the first captured opposing piece, if any.
    pub captured_piece: Option<usize>,
}

impl MoveOutcome {
    fn of(result: MoveResult) -> Self {
        Self {
            result,
            captured_piece: None,
        }
    }
}

/// Enforces the turn protocol against one board and one ruleset.
pub struct TurnEngine {
    board: BoardState,
    dice: Box<dyn DiceRoller>,
    has_rolled: bool,
}

impl TurnEngine {
    pub fn new(board: BoardState, dice: Box<dyn DiceRoller>) -> Self {
        Self {
            board,
            dice,
            has_rolled: false,
        }
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn has_rolled(&self) -> bool {
        self.has_rolled
    }

    /// Roll the dice for the current turn. Returns the raw roll; the
    /// effective roll (after zero substitution) lands on the board.
    pub fn roll(&mut self) -> Result<u8> {
        if self.board.is_game_over() {
            return Err(Error::GameOver);
        }
        if self.has_rolled {
            return Err(Error::AlreadyRolled);
        }

        let raw = self.dice.roll();
        let effective = match (raw, self.board.rules().zero_roll_value) {
            (0, Some(substitute)) => substitute,
            _ => raw,
        };
        self.board.set_rolls(raw as i8, effective as i8);
        self.has_rolled = true;
        Ok(raw)
    }

    /// All legal moves for the pending roll, deduplicated by (from, to):
    /// when several pieces can make the same transition only one
    /// representative is surfaced.
    pub fn legal_moves(&self) -> Result<Vec<Move>> {
        if !self.has_rolled {
            return Err(Error::RollRequired);
        }

        let roll = self.board.effective_roll();
        if roll == 0 {
            return Ok(Vec::new());
        }

        let side = self.board.current_side();
        let rules = self.board.rules();
        let mut moves = Vec::new();
        let mut seen: HashSet<(i8, i8)> = HashSet::new();

        for (idx, piece) in self.board.pieces(side).iter().enumerate() {
            let from = piece.position;
            if from == rules.path_length {
                continue; // already borne off
            }

            let forward = from + roll;
            if forward <= rules.path_length
                && self.is_valid_destination(side, forward)
                && seen.insert((from, forward))
            {
                moves.push(Move {
                    side,
                    piece: idx,
                    from,
                    to: forward,
                });
            }

            if rules.allow_backward_moves && from > 0 {
                let backward = from - roll;
                if backward >= 0
                    && self.is_valid_destination(side, backward)
                    && seen.insert((from, backward))
                {
                    moves.push(Move {
                        side,
                        piece: idx,
                        from,
                        to: backward,
                    });
                }
            }
        }

        Ok(moves)
    }

    fn is_valid_destination(&self, side: PlayerSide, to: i8) -> bool {
        let rules = self.board.rules();
        if to == rules.path_length {
            return true; // bearing off is always valid
        }

        if self.board.is_occupied_by(side, to)
            && !(rules.allow_stacking && rules.is_rosette(to))
        {
            return false;
        }

        if rules.is_shared_lane(to) {
            let opponent_pos = rules.capture_target(to);
            if self.board.is_occupied_by(side.opponent(), opponent_pos)
                && rules.safe_rosettes
                && rules.is_rosette(to)
            {
                return false; // occupant is safe on the rosette
            }
        }

        true
    }

    /// Execute a move matching the legal set on (side, from, to).
    pub fn execute(&mut self, mv: &Move) -> Result<MoveOutcome> {
        if !self.has_rolled {
            return Err(Error::RollRequired);
        }
        if self.board.is_game_over() {
            return Err(Error::GameOver);
        }

        let legal = self.legal_moves()?;
        let Some(canonical) = legal.iter().find(|m| m.same_transition(mv)).copied() else {
            return Err(Error::InvalidMove(format!(
                "{:?} {} -> {} is not legal",
                mv.side, mv.from, mv.to
            )));
        };

        let side = canonical.side;
        let rules = self.board.rules().clone();
        let mut captured = false;
        let mut captured_piece = None;

        // Relocate: the whole stack when stacking is on, else one piece.
        if rules.allow_stacking {
            for piece in self.board.pieces_mut(side) {
                if piece.position == canonical.from {
                    piece.position = canonical.to;
                }
            }
        } else {
            self.board.pieces_mut(side)[canonical.piece].position = canonical.to;
        }

        // Capture through the map when landing in the shared lane.
        if canonical.to < rules.path_length && rules.is_shared_lane(canonical.to) {
            let target = rules.capture_target(canonical.to);
            for (idx, piece) in self.board.pieces_mut(side.opponent()).iter_mut().enumerate() {
                if piece.position == target {
                    if captured_piece.is_none() {
                        captured_piece = Some(idx);
                    }
                    piece.position = START;
                    captured = true;
                    if !rules.allow_stacking {
                        break;
                    }
                }
            }
        }

        let borne_off = canonical.to == rules.path_length;
        if borne_off && self.board.pieces_borne_off(side) == rules.pieces_per_player {
            self.board.set_winner(side);
            self.has_rolled = false;
            return Ok(MoveOutcome::of(MoveResult::Win));
        }

        let rosette_extra = canonical.to < rules.path_length
            && rules.is_rosette(canonical.to)
            && rules.rosette_extra_roll;
        let capture_extra = captured && rules.capture_extra_roll;
        let extra_turn = rosette_extra || capture_extra;

        if !extra_turn {
            self.board.set_current_side(side.opponent());
        }
        self.has_rolled = false;

        let result = match (captured, borne_off, extra_turn) {
            (true, false, true) => MoveResult::CapturedExtraTurn,
            (true, false, false) => MoveResult::Captured,
            (false, true, true) => MoveResult::BorneOffExtraTurn,
            (false, true, false) => MoveResult::BorneOff,
            (false, false, true) => MoveResult::ExtraTurn,
            _ => MoveResult::Moved,
        };

        Ok(MoveOutcome {
            result,
            captured_piece,
        })
    }

    /// Pass the turn. Legal only when no moves exist, or under voluntary
    /// skip when every legal move is backward.
    pub fn forfeit(&mut self) -> Result<()> {
        if !self.has_rolled {
            return Err(Error::RollRequired);
        }
        if self.board.is_game_over() {
            return Err(Error::GameOver);
        }

        let legal = self.legal_moves()?;
        if !legal.is_empty() {
            if !self.board.rules().allow_voluntary_skip {
                return Err(Error::ForfeitRefused("legal moves exist".into()));
            }
            if legal.iter().any(|m| !m.is_backward()) {
                return Err(Error::ForfeitRefused("forward moves exist".into()));
            }
        }

        let next = self.board.current_side().opponent();
        self.board.set_current_side(next);
        self.has_rolled = false;
        Ok(())
    }
}
