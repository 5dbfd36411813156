//! Game protocol: rulesets, board state, the turn engine and snapshots.

pub mod board;
pub mod engine;
pub mod rules;
pub mod snapshot;

pub use board::{BoardState, BoardStateBuilder, Piece, PlayerSide, START};
pub use engine::{CoinDice, DiceRoller, FixedDice, Move, MoveOutcome, MoveResult, TurnEngine};
pub use rules::RuleSet;
pub use snapshot::{GameSnapshot, MoveRequest};
