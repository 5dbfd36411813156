//! royalur: a networked Royal Game of Ur core.
//!
//! Two layers. The protocol layer (`protocol`) is pure logic: a
//! configurable ruleset family, board state, and a strict
//! roll/move/forfeit turn engine. The orchestration layers (`gaming`,
//! `session`) drive that engine for two asynchronous participants:
//! per-session game loops, network-backed move requests, room codes and
//! tokens, disconnect grace periods and reconnection.
//!
//! The transport itself is out of scope; plug one in by implementing
//! [`session::GameBroadcaster`] and feeding submissions through
//! [`session::RoomService`].

pub mod error;
pub mod gaming;
pub mod logging;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};
pub use protocol::{
    BoardState, BoardStateBuilder, GameSnapshot, Move, MoveOutcome, MoveResult, PlayerSide,
    RuleSet, TurnEngine,
};
pub use session::{RoomService, SessionConfig};
