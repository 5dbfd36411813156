//! Participant seam: anything that can answer a move request.
//!
//! The orchestrator only ever talks to this trait; whether the answer
//! comes from a heuristic or a network connection is invisible to it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::board::PlayerSide;
use crate::protocol::engine::Move;
use crate::protocol::snapshot::MoveRequest;

/// An agent playing one side of a game.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Pick one of the request's legal moves. May suspend indefinitely
    /// (a remote player thinking); cancellation comes from outside.
    async fn choose_move(&self, request: MoveRequest) -> Result<Move>;

    /// Consulted only when the ruleset allows voluntary skips and every
    /// legal move is backward. Sources without an opinion skip: moving
    /// backward with no say in the matter is rarely what anyone wants.
    async fn should_skip(&self, _request: MoveRequest) -> Result<bool> {
        Ok(true)
    }

    /// Game-over notice; default ignores it.
    async fn game_finished(&self, _winner: PlayerSide) {}
}

/// Heuristic participant: scores every legal move and plays the best.
///
/// Scores, highest first: bearing off, landing on a rosette, capturing,
/// advancing (weighted by destination), entering from the start pool.
pub struct GreedyParticipant {
    thinking_delay: Duration,
}

impl GreedyParticipant {
    pub fn new() -> Self {
        Self {
            thinking_delay: Duration::from_millis(500),
        }
    }

    pub fn with_delay(thinking_delay: Duration) -> Self {
        Self { thinking_delay }
    }

    fn score(request: &MoveRequest, mv: &Move) -> i32 {
        let rules = &request.snapshot.rules;

        if mv.to == rules.path_length {
            return 1000;
        }
        if rules.is_rosette(mv.to) {
            return 800;
        }
        if Self::captures(request, mv) {
            return 600;
        }
        if mv.from >= 0 {
            return 200 + mv.to as i32;
        }
        100
    }

    fn captures(request: &MoveRequest, mv: &Move) -> bool {
        let rules = &request.snapshot.rules;
        if !rules.is_shared_lane(mv.to) {
            return false;
        }
        let target = rules.capture_target(mv.to);
        let opponents = match mv.side.opponent() {
            PlayerSide::Light => &request.snapshot.light_pieces,
            PlayerSide::Dark => &request.snapshot.dark_pieces,
        };
        opponents.iter().any(|p| p.position == target)
    }
}

impl Default for GreedyParticipant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Participant for GreedyParticipant {
    async fn choose_move(&self, request: MoveRequest) -> Result<Move> {
        if !self.thinking_delay.is_zero() {
            tokio::time::sleep(self.thinking_delay).await;
        }

        let best = request
            .legal_moves
            .iter()
            .max_by_key(|mv| Self::score(&request, mv))
            .copied()
            .ok_or(crate::error::Error::NoPendingRequest)?;
        Ok(best)
    }
}
