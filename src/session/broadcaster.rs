//! The transport seam.
//!
//! Rooms never talk to a socket; they call this trait. Every method is
//! fire-and-forget from the room's perspective: a failed delivery is
//! logged by the caller and never aborts the game loop or a teardown.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::board::PlayerSide;
use crate::protocol::engine::{Move, MoveOutcome};
use crate::protocol::snapshot::GameSnapshot;

#[async_trait]
pub trait GameBroadcaster: Send + Sync {
    async fn game_starting(
        &self,
        room: &str,
        host_name: &str,
        guest_name: &str,
        rules_name: &str,
    ) -> Result<()>;

    async fn state_changed(&self, room: &str, snapshot: &GameSnapshot) -> Result<()>;

    async fn dice_rolled(&self, room: &str, side: PlayerSide, raw_roll: u8) -> Result<()>;

    async fn move_made(&self, room: &str, mv: &Move, outcome: &MoveOutcome) -> Result<()>;

    async fn turn_forfeited(&self, room: &str, side: PlayerSide) -> Result<()>;

    async fn game_over(&self, room: &str, winner: PlayerSide) -> Result<()>;

    async fn error(&self, room: &str, message: &str) -> Result<()>;

    /// Deliver a named event to a single connection.
    async fn send_to(&self, connection_id: &str, event: &str, payload: Value) -> Result<()>;
}
