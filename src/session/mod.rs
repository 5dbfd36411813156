//! Session layer: rooms, the room registry, and the service façade.

pub mod broadcaster;
pub mod registry;
pub mod room;
pub mod service;

use std::time::Duration;

pub use broadcaster::GameBroadcaster;
pub use registry::RoomRegistry;
pub use room::{GameRoom, PlayerSlot, RoomPhase};
pub use service::{RoomCreated, RoomJoined, RoomService};

/// Session-layer timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How long a mid-game disconnect keeps the room alive.
    pub grace_period: Duration,
    /// How long before the opponent is told a participant is slow.
    pub move_warning: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            move_warning: Duration::from_secs(60),
        }
    }
}
