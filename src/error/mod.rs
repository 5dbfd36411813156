//! Error types for the royalur crate.
//!
//! Errors fall into two classes. Contract violations (rolling twice,
//! querying moves before rolling, executing after game over) mean the
//! caller broke the turn protocol; they are never retried. Everything
//! else is a recoverable rejection of user input or a lifecycle signal.

use thiserror::Error;

/// Result type alias for royalur operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // Turn-protocol contract violations. The caller is buggy, not the input.
    #[error("game is already over")]
    GameOver,

    #[error("already rolled this turn")]
    AlreadyRolled,

    #[error("must roll before this operation")]
    RollRequired,

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("cannot forfeit: {0}")]
    ForfeitRefused(String),

    // Recoverable, user-visible rejections.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("room is full or game already started")]
    RoomFull,

    #[error("room is not ready to start")]
    NotReady,

    #[error("connection is not part of this room")]
    UnknownConnection,

    #[error("invalid session token")]
    InvalidToken,

    #[error("invalid player name: {0}")]
    InvalidName(String),

    #[error("game has not started")]
    NotStarted,

    #[error("no request is awaiting a response")]
    NoPendingRequest,

    #[error("submission does not match any outstanding legal move")]
    MoveRejected,

    // Lifecycle signals.
    #[error("operation cancelled")]
    Cancelled,

    #[error("internal channel closed: {0}")]
    ChannelClosed(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

impl Error {
    /// True for turn-protocol misuse that indicates a caller bug rather
    /// than bad user input. These are never caught and retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::GameOver
                | Self::AlreadyRolled
                | Self::RollRequired
                | Self::InvalidMove(_)
                | Self::ForfeitRefused(_)
        )
    }

    /// True when the error should unwind the game loop silently rather
    /// than be broadcast as a session error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
