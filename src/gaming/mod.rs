//! Turn orchestration: participants, the driving loop, and the
//! network-backed participant bridge.

pub mod orchestrator;
pub mod participant;
pub mod remote;

pub use orchestrator::{GameEvent, GameRunner};
pub use participant::{GreedyParticipant, Participant};
pub use remote::{RemoteNotice, RemoteParticipant, RequestKind};
