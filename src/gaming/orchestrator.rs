//! Game runner: drives one game from first roll to win.
//!
//! The runner owns the engine and both participants and reports through
//! a channel; observers never touch game state directly. Cancellation is
//! a watch flag checked at every suspension point. A cancelled run
//! unwinds with `Error::Cancelled` and emits no game-over event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::board::PlayerSide;
use crate::protocol::engine::{Move, MoveOutcome, TurnEngine};
use crate::protocol::snapshot::{GameSnapshot, MoveRequest};

use super::participant::Participant;

/// Everything an observer learns about a running game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameEvent {
    StateChanged {
        snapshot: GameSnapshot,
    },
    RollMade {
        side: PlayerSide,
        roll: u8,
        effective: u8,
    },
    MoveApplied {
        mv: Move,
        outcome: MoveOutcome,
        snapshot: GameSnapshot,
    },
    TurnForfeited {
        side: PlayerSide,
        voluntary: bool,
        snapshot: GameSnapshot,
    },
    GameOver {
        winner: PlayerSide,
        snapshot: GameSnapshot,
    },
}

pub struct GameRunner {
    engine: TurnEngine,
    light: Arc<dyn Participant>,
    dark: Arc<dyn Participant>,
    events: mpsc::UnboundedSender<GameEvent>,
    cancel: watch::Receiver<bool>,
}

impl GameRunner {
    pub fn new(
        engine: TurnEngine,
        light: Arc<dyn Participant>,
        dark: Arc<dyn Participant>,
        events: mpsc::UnboundedSender<GameEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            light,
            dark,
            events,
            cancel,
        }
    }

    fn participant(&self, side: PlayerSide) -> Arc<dyn Participant> {
        match side {
            PlayerSide::Light => Arc::clone(&self.light),
            PlayerSide::Dark => Arc::clone(&self.dark),
        }
    }

    fn emit(&self, event: GameEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| Error::ChannelClosed("game events".into()))
    }

    /// Resolves when the stop flag is raised or its sender is gone.
    async fn stopped(cancel: &mut watch::Receiver<bool>) {
        let _ = cancel.wait_for(|stop| *stop).await;
    }

    /// Drive the game to completion. Returns the winning side.
    pub async fn run(mut self) -> Result<PlayerSide> {
        let rules_name = self.engine.board().rules().name.clone();
        info!(rules = %rules_name, "game starting");

        loop {
            if *self.cancel.borrow() {
                return Err(Error::Cancelled);
            }

            self.emit(GameEvent::StateChanged {
                snapshot: GameSnapshot::capture(self.engine.board()),
            })?;

            let side = self.engine.board().current_side();
            let roll = self.engine.roll()?;
            let effective = self.engine.board().effective_roll() as u8;
            debug!(?side, roll, effective, "rolled");
            self.emit(GameEvent::RollMade {
                side,
                roll,
                effective,
            })?;

            let legal_moves = self.engine.legal_moves()?;
            if legal_moves.is_empty() {
                self.engine.forfeit()?;
                self.emit(GameEvent::TurnForfeited {
                    side,
                    voluntary: false,
                    snapshot: GameSnapshot::capture(self.engine.board()),
                })?;
                continue;
            }

            let request = MoveRequest {
                snapshot: GameSnapshot::capture(self.engine.board()),
                roll: effective,
                legal_moves: legal_moves.clone(),
            };
            let participant = self.participant(side);

            let skippable = self.engine.board().rules().allow_voluntary_skip
                && legal_moves.iter().all(|m| m.is_backward());
            if skippable {
                let skip = tokio::select! {
                    _ = Self::stopped(&mut self.cancel) => return Err(Error::Cancelled),
                    skip = participant.should_skip(request.clone()) => skip?,
                };
                if skip {
                    self.engine.forfeit()?;
                    self.emit(GameEvent::TurnForfeited {
                        side,
                        voluntary: true,
                        snapshot: GameSnapshot::capture(self.engine.board()),
                    })?;
                    continue;
                }
            }

            let chosen = tokio::select! {
                _ = Self::stopped(&mut self.cancel) => return Err(Error::Cancelled),
                chosen = participant.choose_move(request) => chosen?,
            };

            let outcome = self.engine.execute(&chosen)?;
            let snapshot = GameSnapshot::capture(self.engine.board());
            debug!(?side, from = chosen.from, to = chosen.to, result = ?outcome.result, "move applied");
            self.emit(GameEvent::MoveApplied {
                mv: chosen,
                outcome,
                snapshot: snapshot.clone(),
            })?;

            if let Some(winner) = self.engine.board().winner() {
                info!(?winner, "game over");
                self.emit(GameEvent::GameOver { winner, snapshot })?;
                self.light.game_finished(winner).await;
                self.dark.game_finished(winner).await;
                return Ok(winner);
            }
        }
    }
}
