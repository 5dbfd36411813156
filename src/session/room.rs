//! One game room: two participant slots, a running game, and the
//! disconnect/reconnect machinery around it.
//!
//! Lifecycle is Lobby -> Active -> Finished. Active begins exactly once;
//! Finished is terminal and reached through `finish()`, which is
//! idempotent because an explicit stop can race the game loop's own
//! completion. Cleanup in `finish()` is unconditional: it never depends
//! on a broadcast succeeding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gaming::orchestrator::{GameEvent, GameRunner};
use crate::gaming::participant::Participant;
use crate::gaming::remote::{RemoteNotice, RemoteParticipant, RequestKind};
use crate::protocol::board::{BoardState, PlayerSide};
use crate::protocol::engine::{CoinDice, Move, TurnEngine};
use crate::protocol::rules::RuleSet;
use crate::protocol::snapshot::GameSnapshot;

use super::broadcaster::GameBroadcaster;
use super::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Lobby,
    Active,
    Finished,
}

/// One occupied seat: display name, live connection, reconnect token.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub side: PlayerSide,
    pub name: String,
    pub connection_id: String,
    pub token: String,
}

struct RoomState {
    phase: RoomPhase,
    host: PlayerSlot,
    guest: Option<PlayerSlot>,
    light: Option<RemoteParticipant>,
    dark: Option<RemoteParticipant>,
    stop: Option<watch::Sender<bool>>,
    last_snapshot: Option<GameSnapshot>,
    /// One pending grace timer per slot; both sides can be in their
    /// grace period at once.
    grace: [Option<JoinHandle<()>>; 2],
}

fn side_index(side: PlayerSide) -> usize {
    match side {
        PlayerSide::Light => 0,
        PlayerSide::Dark => 1,
    }
}

pub struct GameRoom {
    code: String,
    rules: RuleSet,
    config: SessionConfig,
    broadcaster: Arc<dyn GameBroadcaster>,
    finished_tx: mpsc::UnboundedSender<String>,
    finished: AtomicBool,
    state: Mutex<RoomState>,
}

impl GameRoom {
    pub fn new(
        code: &str,
        rules: RuleSet,
        host_name: String,
        host_connection: String,
        broadcaster: Arc<dyn GameBroadcaster>,
        config: SessionConfig,
        finished_tx: mpsc::UnboundedSender<String>,
    ) -> Arc<Self> {
        let host = PlayerSlot {
            side: PlayerSide::Light,
            name: host_name,
            connection_id: host_connection,
            token: Uuid::new_v4().to_string(),
        };
        Arc::new(Self {
            code: code.to_string(),
            rules,
            config,
            broadcaster,
            finished_tx,
            finished: AtomicBool::new(false),
            state: Mutex::new(RoomState {
                phase: RoomPhase::Lobby,
                host,
                guest: None,
                light: None,
                dark: None,
                stop: None,
                last_snapshot: None,
                grace: [None, None],
            }),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn rules_name(&self) -> &str {
        &self.rules.name
    }

    pub fn phase(&self) -> RoomPhase {
        self.state.lock().phase
    }

    pub fn host_slot(&self) -> PlayerSlot {
        self.state.lock().host.clone()
    }

    pub fn guest_slot(&self) -> Option<PlayerSlot> {
        self.state.lock().guest.clone()
    }

    /// Claim the guest seat. Race-safe: under concurrent joins exactly
    /// one caller gets the slot, the rest see a full room.
    pub async fn join(&self, guest_name: String, connection_id: String) -> Result<PlayerSlot> {
        let (slot, host_connection) = {
            let mut state = self.state.lock();
            if state.phase != RoomPhase::Lobby || state.guest.is_some() {
                return Err(Error::RoomFull);
            }
            let slot = PlayerSlot {
                side: PlayerSide::Dark,
                name: guest_name,
                connection_id,
                token: Uuid::new_v4().to_string(),
            };
            state.guest = Some(slot.clone());
            (slot, state.host.connection_id.clone())
        };

        self.send_best_effort(
            &host_connection,
            "PlayerJoined",
            json!({ "name": slot.name }),
        )
        .await;
        Ok(slot)
    }

    /// Begin the game. One-time transition; repeated calls are no-ops.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let (host_name, guest_name) = {
            let mut state = self.state.lock();
            match state.phase {
                RoomPhase::Active | RoomPhase::Finished => return Ok(()),
                RoomPhase::Lobby => {}
            }
            let Some(guest) = state.guest.clone() else {
                return Err(Error::NotReady);
            };

            let (light_tx, light_rx) = mpsc::unbounded_channel();
            let (dark_tx, dark_rx) = mpsc::unbounded_channel();
            let light = RemoteParticipant::new(light_tx, self.config.move_warning);
            let dark = RemoteParticipant::new(dark_tx, self.config.move_warning);

            let (stop_tx, stop_rx) = watch::channel(false);
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let engine = TurnEngine::new(
                BoardState::new(self.rules.clone()),
                Box::new(CoinDice::new(self.rules.dice_count)),
            );
            let runner = GameRunner::new(
                engine,
                Arc::new(light.clone()) as Arc<dyn Participant>,
                Arc::new(dark.clone()) as Arc<dyn Participant>,
                event_tx,
                stop_rx,
            );

            state.light = Some(light);
            state.dark = Some(dark);
            state.stop = Some(stop_tx);
            state.phase = RoomPhase::Active;

            self.spawn_event_forwarder(event_rx);
            self.spawn_notice_forwarder(PlayerSide::Light, light_rx);
            self.spawn_notice_forwarder(PlayerSide::Dark, dark_rx);
            self.spawn_runner(runner);

            (state.host.name.clone(), guest.name)
        };

        info!(code = %self.code, rules = %self.rules.name, "game starting");
        if let Err(e) = self
            .broadcaster
            .game_starting(&self.code, &host_name, &guest_name, &self.rules.name)
            .await
        {
            warn!(code = %self.code, error = %e, "game-starting broadcast failed");
        }
        Ok(())
    }

    /// Route a move submission from a connection to its participant.
    pub fn submit_move(&self, connection_id: &str, candidate: &Move) -> Result<Move> {
        self.participant_for(connection_id)?.submit_move(candidate)
    }

    /// Route a skip decision from a connection to its participant.
    pub fn submit_skip(&self, connection_id: &str, skip: bool) -> Result<()> {
        self.participant_for(connection_id)?.submit_skip(skip)
    }

    fn participant_for(&self, connection_id: &str) -> Result<RemoteParticipant> {
        let state = self.state.lock();
        if state.phase != RoomPhase::Active {
            return Err(Error::NotStarted);
        }
        let side = Self::side_of(&state, connection_id).ok_or(Error::UnknownConnection)?;
        let participant = match side {
            PlayerSide::Light => state.light.clone(),
            PlayerSide::Dark => state.dark.clone(),
        };
        participant.ok_or(Error::NotStarted)
    }

    fn side_of(state: &RoomState, connection_id: &str) -> Option<PlayerSide> {
        if state.host.connection_id == connection_id {
            return Some(PlayerSide::Light);
        }
        match &state.guest {
            Some(guest) if guest.connection_id == connection_id => Some(PlayerSide::Dark),
            _ => None,
        }
    }

    fn connection_of(state: &RoomState, side: PlayerSide) -> Option<String> {
        match side {
            PlayerSide::Light => Some(state.host.connection_id.clone()),
            PlayerSide::Dark => state.guest.as_ref().map(|g| g.connection_id.clone()),
        }
    }

    /// A participant's connection dropped. In the lobby the room closes
    /// immediately; mid-game it gets a grace period to come back.
    pub async fn handle_disconnect(self: &Arc<Self>, connection_id: &str) -> Result<()> {
        let notification = {
            let mut state = self.state.lock();
            let side = Self::side_of(&state, connection_id).ok_or(Error::UnknownConnection)?;
            match state.phase {
                RoomPhase::Finished => None,
                RoomPhase::Lobby => {
                    drop(state);
                    debug!(code = %self.code, "lobby disconnect, closing room");
                    self.finish();
                    None
                }
                RoomPhase::Active => {
                    let slot = &mut state.grace[side_index(side)];
                    if slot.is_some() {
                        None // this side's timer is already running
                    } else {
                        *slot = Some(self.spawn_grace_timer(side));
                        Self::connection_of(&state, side.opponent())
                    }
                }
            }
        };

        if let Some(opponent) = notification {
            info!(code = %self.code, "participant disconnected, grace period started");
            self.send_best_effort(
                &opponent,
                "OpponentDisconnected",
                json!({ "graceSecs": self.config.grace_period.as_secs() }),
            )
            .await;
        }
        Ok(())
    }

    /// Rebind a slot to a new connection using its session token, cancel
    /// any pending grace timer, and replay the latest state plus the
    /// outstanding request to the new connection.
    pub async fn rejoin(&self, token: &str, new_connection: String) -> Result<PlayerSlot> {
        let (slot, opponent, snapshot, outstanding) = {
            let mut state = self.state.lock();
            if state.phase == RoomPhase::Finished {
                return Err(Error::InvalidToken);
            }
            let side = if state.host.token == token {
                PlayerSide::Light
            } else if state.guest.as_ref().is_some_and(|g| g.token == token) {
                PlayerSide::Dark
            } else {
                return Err(Error::InvalidToken);
            };

            match side {
                PlayerSide::Light => state.host.connection_id = new_connection,
                PlayerSide::Dark => {
                    if let Some(guest) = state.guest.as_mut() {
                        guest.connection_id = new_connection;
                    }
                }
            }
            if let Some(handle) = state.grace[side_index(side)].take() {
                handle.abort();
            }

            let slot = match side {
                PlayerSide::Light => state.host.clone(),
                PlayerSide::Dark => state.guest.clone().ok_or(Error::InvalidToken)?,
            };
            let participant = match side {
                PlayerSide::Light => state.light.clone(),
                PlayerSide::Dark => state.dark.clone(),
            };
            (
                slot,
                Self::connection_of(&state, side.opponent()),
                state.last_snapshot.clone(),
                participant.and_then(|p| p.outstanding()),
            )
        };

        info!(code = %self.code, "participant reconnected");
        if let Some(opponent) = opponent {
            self.send_best_effort(&opponent, "OpponentReconnected", json!({})).await;
        }
        if let Some(snapshot) = snapshot {
            match serde_json::to_value(&snapshot) {
                Ok(payload) => {
                    self.send_best_effort(&slot.connection_id, "GameState", payload).await
                }
                Err(e) => warn!(code = %self.code, error = %e, "snapshot serialization failed"),
            }
        }
        if let Some((kind, request)) = outstanding {
            let event = match kind {
                RequestKind::Move => "MoveRequested",
                RequestKind::Skip => "SkipRequested",
            };
            match serde_json::to_value(&request) {
                Ok(payload) => self.send_best_effort(&slot.connection_id, event, payload).await,
                Err(e) => warn!(code = %self.code, error = %e, "request serialization failed"),
            }
        }
        Ok(slot)
    }

    /// Explicit stop; also the natural-completion path. Idempotent.
    pub fn stop(&self) {
        self.finish();
    }

    /// Terminal cleanup: cancel the loop, force-fail outstanding
    /// requests, dispose any grace timers, and tell the owner. Never
    /// touches the broadcaster, so it cannot fail.
    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let (stop, grace, light, dark) = {
            let mut state = self.state.lock();
            state.phase = RoomPhase::Finished;
            (
                state.stop.take(),
                [state.grace[0].take(), state.grace[1].take()],
                state.light.clone(),
                state.dark.clone(),
            )
        };
        if let Some(stop) = stop {
            let _ = stop.send(true);
        }
        for handle in grace.into_iter().flatten() {
            handle.abort();
        }
        if let Some(participant) = light {
            participant.cancel();
        }
        if let Some(participant) = dark {
            participant.cancel();
        }
        info!(code = %self.code, "room finished");
        let _ = self.finished_tx.send(self.code.clone());
    }

    fn spawn_grace_timer(self: &Arc<Self>, side: PlayerSide) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let grace_period = self.config.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            if let Some(room) = weak.upgrade() {
                room.grace_expired(side).await;
            }
        })
    }

    async fn grace_expired(self: &Arc<Self>, side: PlayerSide) {
        let opponent = {
            let mut state = self.state.lock();
            match state.grace[side_index(side)].take() {
                Some(_) => Self::connection_of(&state, side.opponent()),
                None => return, // cancelled by a rejoin in the meantime
            }
        };

        info!(code = %self.code, "grace period expired, tearing down");
        if let Some(opponent) = opponent {
            self.send_best_effort(&opponent, "OpponentLeft", json!({})).await;
        }
        self.finish();
    }

    fn spawn_runner(self: &Arc<Self>, runner: GameRunner) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = runner.run().await;
            let Some(room) = weak.upgrade() else { return };
            match result {
                Ok(winner) => {
                    info!(code = %room.code, ?winner, "game completed");
                    room.finish();
                }
                Err(e) if e.is_cancellation() => {}
                Err(e) => {
                    warn!(code = %room.code, error = %e, "game loop failed");
                    if let Err(be) = room.broadcaster.error(&room.code, &e.to_string()).await {
                        warn!(code = %room.code, error = %be, "error broadcast failed");
                    }
                    room.finish();
                }
            }
        });
    }

    fn spawn_event_forwarder(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<GameEvent>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(room) = weak.upgrade() else { break };
                room.forward_event(event).await;
            }
        });
    }

    async fn forward_event(&self, event: GameEvent) {
        let outcome = match event {
            GameEvent::StateChanged { snapshot } => {
                self.state.lock().last_snapshot = Some(snapshot.clone());
                self.broadcaster.state_changed(&self.code, &snapshot).await
            }
            GameEvent::RollMade { side, roll, .. } => {
                self.broadcaster.dice_rolled(&self.code, side, roll).await
            }
            GameEvent::MoveApplied {
                mv,
                outcome,
                snapshot,
            } => {
                self.state.lock().last_snapshot = Some(snapshot.clone());
                let made = self.broadcaster.move_made(&self.code, &mv, &outcome).await;
                let changed = self.broadcaster.state_changed(&self.code, &snapshot).await;
                made.and(changed)
            }
            GameEvent::TurnForfeited { side, snapshot, .. } => {
                self.state.lock().last_snapshot = Some(snapshot.clone());
                let forfeited = self.broadcaster.turn_forfeited(&self.code, side).await;
                let changed = self.broadcaster.state_changed(&self.code, &snapshot).await;
                forfeited.and(changed)
            }
            GameEvent::GameOver { winner, snapshot } => {
                self.state.lock().last_snapshot = Some(snapshot);
                self.broadcaster.game_over(&self.code, winner).await
            }
        };
        if let Err(e) = outcome {
            warn!(code = %self.code, error = %e, "event broadcast failed");
        }
    }

    fn spawn_notice_forwarder(
        self: &Arc<Self>,
        side: PlayerSide,
        mut notices: mpsc::UnboundedReceiver<RemoteNotice>,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(notice) = notices.recv().await {
                let Some(room) = weak.upgrade() else { break };
                room.forward_notice(side, notice).await;
            }
        });
    }

    async fn forward_notice(&self, side: PlayerSide, notice: RemoteNotice) {
        let (target_side, event, payload) = match notice {
            RemoteNotice::MoveRequested { request } => match serde_json::to_value(&request) {
                Ok(payload) => (side, "MoveRequested", payload),
                Err(e) => {
                    warn!(code = %self.code, error = %e, "request serialization failed");
                    return;
                }
            },
            RemoteNotice::SkipRequested { request } => match serde_json::to_value(&request) {
                Ok(payload) => (side, "SkipRequested", payload),
                Err(e) => {
                    warn!(code = %self.code, error = %e, "request serialization failed");
                    return;
                }
            },
            RemoteNotice::ResponseSlow { waited } => (
                side.opponent(),
                "OpponentSlow",
                json!({ "waitedSecs": waited.as_secs() }),
            ),
        };

        let target = {
            let state = self.state.lock();
            Self::connection_of(&state, target_side)
        };
        if let Some(target) = target {
            self.send_best_effort(&target, event, payload).await;
        }
    }

    async fn send_best_effort(&self, connection_id: &str, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.broadcaster.send_to(connection_id, event, payload).await {
            warn!(code = %self.code, event, error = %e, "direct send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::protocol::engine::MoveOutcome;

    struct NullBroadcaster;

    #[async_trait]
    impl GameBroadcaster for NullBroadcaster {
        async fn game_starting(&self, _: &str, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn state_changed(&self, _: &str, _: &GameSnapshot) -> Result<()> {
            Ok(())
        }
        async fn dice_rolled(&self, _: &str, _: PlayerSide, _: u8) -> Result<()> {
            Ok(())
        }
        async fn move_made(&self, _: &str, _: &Move, _: &MoveOutcome) -> Result<()> {
            Ok(())
        }
        async fn turn_forfeited(&self, _: &str, _: PlayerSide) -> Result<()> {
            Ok(())
        }
        async fn game_over(&self, _: &str, _: PlayerSide) -> Result<()> {
            Ok(())
        }
        async fn error(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        async fn send_to(&self, _: &str, _: &str, _: serde_json::Value) -> Result<()> {
            Ok(())
        }
    }

    fn lobby_room() -> (Arc<GameRoom>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = GameRoom::new(
            "AB2C",
            RuleSet::finkel(),
            "Hostess".into(),
            "conn-host".into(),
            Arc::new(NullBroadcaster),
            SessionConfig::default(),
            tx,
        );
        (room, rx)
    }

    #[tokio::test]
    async fn test_single_join_fills_guest_slot() {
        let (room, _rx) = lobby_room();
        let slot = room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        assert_eq!(slot.side, PlayerSide::Dark);
        assert!(!slot.token.is_empty());
        assert_eq!(room.phase(), RoomPhase::Lobby);
        assert!(matches!(
            room.join("Late".into(), "conn-late".into()).await,
            Err(Error::RoomFull)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_joins_one_winner() {
        let (room, _rx) = lobby_room();
        let mut joins = Vec::new();
        for i in 0..8 {
            let room = Arc::clone(&room);
            joins.push(tokio::spawn(async move {
                room.join(format!("Guest{i}"), format!("conn-{i}")).await
            }));
        }
        let mut successes = 0;
        for join in joins {
            if join.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_start_requires_guest_and_is_idempotent() {
        let (room, _rx) = lobby_room();
        assert!(matches!(room.start().await, Err(Error::NotReady)));

        room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        room.start().await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Active);
        // Second start is a no-op.
        room.start().await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Active);

        room.stop();
    }

    #[tokio::test]
    async fn test_lobby_disconnect_closes_room() {
        let (room, mut rx) = lobby_room();
        room.handle_disconnect("conn-host").await.unwrap();
        assert_eq!(room.phase(), RoomPhase::Finished);
        assert_eq!(rx.recv().await.unwrap(), "AB2C");
    }

    #[tokio::test]
    async fn test_submit_before_start_fails() {
        let (room, _rx) = lobby_room();
        let mv = Move {
            side: PlayerSide::Light,
            piece: 0,
            from: -1,
            to: 0,
        };
        assert!(matches!(
            room.submit_move("conn-host", &mv),
            Err(Error::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_unknown_connection_rejected() {
        let (room, _rx) = lobby_room();
        room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        room.start().await.unwrap();

        let mv = Move {
            side: PlayerSide::Light,
            piece: 0,
            from: -1,
            to: 0,
        };
        assert!(matches!(
            room.submit_move("conn-stranger", &mv),
            Err(Error::UnknownConnection)
        ));
        assert!(matches!(
            room.handle_disconnect("conn-stranger").await,
            Err(Error::UnknownConnection)
        ));
        room.stop();
    }

    #[tokio::test]
    async fn test_stop_races_natural_completion_once() {
        let (room, mut rx) = lobby_room();
        room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        room.start().await.unwrap();

        room.stop();
        room.stop();
        assert_eq!(room.phase(), RoomPhase::Finished);
        assert_eq!(rx.recv().await.unwrap(), "AB2C");
        // Exactly one completion notification.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejoin_with_bad_token_fails() {
        let (room, _rx) = lobby_room();
        room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        room.start().await.unwrap();

        assert!(matches!(
            room.rejoin("not-a-token", "conn-new".into()).await,
            Err(Error::InvalidToken)
        ));
        room.stop();
    }

    #[tokio::test]
    async fn test_rejoin_rebinds_connection() {
        let (room, _rx) = lobby_room();
        let guest = room.join("Guest".into(), "conn-guest".into()).await.unwrap();
        room.start().await.unwrap();

        let slot = room.rejoin(&guest.token, "conn-guest-2".into()).await.unwrap();
        assert_eq!(slot.connection_id, "conn-guest-2");
        assert_eq!(room.guest_slot().unwrap().connection_id, "conn-guest-2");
        room.stop();
    }
}
