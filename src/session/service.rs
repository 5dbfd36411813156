//! Service façade over the registry: everything a transport handler
//! needs, keyed by connection id or session token.
//!
//! The service keeps two indexes beside the registry: connection id ->
//! room code (for submissions and disconnects) and session token -> room
//! code (for rejoins). A background reaper removes all traces of a room
//! once it reports completion, whatever path ended it.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::{Error, Result};
use crate::protocol::engine::Move;
use crate::protocol::rules::RuleSet;

use super::broadcaster::GameBroadcaster;
use super::registry::RoomRegistry;
use super::room::{GameRoom, PlayerSlot};
use super::SessionConfig;

const MAX_NAME_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct RoomCreated {
    pub code: String,
    pub rules_name: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct RoomJoined {
    pub code: String,
    pub host_name: String,
    pub token: String,
}

struct ServiceInner {
    registry: RoomRegistry,
    connections: DashMap<String, String>,
    tokens: DashMap<String, String>,
    broadcaster: Arc<dyn GameBroadcaster>,
    config: SessionConfig,
    finished_tx: mpsc::UnboundedSender<String>,
}

pub struct RoomService {
    inner: Arc<ServiceInner>,
}

impl RoomService {
    pub fn new(broadcaster: Arc<dyn GameBroadcaster>, config: SessionConfig) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ServiceInner {
            registry: RoomRegistry::new(),
            connections: DashMap::new(),
            tokens: DashMap::new(),
            broadcaster,
            config,
            finished_tx,
        });
        Self::spawn_reaper(Arc::downgrade(&inner), finished_rx);
        Self { inner }
    }

    fn spawn_reaper(weak: Weak<ServiceInner>, mut finished: mpsc::UnboundedReceiver<String>) {
        tokio::spawn(async move {
            while let Some(code) = finished.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.registry.remove(&code);
                inner.connections.retain(|_, c| c != &code);
                inner.tokens.retain(|_, c| c != &code);
                info!(code = %code, "room deregistered");
            }
        });
    }

    fn validate_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidName("name must not be blank".into()));
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(Error::InvalidName(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Open a room under a fresh code with the caller as host.
    pub async fn create_room(
        &self,
        connection_id: &str,
        player_name: &str,
        rules_name: &str,
    ) -> Result<RoomCreated> {
        let name = Self::validate_name(player_name)?;
        let rules = RuleSet::by_name(rules_name);
        let inner = &self.inner;

        let room = inner.registry.insert_with(|code| {
            GameRoom::new(
                code,
                rules.clone(),
                name.clone(),
                connection_id.to_string(),
                Arc::clone(&inner.broadcaster),
                inner.config,
                inner.finished_tx.clone(),
            )
        });

        let host = room.host_slot();
        inner
            .connections
            .insert(connection_id.to_string(), room.code().to_string());
        inner
            .tokens
            .insert(host.token.clone(), room.code().to_string());

        info!(code = %room.code(), rules = %room.rules_name(), "room created");
        Ok(RoomCreated {
            code: room.code().to_string(),
            rules_name: room.rules_name().to_string(),
            token: host.token,
        })
    }

    /// Take the guest seat in an existing room and start the game.
    pub async fn join_room(
        &self,
        connection_id: &str,
        code: &str,
        player_name: &str,
    ) -> Result<RoomJoined> {
        let name = Self::validate_name(player_name)?;
        let room = self
            .inner
            .registry
            .get(code)
            .ok_or_else(|| Error::RoomNotFound(code.to_string()))?;

        let slot = room.join(name, connection_id.to_string()).await?;
        self.inner
            .connections
            .insert(connection_id.to_string(), room.code().to_string());
        self.inner
            .tokens
            .insert(slot.token.clone(), room.code().to_string());

        room.start().await?;
        Ok(RoomJoined {
            code: room.code().to_string(),
            host_name: room.host_slot().name,
            token: slot.token,
        })
    }

    /// Answer the move request outstanding for this connection.
    pub fn submit_move(&self, connection_id: &str, candidate: &Move) -> Result<Move> {
        self.room_for(connection_id)?.submit_move(connection_id, candidate)
    }

    /// Answer the skip consultation outstanding for this connection.
    pub fn submit_skip(&self, connection_id: &str, skip: bool) -> Result<()> {
        self.room_for(connection_id)?.submit_skip(connection_id, skip)
    }

    /// A connection dropped. Unknown connections are ignored; known ones
    /// trigger lobby teardown or a mid-game grace period.
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        let Some((_, code)) = self.inner.connections.remove(connection_id) else {
            return Ok(());
        };
        let Some(room) = self.inner.registry.get(&code) else {
            return Ok(());
        };
        room.handle_disconnect(connection_id).await
    }

    /// Authenticate a reconnection attempt with a session token and bind
    /// the slot to the new connection.
    pub async fn rejoin(&self, token: &str, connection_id: &str) -> Result<PlayerSlot> {
        let code = self
            .inner
            .tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(Error::InvalidToken)?;
        let room = self.inner.registry.get(&code).ok_or(Error::InvalidToken)?;

        let slot = room.rejoin(token, connection_id.to_string()).await?;
        self.inner
            .connections
            .insert(connection_id.to_string(), code);
        Ok(slot)
    }

    pub fn room_count(&self) -> usize {
        self.inner.registry.len()
    }

    fn room_for(&self, connection_id: &str) -> Result<Arc<GameRoom>> {
        let code = self
            .inner
            .connections
            .get(connection_id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownConnection)?;
        self.inner
            .registry
            .get(&code)
            .ok_or_else(|| Error::RoomNotFound(code))
    }
}
