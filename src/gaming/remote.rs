//! Network-backed participant.
//!
//! A `RemoteParticipant` bridges the game loop and a connection the room
//! owns. At most one request is outstanding at a time; the submission
//! side validates against the request's legal-move set, and only the
//! canonical pending move reaches the engine. A slow responder gets a
//! one-shot warning notice; the request itself is never force-resolved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::engine::Move;
use crate::protocol::snapshot::MoveRequest;

use super::participant::Participant;

/// What a remote connection is currently being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Move,
    Skip,
}

/// Out-of-band notices the room forwards to its broadcaster.
#[derive(Debug, Clone)]
pub enum RemoteNotice {
    MoveRequested { request: MoveRequest },
    SkipRequested { request: MoveRequest },
    ResponseSlow { waited: Duration },
}

enum Responder {
    Move(oneshot::Sender<Move>),
    Skip(oneshot::Sender<bool>),
}

struct Pending {
    responder: Responder,
    request: MoveRequest,
    generation: u64,
}

struct RemoteInner {
    pending: Mutex<Option<Pending>>,
    generation: AtomicU64,
    notices: mpsc::UnboundedSender<RemoteNotice>,
    warn_after: Duration,
}

impl RemoteInner {
    fn notify(&self, notice: RemoteNotice) {
        // The room may already be gone during teardown.
        let _ = self.notices.send(notice);
    }

    fn arm(&self, responder: Responder, request: MoveRequest) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.pending.lock() = Some(Pending {
            responder,
            request,
            generation,
        });
        generation
    }

    /// Warn once if the request armed at `generation` is still pending
    /// after the deadline. Never resolves or cancels it.
    fn spawn_slow_warning(self: &Arc<Self>, generation: u64) {
        let weak = Arc::downgrade(self);
        let warn_after = self.warn_after;
        tokio::spawn(async move {
            tokio::time::sleep(warn_after).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let still_waiting = inner
                .pending
                .lock()
                .as_ref()
                .is_some_and(|p| p.generation == generation);
            if still_waiting {
                debug!(?warn_after, "remote participant is slow to respond");
                inner.notify(RemoteNotice::ResponseSlow { waited: warn_after });
            }
        });
    }
}

#[derive(Clone)]
pub struct RemoteParticipant {
    inner: Arc<RemoteInner>,
}

impl RemoteParticipant {
    pub fn new(notices: mpsc::UnboundedSender<RemoteNotice>, warn_after: Duration) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
                notices,
                warn_after,
            }),
        }
    }

    /// Answer the outstanding move request. The candidate is matched on
    /// (side, from, to); on success the canonical pending move is
    /// delivered and returned.
    pub fn submit_move(&self, candidate: &Move) -> Result<Move> {
        let mut slot = self.inner.pending.lock();
        let pending = slot.take().ok_or(Error::NoPendingRequest)?;
        match pending.responder {
            Responder::Move(tx) => {
                let canonical = pending
                    .request
                    .legal_moves
                    .iter()
                    .find(|m| m.same_transition(candidate))
                    .copied();
                match canonical {
                    Some(mv) => {
                        tx.send(mv).map_err(|_| Error::Cancelled)?;
                        Ok(mv)
                    }
                    None => {
                        *slot = Some(Pending {
                            responder: Responder::Move(tx),
                            request: pending.request,
                            generation: pending.generation,
                        });
                        Err(Error::MoveRejected)
                    }
                }
            }
            responder @ Responder::Skip(_) => {
                *slot = Some(Pending {
                    responder,
                    request: pending.request,
                    generation: pending.generation,
                });
                Err(Error::NoPendingRequest)
            }
        }
    }

    /// Answer the outstanding skip consultation.
    pub fn submit_skip(&self, skip: bool) -> Result<()> {
        let mut slot = self.inner.pending.lock();
        let pending = slot.take().ok_or(Error::NoPendingRequest)?;
        match pending.responder {
            Responder::Skip(tx) => tx.send(skip).map_err(|_| Error::Cancelled),
            responder @ Responder::Move(_) => {
                *slot = Some(Pending {
                    responder,
                    request: pending.request,
                    generation: pending.generation,
                });
                Err(Error::NoPendingRequest)
            }
        }
    }

    /// The request a rejoining connection must be re-shown, if any.
    pub fn outstanding(&self) -> Option<(RequestKind, MoveRequest)> {
        self.inner.pending.lock().as_ref().map(|p| {
            let kind = match p.responder {
                Responder::Move(_) => RequestKind::Move,
                Responder::Skip(_) => RequestKind::Skip,
            };
            (kind, p.request.clone())
        })
    }

    /// Drop the outstanding request; the waiting game loop sees
    /// `Error::Cancelled`. Also retires the warning timer generation.
    pub fn cancel(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.pending.lock() = None;
    }
}

#[async_trait]
impl Participant for RemoteParticipant {
    async fn choose_move(&self, request: MoveRequest) -> Result<Move> {
        let (tx, rx) = oneshot::channel();
        let generation = self.inner.arm(Responder::Move(tx), request.clone());
        self.inner.notify(RemoteNotice::MoveRequested { request });
        self.inner.spawn_slow_warning(generation);
        rx.await.map_err(|_| Error::Cancelled)
    }

    async fn should_skip(&self, request: MoveRequest) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        let generation = self.inner.arm(Responder::Skip(tx), request.clone());
        self.inner.notify(RemoteNotice::SkipRequested { request });
        self.inner.spawn_slow_warning(generation);
        rx.await.map_err(|_| Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::board::{BoardState, PlayerSide, START};
    use crate::protocol::rules::RuleSet;
    use crate::protocol::snapshot::GameSnapshot;

    fn request_with(moves: Vec<Move>) -> MoveRequest {
        MoveRequest {
            snapshot: GameSnapshot::capture(&BoardState::new(RuleSet::finkel())),
            roll: 2,
            legal_moves: moves,
        }
    }

    fn enter_move() -> Move {
        Move {
            side: PlayerSide::Light,
            piece: 0,
            from: START,
            to: 1,
        }
    }

    fn remote(warn_after: Duration) -> (RemoteParticipant, mpsc::UnboundedReceiver<RemoteNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RemoteParticipant::new(tx, warn_after), rx)
    }

    #[tokio::test]
    async fn test_submit_resolves_choose_move_with_canonical() {
        let (remote, mut notices) = remote(Duration::from_secs(60));
        let legal = enter_move();
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![legal])).await })
        };
        tokio::task::yield_now().await;
        assert!(matches!(
            notices.try_recv(),
            Ok(RemoteNotice::MoveRequested { .. })
        ));

        // A differing piece index matches on (side, from, to).
        let candidate = Move { piece: 3, ..legal };
        let delivered = remote.submit_move(&candidate).unwrap();
        assert_eq!(delivered.piece, 0);
        assert_eq!(waiter.await.unwrap().unwrap(), legal);
    }

    #[tokio::test]
    async fn test_submit_without_request_fails() {
        let (remote, _notices) = remote(Duration::from_secs(60));
        assert!(matches!(
            remote.submit_move(&enter_move()),
            Err(Error::NoPendingRequest)
        ));
        assert!(matches!(
            remote.submit_skip(true),
            Err(Error::NoPendingRequest)
        ));
    }

    #[tokio::test]
    async fn test_illegal_submission_keeps_request_pending() {
        let (remote, _notices) = remote(Duration::from_secs(60));
        let legal = enter_move();
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![legal])).await })
        };
        tokio::task::yield_now().await;

        let bogus = Move {
            side: PlayerSide::Light,
            piece: 0,
            from: 5,
            to: 7,
        };
        assert!(matches!(remote.submit_move(&bogus), Err(Error::MoveRejected)));
        assert!(remote.outstanding().is_some());

        // A correct retry still lands.
        remote.submit_move(&legal).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), legal);
    }

    #[tokio::test]
    async fn test_skip_submission_against_move_request_rejected() {
        let (remote, _notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;

        assert!(matches!(
            remote.submit_skip(true),
            Err(Error::NoPendingRequest)
        ));
        assert!(remote.outstanding().is_some());
        remote.cancel();
        assert!(waiter.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_cancel_fails_waiter_with_cancelled() {
        let (remote, _notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;

        remote.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert!(remote.outstanding().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_warning_fires_once_and_leaves_request() {
        let (remote, mut notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;
        let _ = notices.recv().await; // the MoveRequested notice

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            notices.try_recv(),
            Ok(RemoteNotice::ResponseSlow { .. })
        ));
        // Still waiting: the warning never resolves the request.
        assert!(remote.outstanding().is_some());
        assert!(notices.try_recv().is_err());

        remote.submit_move(&enter_move()).unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_suppressed_after_timely_answer() {
        let (remote, mut notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;
        let _ = notices.recv().await;

        remote.submit_move(&enter_move()).unwrap();
        waiter.await.unwrap().unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_skip_round_trip() {
        let (remote, mut notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.should_skip(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;
        assert!(matches!(
            notices.try_recv(),
            Ok(RemoteNotice::SkipRequested { .. })
        ));

        remote.submit_skip(true).unwrap();
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_outstanding_reports_kind_and_request() {
        let (remote, _notices) = remote(Duration::from_secs(60));
        let waiter = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.choose_move(request_with(vec![enter_move()])).await })
        };
        tokio::task::yield_now().await;

        let (kind, request) = remote.outstanding().unwrap();
        assert_eq!(kind, RequestKind::Move);
        assert_eq!(request.legal_moves.len(), 1);

        remote.cancel();
        let _ = waiter.await;
    }
}
