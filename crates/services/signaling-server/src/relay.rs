//! Signaling relay: room admission and payload forwarding between occupants
//!
//! Each connection registers an outbound queue under its [`PeerId`]. The relay
//! resolves recipients through the [`RoomRegistry`] and pushes serialized
//! envelopes onto their queues; a connection's writer task drains its queue in
//! order, so payloads from one sender reach the partner in send order.
//!
//! Every room operation holds that room's lock from the registry update until
//! its notifications are queued. Two peers racing into an empty room therefore
//! see `created` before `join` on one side and `joined` on the other.

use crate::rooms::{Admission, Departure, PeerId, RelayTarget, RoomRegistry};
use crate::Result;
use duet_core::protocol::ServerMessage;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

/// Outbound queue of one connection
pub type PeerSender = mpsc::Sender<String>;

type RoomLock = Arc<AsyncMutex<()>>;

/// Room registry plus the outbound queues of all connected peers
#[derive(Debug, Default)]
pub struct Relay {
    rooms: RoomRegistry,
    peers: RwLock<HashMap<PeerId, PeerSender>>,
    room_locks: Mutex<HashMap<String, RoomLock>>,
}

impl Relay {
    /// Create an empty relay
    pub fn new() -> Self {
        Self::default()
    }

    /// Room registry
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Register a connection's outbound queue
    pub fn register(&self, peer: PeerId, tx: PeerSender) {
        self.peers.write().insert(peer, tx);
    }

    /// Forget a connection's outbound queue
    pub fn unregister(&self, peer: PeerId) {
        self.peers.write().remove(&peer);
    }

    /// Number of registered connections
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Admit `peer` to `room_id`, notifying both sides
    ///
    /// The requester receives `created`, `joined` or `full`. On `joined` the
    /// requester's `joined` is queued before the existing occupant's `join`.
    pub async fn join(&self, room_id: &str, peer: PeerId) -> Result<Admission> {
        let lock = self.room_lock(room_id);
        let guard = lock.lock().await;
        let result = self.join_locked(room_id, peer).await;
        drop(guard);
        self.release_room_lock(room_id, lock);
        result
    }

    async fn join_locked(&self, room_id: &str, peer: PeerId) -> Result<Admission> {
        let admission = self.rooms.join(room_id, peer);
        let room = room_id.to_string();

        match admission {
            Admission::Created => {
                info!(room_id, %peer, "Peer created room");
                self.deliver(peer, &ServerMessage::Created { room_id: room })
                    .await?;
            }
            Admission::Joined { partner } => {
                info!(room_id, %peer, %partner, "Peer joined room");
                self.deliver(
                    peer,
                    &ServerMessage::Joined {
                        room_id: room.clone(),
                    },
                )
                .await?;
                self.deliver(partner, &ServerMessage::Join { room_id: room })
                    .await?;
            }
            Admission::Full => {
                info!(room_id, %peer, "Room full, join rejected");
                self.deliver(peer, &ServerMessage::Full).await?;
            }
        }

        Ok(admission)
    }

    /// Forward `payload` unmodified to the other occupant of `room_id`
    ///
    /// A payload sent while alone is dropped, never queued for a later
    /// arrival. A payload from a non-occupant is dropped with a warning.
    pub async fn relay(&self, room_id: &str, from: PeerId, payload: Value) -> Result<RelayTarget> {
        let lock = self.room_lock(room_id);
        let guard = lock.lock().await;
        let result = self.relay_locked(room_id, from, payload).await;
        drop(guard);
        self.release_room_lock(room_id, lock);
        result
    }

    async fn relay_locked(
        &self,
        room_id: &str,
        from: PeerId,
        payload: Value,
    ) -> Result<RelayTarget> {
        let target = self.rooms.relay_target(room_id, from);

        match target {
            RelayTarget::Partner(partner) => {
                debug!(room_id, %from, %partner, "Relaying payload");
                self.deliver(partner, &ServerMessage::Message { payload })
                    .await?;
            }
            RelayTarget::Alone => {
                debug!(room_id, %from, "No partner present, dropping payload");
            }
            RelayTarget::NotOccupant => {
                warn!(room_id, %from, "Relay from non-occupant dropped");
            }
        }

        Ok(target)
    }

    /// Remove `peer` from `room_id`, telling the partner with `left`
    pub async fn leave(&self, room_id: &str, peer: PeerId) -> Result<Option<Departure>> {
        let lock = self.room_lock(room_id);
        let guard = lock.lock().await;
        let result = self.leave_locked(room_id, peer).await;
        drop(guard);
        self.release_room_lock(room_id, lock);
        result
    }

    async fn leave_locked(&self, room_id: &str, peer: PeerId) -> Result<Option<Departure>> {
        let departure = self.rooms.leave(room_id, peer);

        if let Some(Departure {
            partner: Some(partner),
        }) = departure
        {
            info!(room_id, %peer, %partner, "Peer left room");
            self.deliver(
                partner,
                &ServerMessage::Left {
                    room_id: room_id.to_string(),
                },
            )
            .await?;
        } else if departure.is_some() {
            info!(room_id, %peer, "Last peer left room");
        }

        Ok(departure)
    }

    /// Number of rooms with a live lock entry
    pub fn room_lock_count(&self) -> usize {
        self.room_locks.lock().len()
    }

    fn room_lock(&self, room_id: &str) -> RoomLock {
        self.room_locks
            .lock()
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry of an empty room nobody else is waiting on
    fn release_room_lock(&self, room_id: &str, lock: RoomLock) {
        let mut locks = self.room_locks.lock();
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 && self.rooms.occupants(room_id).is_empty() {
            locks.remove(room_id);
        }
    }

    /// Queue `message` for `peer`
    ///
    /// A peer that disconnected in the meantime is skipped silently.
    pub async fn deliver(&self, peer: PeerId, message: &ServerMessage) -> Result<()> {
        let json = message.to_json()?;
        let tx = self.peers.read().get(&peer).cloned();

        match tx {
            Some(tx) => {
                if tx.send(json).await.is_err() {
                    debug!(%peer, kind = message.name(), "Peer queue closed, message dropped");
                }
            }
            None => {
                debug!(%peer, kind = message.name(), "Peer not registered, message dropped");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_ok, assert_pending, assert_ready_ok};
    use uuid::Uuid;

    fn peer(relay: &Relay) -> (PeerId, mpsc::Receiver<String>) {
        peer_with_capacity(relay, 16)
    }

    fn peer_with_capacity(relay: &Relay, capacity: usize) -> (PeerId, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        relay.register(id, tx);
        (id, rx)
    }

    fn next(rx: &mut mpsc::Receiver<String>) -> ServerMessage {
        ServerMessage::from_json(&rx.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_join_notifies_both_sides() {
        let relay = Relay::new();
        let (a, mut a_rx) = peer(&relay);
        let (b, mut b_rx) = peer(&relay);

        relay.join("R1", a).await.unwrap();
        relay.join("R1", b).await.unwrap();

        assert_eq!(next(&mut a_rx), ServerMessage::Created { room_id: "R1".into() });
        assert_eq!(next(&mut a_rx), ServerMessage::Join { room_id: "R1".into() });
        assert_eq!(next(&mut b_rx), ServerMessage::Joined { room_id: "R1".into() });
    }

    #[tokio::test]
    async fn test_relay_preserves_payload_and_order() {
        let relay = Relay::new();
        let (a, _a_rx) = peer(&relay);
        let (b, mut b_rx) = peer(&relay);
        relay.join("R1", a).await.unwrap();
        relay.join("R1", b).await.unwrap();
        let _ = b_rx.try_recv();

        for i in 0..5 {
            relay
                .relay("R1", a, json!({"type": "candidate", "n": i, "nested": {"k": [1, 2]}}))
                .await
                .unwrap();
        }

        for i in 0..5 {
            assert_eq!(
                next(&mut b_rx),
                ServerMessage::Message {
                    payload: json!({"type": "candidate", "n": i, "nested": {"k": [1, 2]}})
                }
            );
        }
    }

    #[tokio::test]
    async fn test_relay_while_alone_is_not_queued() {
        let relay = Relay::new();
        let (a, _a_rx) = peer(&relay);
        let (b, mut b_rx) = peer(&relay);
        relay.join("R1", a).await.unwrap();

        let target = relay.relay("R1", a, json!({"type": "ready"})).await.unwrap();
        assert_eq!(target, RelayTarget::Alone);

        relay.join("R1", b).await.unwrap();
        assert!(matches!(next(&mut b_rx), ServerMessage::Joined { .. }));
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_notifies_partner() {
        let relay = Relay::new();
        let (a, mut a_rx) = peer(&relay);
        let (b, _b_rx) = peer(&relay);
        relay.join("R1", a).await.unwrap();
        relay.join("R1", b).await.unwrap();
        let _ = (a_rx.try_recv(), a_rx.try_recv());

        relay.leave("R1", b).await.unwrap();
        assert_eq!(next(&mut a_rx), ServerMessage::Left { room_id: "R1".into() });
    }


    #[tokio::test]
    async fn test_joined_is_queued_before_join() {
        let relay = Arc::new(Relay::new());
        // Room for `created` only, so `join` waits until the occupant drains
        let (a, mut a_rx) = peer_with_capacity(&relay, 1);
        let (b, mut b_rx) = peer(&relay);
        assert_ok!(relay.join("R1", a).await);

        let joining = tokio::spawn({
            let relay = relay.clone();
            async move { relay.join("R1", b).await }
        });

        let joined = tokio::time::timeout(Duration::from_secs(5), b_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            ServerMessage::from_json(&joined).unwrap(),
            ServerMessage::Joined { room_id: "R1".into() }
        );

        assert_eq!(next(&mut a_rx), ServerMessage::Created { room_id: "R1".into() });
        let admission = assert_ok!(joining.await.unwrap());
        assert_eq!(admission, Admission::Joined { partner: a });
        assert_eq!(next(&mut a_rx), ServerMessage::Join { room_id: "R1".into() });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_keep_admission_order() {
        let relay = Arc::new(Relay::new());

        for n in 0..500 {
            let room = format!("R{}", n);
            let (a, mut a_rx) = peer(&relay);
            let (b, mut b_rx) = peer(&relay);

            let spawn_join = |peer: PeerId| {
                let relay = relay.clone();
                let room = room.clone();
                tokio::spawn(async move { relay.join(&room, peer).await })
            };
            let (first, second) = (spawn_join(a), spawn_join(b));
            let first = assert_ok!(first.await.unwrap());
            assert_ok!(second.await.unwrap());

            let (creator, joiner) = if first == Admission::Created {
                (&mut a_rx, &mut b_rx)
            } else {
                (&mut b_rx, &mut a_rx)
            };
            assert_eq!(next(creator), ServerMessage::Created { room_id: room.clone() });
            assert_eq!(next(creator), ServerMessage::Join { room_id: room.clone() });
            assert_eq!(next(joiner), ServerMessage::Joined { room_id: room.clone() });
        }
    }

    #[tokio::test]
    async fn test_room_operation_waits_for_room_lock() {
        let relay = Relay::new();
        let (a, _a_rx) = peer(&relay);
        let lock = relay.room_lock("R1");
        let guard = lock.lock().await;

        let mut join = tokio_test::task::spawn(relay.join("R1", a));
        assert_pending!(join.poll());
        assert!(relay.rooms().occupants("R1").is_empty());

        drop(guard);
        drop(lock);
        assert!(join.is_woken());
        assert_ready_ok!(join.poll());
        assert_eq!(relay.rooms().occupants("R1"), vec![a]);
    }

    #[tokio::test]
    async fn test_lock_entries_dropped_with_room() {
        let relay = Relay::new();
        let (a, _a_rx) = peer(&relay);
        let (b, _b_rx) = peer(&relay);

        relay.join("R1", a).await.unwrap();
        relay.join("R1", b).await.unwrap();
        assert_eq!(relay.room_lock_count(), 1);

        relay.leave("R1", a).await.unwrap();
        assert_eq!(relay.room_lock_count(), 1);
        relay.leave("R1", b).await.unwrap();
        assert_eq!(relay.room_lock_count(), 0);

        relay.relay("R2", a, json!({"type": "ready"})).await.unwrap();
        assert_eq!(relay.room_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_deliver_to_unregistered_peer_is_noop() {
        let relay = Relay::new();
        relay
            .deliver(Uuid::new_v4(), &ServerMessage::Full)
            .await
            .unwrap();
        assert_eq!(relay.peer_count(), 0);
    }
}
