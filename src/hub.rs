use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Frames buffered per connection before backpressure drops kick in.
const OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, mpsc::Sender<String>>,
    rooms: HashMap<Uuid, HashMap<ConnectionId, mpsc::Sender<String>>>,
}

/// The room-to-subscriber mapping for live connections. Purely in-memory:
/// subscriptions vanish with the connection and carry no authorization
/// weight of their own.
#[derive(Clone, Default)]
pub struct RoomHub {
    inner: Arc<RwLock<HubInner>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection. The receiver feeds the connection's
    /// socket writer; the sender delivers frames to this connection alone
    /// (direct acks bypass room fan-out).
    pub async fn connect(&self) -> (ConnectionId, mpsc::Sender<String>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let id = ConnectionId::new();
        self.inner.write().await.connections.insert(id, tx.clone());
        debug!(connection = %id, "connection registered");
        (id, tx, rx)
    }

    /// Subscribe a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, conn: ConnectionId, room_id: Uuid) {
        let mut inner = self.inner.write().await;
        let Some(tx) = inner.connections.get(&conn).cloned() else {
            // the connection raced its own disconnect
            return;
        };
        inner.rooms.entry(room_id).or_default().insert(conn, tx);
        debug!(connection = %conn, room = %room_id, "subscribed");
    }

    /// Unsubscribe a connection from a room. No-op if it was not subscribed.
    pub async fn leave(&self, conn: ConnectionId, room_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(subs) = inner.rooms.get_mut(&room_id) {
            subs.remove(&conn);
            if subs.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    /// Deliver `payload` to every connection subscribed to the room at the
    /// time of the call. Delivery never blocks on a slow consumer: a full
    /// outbound buffer drops this frame for that connection only, a closed
    /// one unsubscribes it.
    pub async fn broadcast(&self, room_id: Uuid, payload: &str) {
        let mut inner = self.inner.write().await;
        let Some(subs) = inner.rooms.get_mut(&room_id) else {
            return;
        };
        subs.retain(|conn, tx| match tx.try_send(payload.to_owned()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %conn, room = %room_id, "subscriber lagging, frame dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %conn, room = %room_id, "pruning dead subscriber");
                false
            }
        });
        if subs.is_empty() {
            inner.rooms.remove(&room_id);
        }
    }

    /// Remove the connection from every room it subscribed to. Runs on
    /// every exit path of a connection task so abrupt termination cannot
    /// leak subscriptions.
    pub async fn disconnect(&self, conn: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.connections.remove(&conn);
        inner.rooms.retain(|_, subs| {
            subs.remove(&conn);
            !subs.is_empty()
        });
        debug!(connection = %conn, "connection dropped");
    }

    pub async fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(&room_id)
            .map_or(0, |subs| subs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn broadcast_reaches_only_subscribers() {
        let hub = RoomHub::new();
        let room = Uuid::now_v7();
        let other_room = Uuid::now_v7();

        let (a, _a_tx, mut a_rx) = hub.connect().await;
        let (b, _b_tx, mut b_rx) = hub.connect().await;
        let (_c, _c_tx, mut c_rx) = hub.connect().await;

        hub.join(a, room).await;
        hub.join(b, room).await;

        hub.broadcast(room, "hi").await;
        hub.broadcast(other_room, "elsewhere").await;

        assert_eq!(drain(&mut a_rx), ["hi"]);
        assert_eq!(drain(&mut b_rx), ["hi"]);
        assert!(drain(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let hub = RoomHub::new();
        let room = Uuid::now_v7();
        let (a, _a_tx, mut a_rx) = hub.connect().await;

        hub.join(a, room).await;
        hub.join(a, room).await;
        assert_eq!(hub.subscriber_count(room).await, 1);

        hub.broadcast(room, "once").await;
        assert_eq!(drain(&mut a_rx), ["once"]);
    }

    #[tokio::test]
    async fn leaving_stops_delivery_and_rejoin_skips_missed_frames() {
        let hub = RoomHub::new();
        let room = Uuid::now_v7();
        let (a, _a_tx, mut a_rx) = hub.connect().await;

        hub.join(a, room).await;
        hub.broadcast(room, "first").await;

        hub.leave(a, room).await;
        hub.broadcast(room, "missed").await;

        hub.join(a, room).await;
        hub.broadcast(room, "second").await;

        assert_eq!(drain(&mut a_rx), ["first", "second"]);
    }

    #[tokio::test]
    async fn leave_without_join_is_a_noop() {
        let hub = RoomHub::new();
        let room = Uuid::now_v7();
        let (a, _a_tx, _a_rx) = hub.connect().await;
        hub.leave(a, room).await;
        assert_eq!(hub.subscriber_count(room).await, 0);
    }

    #[tokio::test]
    async fn disconnect_clears_every_subscription() {
        let hub = RoomHub::new();
        let room_one = Uuid::now_v7();
        let room_two = Uuid::now_v7();

        let (a, _a_tx, mut a_rx) = hub.connect().await;
        let (b, _b_tx, mut b_rx) = hub.connect().await;
        hub.join(a, room_one).await;
        hub.join(a, room_two).await;
        hub.join(b, room_one).await;

        hub.disconnect(a).await;
        assert_eq!(hub.subscriber_count(room_one).await, 1);
        assert_eq!(hub.subscriber_count(room_two).await, 0);

        hub.broadcast(room_one, "still here").await;
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), ["still here"]);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_frames_without_stalling_the_room() {
        let hub = RoomHub::new();
        let room = Uuid::now_v7();

        let (slow, _slow_tx, mut slow_rx) = hub.connect().await;
        let (fast, _fast_tx, mut fast_rx) = hub.connect().await;
        hub.join(slow, room).await;
        hub.join(fast, room).await;

        let total = OUTBOUND_BUFFER + 10;
        for i in 0..total {
            hub.broadcast(room, &i.to_string()).await;
            // the fast consumer keeps draining, the slow one never does
            let _ = fast_rx.try_recv();
        }

        // slow connection kept only what its buffer could hold, and stayed
        // subscribed for future frames
        assert_eq!(drain(&mut slow_rx).len(), OUTBOUND_BUFFER);
        assert_eq!(hub.subscriber_count(room).await, 2);

        hub.broadcast(room, "after").await;
        assert_eq!(drain(&mut slow_rx), ["after"]);
    }
}
