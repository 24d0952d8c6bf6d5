use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::Mutex as OrderMutex;
use uuid::Uuid;

use crate::directory::{Directory, StoreError};
use crate::hub::RoomHub;
use crate::model::{ContentType, MessageRecord};
use crate::rooms::ws::ServerEvent;

/// An inbound send intent. The author is not part of the intent: it is
/// whatever identity the session layer attached to the connection.
#[derive(Debug, Clone)]
pub struct SendIntent {
    pub room_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub file_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid message: {0}")]
    Invalid(&'static str),

    #[error("message could not be stored")]
    Store(#[from] StoreError),
}

/// Persist-then-broadcast pipeline. Holds a per-room order lock across the
/// store append and the broadcast, so store insert order and broadcast
/// order agree within a room while rooms stay independent of each other.
#[derive(Clone)]
pub struct FanoutEngine {
    directory: Directory,
    hub: RoomHub,
    room_order: Arc<Mutex<HashMap<Uuid, Arc<OrderMutex<()>>>>>,
}

impl FanoutEngine {
    pub fn new(directory: Directory, hub: RoomHub) -> Self {
        Self {
            directory,
            hub,
            room_order: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn order_lock(&self, room_id: Uuid) -> Arc<OrderMutex<()>> {
        let mut locks = self
            .room_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(room_id).or_default().clone()
    }

    /// Run one message through validate, persist, broadcast. Returns the
    /// canonical stored record; each persisted message is broadcast exactly
    /// once. A sender's disconnect mid-call does not retract the message.
    pub async fn dispatch(
        &self,
        author_id: Uuid,
        intent: SendIntent,
    ) -> Result<MessageRecord, SendError> {
        let content = intent.content.trim();
        if content.is_empty() {
            return Err(SendError::Invalid("content must not be empty"));
        }

        let order = self.order_lock(intent.room_id);
        let _guard = order.lock().await;

        let record = self
            .directory
            .insert_message(
                intent.room_id,
                author_id,
                content,
                intent.content_type,
                intent.file_url.as_deref(),
            )
            .await?;

        let frame = ServerEvent::NewMessage {
            message: record.clone(),
        }
        .to_frame();
        self.hub.broadcast(record.room_id, &frame).await;
        Ok(record)
    }
}
