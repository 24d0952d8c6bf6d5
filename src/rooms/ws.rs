use axum::debug_handler;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fanout::{FanoutEngine, SendIntent};
use crate::hub::{ConnectionId, RoomHub};
use crate::membership::MembershipCoordinator;
use crate::model::{ContentType, MessageRecord};
use crate::session::AuthedUser;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        room_id: Uuid,
    },
    LeaveRoom {
        room_id: Uuid,
    },
    SendMessage {
        room_id: Uuid,
        content: String,
        #[serde(default)]
        content_type: ContentType,
        #[serde(default)]
        file_url: Option<String>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage { message: MessageRecord },
    SendFailed { reason: String },
    Error { reason: String },
}

impl ServerEvent {
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::error!(%err, "event failed to encode");
            r#"{"type":"error","reason":"encoding failure"}"#.to_owned()
        })
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(hub): State<RoomHub>,
    State(fanout): State<FanoutEngine>,
    State(coordinator): State<MembershipCoordinator>,
    AuthedUser(user_id): AuthedUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub, fanout, coordinator, user_id))
}

async fn handle_socket(
    socket: WebSocket,
    hub: RoomHub,
    fanout: FanoutEngine,
    coordinator: MembershipCoordinator,
    user_id: Uuid,
) {
    let (conn, direct, mut frames) = hub.connect().await;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => handle_event(event, conn, user_id, &hub, &fanout, &coordinator, &direct).await,
            Err(err) => {
                debug!(connection = %conn, %err, "undecodable client frame");
                let _ = direct.try_send(
                    ServerEvent::Error {
                        reason: "unrecognized event".to_owned(),
                    }
                    .to_frame(),
                );
            }
        }
    }

    // one cleanup path for voluntary and abrupt termination alike
    writer.abort();
    hub.disconnect(conn).await;
}

async fn handle_event(
    event: ClientEvent,
    conn: ConnectionId,
    user_id: Uuid,
    hub: &RoomHub,
    fanout: &FanoutEngine,
    coordinator: &MembershipCoordinator,
    direct: &mpsc::Sender<String>,
) {
    match event {
        ClientEvent::JoinRoom { room_id } => match coordinator.require_member(user_id, room_id).await {
            Ok(_) => hub.join(conn, room_id).await,
            Err(err) => {
                debug!(connection = %conn, room = %room_id, %err, "subscribe refused");
                let _ = direct.try_send(
                    ServerEvent::Error {
                        reason: err.to_string(),
                    }
                    .to_frame(),
                );
            }
        },
        ClientEvent::LeaveRoom { room_id } => hub.leave(conn, room_id).await,
        ClientEvent::SendMessage {
            room_id,
            content,
            content_type,
            file_url,
        } => {
            // runs detached: the sender hanging up must not cancel an
            // in-flight persist, and a slow store must not stall the
            // connection's event loop
            let fanout = fanout.clone();
            let direct = direct.clone();
            tokio::spawn(async move {
                let intent = SendIntent {
                    room_id,
                    content,
                    content_type,
                    file_url,
                };
                if let Err(err) = fanout.dispatch(user_id, intent).await {
                    warn!(room = %room_id, author = %user_id, %err, "send dropped");
                    let _ = direct
                        .send(
                            ServerEvent::SendFailed {
                                reason: err.to_string(),
                            }
                            .to_frame(),
                        )
                        .await;
                }
            });
        }
    }
}
