//! Real-time chat over WebSocket
//!
//! `GET /ws/chat?access_token=<jwt>`. Clients join rooms they take part in
//! and receive every message posted there, over REST or over the socket.
//!
//! Client frames: `join`, `leave`, `send`.
//! Server frames: `joined`, `left`, `message`, `error`.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::extract::{authenticate, bearer_token, ApiQuery};
use super::handlers::AppState;
use crate::core::chat::{post_message, room_for_participant};
use crate::models::{AppError, AppResult, ChatMessage};

/// Frames queued per connection before sends start waiting
const OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { chatroom_id: Uuid },
    Leave { chatroom_id: Uuid },
    Send { chatroom_id: Uuid, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Joined { chatroom_id: Uuid },
    Left { chatroom_id: Uuid },
    Message { message: ChatMessage },
    Error { code: String, message: String },
}

impl From<AppError> for ServerFrame {
    fn from(err: AppError) -> Self {
        let message = if err.code.is_internal() {
            tracing::error!(code = %err.code_str(), "{}", err.message);
            "Internal server error".to_string()
        } else {
            err.message
        };
        ServerFrame::Error {
            code: err.code.as_str().to_string(),
            message,
        }
    }
}

/// Authenticate, then upgrade. The token may come from the query or a bearer header.
pub async fn chat_socket(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiQuery(params): ApiQuery<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let token = params
        .access_token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(AppError::missing_token)?;
    let auth = authenticate(&state, token).await?;
    let ws = ws.map_err(|e| AppError::bad_request(e.body_text()))?;

    let user_id = auth.id();
    Ok(ws.on_upgrade(move |socket| run_socket(socket, state, user_id)))
}

async fn run_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut frames) = mpsc::channel::<ServerFrame>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    info!(user = %user_id, "🔌 Chat socket connected");
    let mut session = ChatSession::new(state, user_id, outbox.clone());

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Some(reply) = session.handle_text(&text).await {
                    if outbox.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close().await;
    writer.abort();
    info!(user = %user_id, "🔌 Chat socket closed");
}

/// Per-connection state: which rooms are joined and where frames go
pub struct ChatSession {
    state: Arc<AppState>,
    user_id: Uuid,
    outbox: mpsc::Sender<ServerFrame>,
    rooms: HashMap<Uuid, JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(state: Arc<AppState>, user_id: Uuid, outbox: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            state,
            user_id,
            outbox,
            rooms: HashMap::new(),
        }
    }

    /// Handle one text frame and return the direct reply, if any.
    /// Malformed frames get an error reply; the session stays open.
    pub async fn handle_text(&mut self, text: &str) -> Option<ServerFrame> {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                return Some(ServerFrame::Error {
                    code: "API_BAD_REQUEST".to_string(),
                    message: format!("Malformed frame: {}", e),
                })
            }
        };

        match self.handle_frame(frame).await {
            Ok(reply) => reply,
            Err(e) => Some(e.into()),
        }
    }

    async fn handle_frame(&mut self, frame: ClientFrame) -> AppResult<Option<ServerFrame>> {
        match frame {
            ClientFrame::Join { chatroom_id } => {
                room_for_participant(self.state.store.as_ref(), chatroom_id, self.user_id).await?;
                if !self.rooms.contains_key(&chatroom_id) {
                    let live = self.state.hub.subscribe(chatroom_id);
                    self.rooms
                        .insert(chatroom_id, forward_room(live, self.outbox.clone()));
                }
                Ok(Some(ServerFrame::Joined { chatroom_id }))
            }
            ClientFrame::Leave { chatroom_id } => {
                self.leave(chatroom_id).await;
                Ok(Some(ServerFrame::Left { chatroom_id }))
            }
            ClientFrame::Send { chatroom_id, content } => {
                let message = post_message(
                    self.state.store.as_ref(),
                    &self.state.hub,
                    chatroom_id,
                    self.user_id,
                    &content,
                    Utc::now(),
                )
                .await?;
                // A joined room already delivers the message through its forwarder
                if self.rooms.contains_key(&chatroom_id) {
                    Ok(None)
                } else {
                    Ok(Some(ServerFrame::Message { message }))
                }
            }
        }
    }

    async fn leave(&mut self, room_id: Uuid) {
        if let Some(task) = self.rooms.remove(&room_id) {
            task.abort();
            // Wait for the receiver to drop before releasing the channel
            let _ = task.await;
            self.state.hub.release(room_id);
        }
    }

    pub fn joined_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Leave every joined room
    pub async fn close(mut self) {
        let rooms: Vec<Uuid> = self.rooms.keys().copied().collect();
        for room_id in rooms {
            self.leave(room_id).await;
        }
    }
}

/// Pump live room messages into the connection's outbox
fn forward_room(mut live: broadcast::Receiver<ChatMessage>, outbox: mpsc::Sender<ServerFrame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match live.recv().await {
                Ok(message) => {
                    if outbox.send(ServerFrame::Message { message }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Chat subscriber lagged, messages skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppConfig, ChatRoom, Condition, Listing, ListingStatus, NewUser, User};
    use std::time::Duration;

    struct Fixture {
        state: Arc<AppState>,
        buyer: User,
        seller: User,
        room: ChatRoom,
    }

    async fn fixture() -> Fixture {
        let state = Arc::new(AppState::in_memory(AppConfig::for_testing()).unwrap());
        let mut users = Vec::new();
        for name in ["buyer", "seller"] {
            let user = User::new(
                NewUser {
                    email: format!("{}@example.com", name),
                    username: name.to_string(),
                    password_hash: "x".to_string(),
                    display_name: None,
                },
                Utc::now(),
            );
            users.push(state.store.create_user(user).await.unwrap());
        }
        let seller = users.pop().unwrap();
        let buyer = users.pop().unwrap();

        let now = Utc::now();
        let listing = state
            .store
            .insert_listing(Listing {
                id: Uuid::new_v4(),
                seller_id: seller.id,
                title: "Leather boots".to_string(),
                description: String::new(),
                price_cents: 8000,
                category: "shoes".to_string(),
                size: "42".to_string(),
                condition: Condition::LikeNew,
                brand: None,
                image_keys: vec![],
                status: ListingStatus::Available,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let room = state
            .store
            .insert_chatroom(ChatRoom {
                id: Uuid::new_v4(),
                listing_id: listing.id,
                buyer_id: buyer.id,
                seller_id: seller.id,
                created_at: now,
                last_message_at: None,
            })
            .await
            .unwrap();

        Fixture { state, buyer, seller, room }
    }

    async fn next_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> ServerFrame {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open")
    }

    #[test]
    fn test_frame_wire_format() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"join","chatroom_id":"00000000-0000-0000-0000-000000000001"}"#)
                .unwrap();
        assert!(matches!(frame, ClientFrame::Join { .. }));

        let json = serde_json::to_value(ServerFrame::Left { chatroom_id: Uuid::nil() }).unwrap();
        assert_eq!(json["type"], "left");
        assert_eq!(json["chatroom_id"], Uuid::nil().to_string());
    }

    #[tokio::test]
    async fn test_join_and_receive_live_messages() {
        let f = fixture().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = ChatSession::new(f.state.clone(), f.seller.id, tx);

        let reply = session
            .handle_text(&format!(r#"{{"type":"join","chatroom_id":"{}"}}"#, f.room.id))
            .await;
        assert_eq!(reply, Some(ServerFrame::Joined { chatroom_id: f.room.id }));
        assert_eq!(session.joined_rooms(), 1);

        let sent = post_message(f.state.store.as_ref(), &f.state.hub, f.room.id, f.buyer.id, "hi!", Utc::now())
            .await
            .unwrap();

        assert_eq!(next_frame(&mut rx).await, ServerFrame::Message { message: sent });

        session.close().await;
        assert_eq!(f.state.hub.active_rooms(), 0);
    }

    #[tokio::test]
    async fn test_send_over_socket_persists() {
        let f = fixture().await;
        let (tx, _rx) = mpsc::channel(8);
        let mut session = ChatSession::new(f.state.clone(), f.buyer.id, tx);

        let reply = session
            .handle_text(&format!(
                r#"{{"type":"send","chatroom_id":"{}","content":"is it still available?"}}"#,
                f.room.id
            ))
            .await;
        let Some(ServerFrame::Message { message }) = reply else {
            panic!("expected message frame, got {:?}", reply);
        };
        assert_eq!(message.content, "is it still available?");

        let history = f.state.store.messages(f.room.id, None, 10).await.unwrap();
        assert_eq!(history, vec![message]);
    }

    #[tokio::test]
    async fn test_errors_keep_session_open() {
        let f = fixture().await;
        let (tx, _rx) = mpsc::channel(8);
        let outsider = Uuid::new_v4();
        let mut session = ChatSession::new(f.state.clone(), outsider, tx);

        let reply = session.handle_text("{not json").await;
        assert!(matches!(reply, Some(ServerFrame::Error { ref code, .. }) if code == "API_BAD_REQUEST"));

        let reply = session
            .handle_text(&format!(r#"{{"type":"join","chatroom_id":"{}"}}"#, f.room.id))
            .await;
        assert!(matches!(reply, Some(ServerFrame::Error { ref code, .. }) if code == "API_FORBIDDEN"));
        assert_eq!(session.joined_rooms(), 0);

        let reply = session
            .handle_text(&format!(r#"{{"type":"leave","chatroom_id":"{}"}}"#, f.room.id))
            .await;
        assert_eq!(reply, Some(ServerFrame::Left { chatroom_id: f.room.id }));
    }

    #[tokio::test]
    async fn test_send_into_joined_room_delivers_once() {
        let f = fixture().await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = ChatSession::new(f.state.clone(), f.buyer.id, tx);

        session
            .handle_text(&format!(r#"{{"type":"join","chatroom_id":"{}"}}"#, f.room.id))
            .await;
        let reply = session
            .handle_text(&format!(r#"{{"type":"send","chatroom_id":"{}","content":"hi"}}"#, f.room.id))
            .await;
        assert_eq!(reply, None);

        let ServerFrame::Message { message } = next_frame(&mut rx).await else {
            panic!("expected the forwarded message");
        };
        assert_eq!(message.content, "hi");

        let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(extra.is_err(), "message delivered twice: {:?}", extra);

        session.close().await;
    }
}
