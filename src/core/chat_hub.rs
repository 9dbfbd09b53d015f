//! Live Chat Hub
//!
//! In-process fan-out of chat messages to WebSocket sessions.
//! One broadcast channel per active room, created on first subscribe and
//! dropped once the last subscriber releases it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::ChatMessage;
use crate::utils::constants::ROOM_CHANNEL_CAPACITY;

#[derive(Clone, Default)]
pub struct ChatHub {
    rooms: Arc<DashMap<Uuid, broadcast::Sender<ChatMessage>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message published to `room_id` from now on
    pub fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<ChatMessage> {
        self.rooms
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver to live subscribers; returns how many received it
    pub fn publish(&self, message: &ChatMessage) -> usize {
        let delivered = self
            .rooms
            .get(&message.chatroom_id)
            .map_or(0, |tx| tx.send(message.clone()).unwrap_or(0));

        debug!(room = %message.chatroom_id, delivered, "Chat message published");
        delivered
    }

    /// Drop the room channel when no receiver is left.
    /// Call after the session's receiver has been dropped.
    pub fn release(&self, room_id: Uuid) {
        self.rooms.remove_if(&room_id, |_, tx| tx.receiver_count() == 0);
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}
