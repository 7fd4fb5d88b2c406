// Event bus: one broadcast "room" per market. Subscribing to a market
// delivers a snapshot to that socket only; every fill, cancel, and
// market-order outcome republishes the current snapshot to the market's
// room.
//
// Grounded on the teacher's `ws_broadcaster: broadcast::Sender<WebSocketMessage>`
// in `matching/mod.rs` / `api/handlers.rs::websocket_connection`, narrowed
// from one global channel to per-market channels — the teacher broadcasts
// every message to every connected socket, which doesn't match the
// per-market "room" semantics `original_source/backend/app/websocket.py`'s
// Socket.IO server implements (`enter_room`/`emit(room=...)`).

use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::types::WebSocketMessage;

const ROOM_CAPACITY: usize = 256;

pub struct EventBus {
    rooms: RwLock<HashMap<Uuid, broadcast::Sender<WebSocketMessage>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { rooms: RwLock::new(HashMap::new()) }
    }

    /// Returns the market's broadcast sender, creating its room on first use.
    pub async fn room(&self, market_id: Uuid) -> broadcast::Sender<WebSocketMessage> {
        if let Some(tx) = self.rooms.read().await.get(&market_id) {
            return tx.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(market_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .clone()
    }

    /// Publishes a message to the market's room. A room with no current
    /// subscribers simply drops the send — `broadcast::Sender::send`
    /// only errors when there are zero receivers, which is expected and
    /// not worth logging as a failure.
    pub async fn publish(&self, market_id: Uuid, message: WebSocketMessage) {
        let tx = self.room(market_id).await;
        let _ = tx.send(message);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
