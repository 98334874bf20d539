use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const PUSH_CHANNEL_CAPACITY: usize = 256;

/// A payload addressed to one user's live connections.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub user_id: Uuid,
    pub payload: Value,
}

/// Best-effort fan-out to connected WebSocket clients.
///
/// Every connection subscribes to the same channel and keeps only the
/// messages addressed to its user. Nothing is buffered for users who are
/// offline.
#[derive(Clone)]
pub struct PushHub {
    sender: broadcast::Sender<PushMessage>,
}

impl PushHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn push(&self, user_id: Uuid, payload: Value) {
        if self.sender.send(PushMessage { user_id, payload }).is_err() {
            tracing::trace!(%user_id, "No live connections, push dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.sender.subscribe()
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}
