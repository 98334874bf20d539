use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Notification, Severity};
use crate::ports::{AccountDirectory, NotificationStore};
use crate::services::push::PushHub;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    User(Uuid),
    /// Every live administrator, resolved at delivery time.
    Admins,
}

/// Text of a notification to persist in each recipient's inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeText {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl NoticeText {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatch {
    pub audience: Audience,
    pub notice: Option<NoticeText>,
    pub payload: Value,
}

/// Queues post-commit fan-out so ledger operations never wait on delivery.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::UnboundedSender<Dispatch>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Dispatch>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, dispatch: Dispatch) {
        if let Err(e) = self.sender.send(dispatch) {
            warn!(audience = ?e.0.audience, "Notification dispatcher stopped, dispatch dropped");
        }
    }
}

/// Drains the dispatch queue until every `Notifier` is dropped.
pub async fn run_dispatcher(
    mut receiver: mpsc::UnboundedReceiver<Dispatch>,
    accounts: Arc<dyn AccountDirectory>,
    store: Arc<dyn NotificationStore>,
    hub: PushHub,
) {
    info!("Notification dispatcher started");

    while let Some(dispatch) = receiver.recv().await {
        deliver(&dispatch, accounts.as_ref(), store.as_ref(), &hub).await;
    }

    info!("Notification dispatcher stopped");
}

pub async fn deliver(
    dispatch: &Dispatch,
    accounts: &dyn AccountDirectory,
    store: &dyn NotificationStore,
    hub: &PushHub,
) {
    let recipients = match dispatch.audience {
        Audience::User(user_id) => vec![user_id],
        Audience::Admins => match accounts.list_admins().await {
            Ok(admins) => admins.into_iter().map(|admin| admin.id).collect(),
            Err(e) => {
                error!("Failed to resolve administrators for dispatch: {}", e);
                return;
            }
        },
    };

    debug!(recipients = recipients.len(), "Delivering dispatch");

    for user_id in recipients {
        let mut payload = dispatch.payload.clone();

        if let Some(notice) = &dispatch.notice {
            let notification = Notification::new(
                user_id,
                notice.title.clone(),
                notice.message.clone(),
                notice.severity,
            );
            match store.create(&notification).await {
                Ok(()) => {
                    if let (Value::Object(map), Ok(value)) =
                        (&mut payload, serde_json::to_value(&notification))
                    {
                        map.insert("notification".to_string(), value);
                    }
                }
                Err(e) => error!(%user_id, "Failed to persist notification: {}", e),
            }
        }

        hub.push(user_id, payload);
    }
}
