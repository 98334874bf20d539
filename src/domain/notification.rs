use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::stored_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

stored_enum!(Severity, "notification type", {
    Success => "SUCCESS",
    Warning => "WARNING",
    Error => "ERROR",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub is_unread: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Uuid, title: String, message: String, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            message,
            severity,
            is_unread: true,
            created_at: Utc::now(),
        }
    }
}
