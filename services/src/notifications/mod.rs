//! In-app notifications raised by booking and review activity.

pub mod routes;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::SqlStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingStatusChanged,
    BookingCancelled,
    ReviewCreated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingStatusChanged => "booking_status_changed",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::ReviewCreated => "review_created",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "booking_created" => Some(NotificationKind::BookingCreated),
            "booking_status_changed" => Some(NotificationKind::BookingStatusChanged),
            "booking_cancelled" => Some(NotificationKind::BookingCancelled),
            "review_created" => Some(NotificationKind::ReviewCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub booking: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user: Uuid,
        kind: NotificationKind,
        message: impl Into<String>,
        booking: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            kind,
            message: message.into(),
            booking,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// Store a notification. Failures are logged and swallowed so the request
/// that triggered the notification still succeeds.
pub async fn notify<S: SqlStorage>(storage: &S, notification: Notification) {
    let user = notification.user;
    let kind = notification.kind;
    if let Err(e) = storage.notifications_insert(notification).await {
        tracing::warn!(%user, kind = kind.as_str(), error = %e, "Failed to store notification");
    }
}
