use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Browser subscription payload as produced by
/// `PushManager.subscribe().toJSON()`.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub push_enabled: bool,
    pub event_reminders: bool,
    pub recommendation_alerts: bool,
    pub rsvp_updates: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferencesRequest {
    pub push_enabled: Option<bool>,
    pub event_reminders: Option<bool>,
    pub recommendation_alerts: Option<bool>,
    pub rsvp_updates: Option<bool>,
}

/// Category a push belongs to; each maps to one preference toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EventReminder,
    RecommendationAlert,
    RsvpUpdate,
    Announcement,
}

/// Payload delivered to the service worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub profile_ids: Vec<Uuid>,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
}

/// Aggregate result of a bulk send.
#[derive(Debug, Default, Serialize)]
pub struct SendOutcome {
    pub sent: usize,
    pub failed: usize,
    pub pruned: usize,
}
