use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored OAuth tokens for a connected Google Calendar account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GoogleAccount {
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct GoogleConnectRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeUrlResponse {
    pub url: String,
}

/// Per-direction counters for one sync run. Individual item failures are
/// collected, not fatal.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub updated: usize,
    pub pulled: usize,
    pub deleted: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}
