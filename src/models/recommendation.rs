use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "recommendation_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

/// Coach advice addressed to an athlete. `read_at` tracks whether the
/// athlete has seen it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recommendation {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub athlete_id: Uuid,
    pub title: String,
    pub body: String,
    pub priority: RecommendationPriority,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecommendationRequest {
    pub athlete_id: Uuid,
    pub title: String,
    pub body: String,
    pub priority: Option<RecommendationPriority>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecommendationRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<RecommendationPriority>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}
