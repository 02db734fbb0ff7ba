use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Athlete,
    Coach,
}

/// Coaching hierarchy. Variant order gives `junior < principal < super_admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Type)]
#[sqlx(type_name = "coach_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CoachLevel {
    Junior,
    Principal,
    SuperAdmin,
}

impl CoachLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachLevel::Junior => "junior",
            CoachLevel::Principal => "principal",
            CoachLevel::SuperAdmin => "super_admin",
        }
    }
}

/// Profile row. `id` doubles as the user id. `coach_id` is an athlete's
/// assigned coach; `supervisor_id` is a junior coach's principal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
    pub coach_level: Option<CoachLevel>,
    pub full_name: String,
    pub coach_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_coach(&self) -> bool {
        self.role == Role::Coach
    }

    pub fn is_super_admin(&self) -> bool {
        self.coach_level == Some(CoachLevel::SuperAdmin)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignAthleteRequest {
    pub coach_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coach_levels_order_by_seniority() {
        assert!(CoachLevel::Junior < CoachLevel::Principal);
        assert!(CoachLevel::Principal < CoachLevel::SuperAdmin);
    }

    #[test]
    fn coach_level_serializes_snake_case() {
        let json = serde_json::to_string(&CoachLevel::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }
}
