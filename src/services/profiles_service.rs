use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserSession;
use crate::models::{CoachLevel, Profile, Role, UpdateProfileRequest};
use crate::services::permissions::{athlete_in_scope, resolve_coach_scope, CoachScope};
use crate::services::ServiceError;

const PROFILE_COLUMNS: &str =
    "id, role, coach_level, full_name, coach_id, supervisor_id, created_at, updated_at";

#[derive(Clone)]
pub struct ProfilesService {
    db: PgPool,
}

impl ProfilesService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_own_profile(&self, session: &UserSession) -> Result<Profile, ServiceError> {
        self.fetch_profile(session.user_id)
            .await?
            .ok_or(ServiceError::NotFound)
    }

    pub async fn update_own_profile(
        &self,
        session: &UserSession,
        request: UpdateProfileRequest,
    ) -> Result<Profile, ServiceError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles
             SET full_name = COALESCE($2, full_name),
                 updated_at = $3
             WHERE id = $1
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(session.user_id)
        .bind(request.full_name)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        profile.ok_or(ServiceError::NotFound)
    }

    /// Fetch a single profile, enforcing visibility: own profile always,
    /// otherwise the target must fall inside the session's coach scope.
    pub async fn get_profile(
        &self,
        session: &UserSession,
        profile_id: Uuid,
    ) -> Result<Profile, ServiceError> {
        let profile = self
            .fetch_profile(profile_id)
            .await?
            .ok_or(ServiceError::NotFound)?;

        if profile_id == session.user_id {
            return Ok(profile);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        let visible = match profile.role {
            Role::Coach => scope.contains(profile.id),
            Role::Athlete => athlete_in_scope(&self.db, &scope, profile.id).await?,
        };

        if !visible {
            return Err(ServiceError::Forbidden);
        }

        Ok(profile)
    }

    /// The athlete roster visible to a coach session.
    pub async fn list_athletes(&self, session: &UserSession) -> Result<Vec<Profile>, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        let athletes = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, Profile>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE role = 'athlete' ORDER BY full_name"
                ))
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, Profile>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE role = 'athlete' AND coach_id = ANY($1) ORDER BY full_name"
                ))
                .bind(coach_ids)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(athletes)
    }

    /// The coach roster visible to a coach session.
    pub async fn list_coaches(&self, session: &UserSession) -> Result<Vec<Profile>, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        let coaches = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, Profile>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE role = 'coach' ORDER BY full_name"
                ))
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, Profile>(&format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE role = 'coach' AND id = ANY($1) ORDER BY full_name"
                ))
                .bind(coach_ids)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(coaches)
    }

    /// Assign an athlete to a coach. Principals may only assign within their
    /// own subtree; juniors may not assign at all.
    pub async fn assign_athlete(
        &self,
        session: &UserSession,
        athlete_id: Uuid,
        coach_id: Uuid,
    ) -> Result<Profile, ServiceError> {
        match session.coach_level {
            Some(CoachLevel::SuperAdmin) | Some(CoachLevel::Principal) => {}
            _ => return Err(ServiceError::Forbidden),
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !scope.contains(coach_id) {
            return Err(ServiceError::Forbidden);
        }

        let target_coach = self
            .fetch_profile(coach_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        if target_coach.role != Role::Coach {
            return Err(ServiceError::Invalid(
                "Assignment target is not a coach".to_string(),
            ));
        }

        let athlete = sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles
             SET coach_id = $2, updated_at = $3
             WHERE id = $1 AND role = 'athlete'
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(athlete_id)
        .bind(coach_id)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        athlete.ok_or(ServiceError::NotFound)
    }

    pub(crate) async fn fetch_profile(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<Profile>, ServiceError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(profile_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(profile)
    }
}
