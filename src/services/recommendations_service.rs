use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserSession;
use crate::models::{
    CreateRecommendationRequest, Recommendation, RecommendationPriority,
    UpdateRecommendationRequest,
};
use crate::services::permissions::{athlete_in_scope, resolve_coach_scope};
use crate::services::ServiceError;

const MAX_PAGE_SIZE: i64 = 100;
const REC_COLUMNS: &str =
    "id, coach_id, athlete_id, title, body, priority, read_at, created_at, updated_at";

/// Priority-tagged coach advice. Athletes see recommendations addressed to
/// them and own the read/unread state; coaches see their scope's slice.
#[derive(Clone)]
pub struct RecommendationsService {
    db: PgPool,
}

impl RecommendationsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_recommendation(
        &self,
        session: &UserSession,
        request: CreateRecommendationRequest,
    ) -> Result<Recommendation, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }
        if request.title.trim().is_empty() {
            return Err(ServiceError::Invalid("Title is empty".to_string()));
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !athlete_in_scope(&self.db, &scope, request.athlete_id).await? {
            return Err(ServiceError::Forbidden);
        }

        let recommendation = sqlx::query_as::<_, Recommendation>(&format!(
            "INSERT INTO recommendations (id, coach_id, athlete_id, title, body, priority, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {REC_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(request.athlete_id)
        .bind(&request.title)
        .bind(&request.body)
        .bind(request.priority.unwrap_or(RecommendationPriority::Medium))
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(recommendation)
    }

    pub async fn get_recommendation(
        &self,
        session: &UserSession,
        rec_id: Uuid,
    ) -> Result<Recommendation, ServiceError> {
        let recommendation = sqlx::query_as::<_, Recommendation>(&format!(
            "SELECT {REC_COLUMNS} FROM recommendations WHERE id = $1"
        ))
        .bind(rec_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ServiceError::NotFound)?;

        self.check_visible(session, &recommendation).await?;
        Ok(recommendation)
    }

    /// Recommendations visible to the session, newest first. Athletes get
    /// their own; coaches get their scope's.
    pub async fn list_recommendations(
        &self,
        session: &UserSession,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let limit = limit.unwrap_or(50).min(MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);

        if !session.is_coach() {
            let recommendations = sqlx::query_as::<_, Recommendation>(&format!(
                "SELECT {REC_COLUMNS} FROM recommendations
                 WHERE athlete_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
            ))
            .bind(session.user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

            return Ok(recommendations);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        let recommendations = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, Recommendation>(&format!(
                    "SELECT {REC_COLUMNS} FROM recommendations
                     ORDER BY created_at DESC LIMIT $1 OFFSET $2"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, Recommendation>(&format!(
                    "SELECT {REC_COLUMNS} FROM recommendations
                     WHERE coach_id = ANY($1)
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                ))
                .bind(coach_ids)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(recommendations)
    }

    pub async fn list_for_athlete(
        &self,
        session: &UserSession,
        athlete_id: Uuid,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        if !session.is_coach() {
            // Athletes may only ask for their own list
            if athlete_id != session.user_id {
                return Err(ServiceError::Forbidden);
            }
        } else {
            let scope = resolve_coach_scope(&self.db, session).await?;
            if !athlete_in_scope(&self.db, &scope, athlete_id).await? {
                return Err(ServiceError::Forbidden);
            }
        }

        let recommendations = sqlx::query_as::<_, Recommendation>(&format!(
            "SELECT {REC_COLUMNS} FROM recommendations
             WHERE athlete_id = $1 ORDER BY created_at DESC"
        ))
        .bind(athlete_id)
        .fetch_all(&self.db)
        .await?;

        Ok(recommendations)
    }

    /// Mark read. Athlete-only, own rows; idempotent for already-read rows.
    pub async fn mark_read(
        &self,
        session: &UserSession,
        rec_id: Uuid,
    ) -> Result<Recommendation, ServiceError> {
        self.set_read_state(session, rec_id, true).await
    }

    pub async fn mark_unread(
        &self,
        session: &UserSession,
        rec_id: Uuid,
    ) -> Result<Recommendation, ServiceError> {
        self.set_read_state(session, rec_id, false).await
    }

    async fn set_read_state(
        &self,
        session: &UserSession,
        rec_id: Uuid,
        read: bool,
    ) -> Result<Recommendation, ServiceError> {
        if session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let read_at = if read { Some(Utc::now()) } else { None };
        let recommendation = sqlx::query_as::<_, Recommendation>(&format!(
            "UPDATE recommendations
             SET read_at = CASE WHEN $3 THEN COALESCE(read_at, $4) ELSE NULL END,
                 updated_at = $5
             WHERE id = $1 AND athlete_id = $2
             RETURNING {REC_COLUMNS}"
        ))
        .bind(rec_id)
        .bind(session.user_id)
        .bind(read)
        .bind(read_at)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        recommendation.ok_or(ServiceError::NotFound)
    }

    /// Unread count for the session athlete.
    pub async fn unread_count(&self, session: &UserSession) -> Result<i64, ServiceError> {
        if session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM recommendations WHERE athlete_id = $1 AND read_at IS NULL",
        )
        .bind(session.user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Update content. Only the author or a super admin may edit.
    pub async fn update_recommendation(
        &self,
        session: &UserSession,
        rec_id: Uuid,
        request: UpdateRecommendationRequest,
    ) -> Result<Recommendation, ServiceError> {
        let existing = self.get_recommendation(session, rec_id).await?;
        if existing.coach_id != session.user_id && !session.is_super_admin() {
            return Err(ServiceError::Forbidden);
        }

        let recommendation = sqlx::query_as::<_, Recommendation>(&format!(
            "UPDATE recommendations
             SET title = COALESCE($2, title),
                 body = COALESCE($3, body),
                 priority = COALESCE($4, priority),
                 updated_at = $5
             WHERE id = $1
             RETURNING {REC_COLUMNS}"
        ))
        .bind(rec_id)
        .bind(request.title)
        .bind(request.body)
        .bind(request.priority)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        recommendation.ok_or(ServiceError::NotFound)
    }

    pub async fn delete_recommendation(
        &self,
        session: &UserSession,
        rec_id: Uuid,
    ) -> Result<(), ServiceError> {
        let existing = self.get_recommendation(session, rec_id).await?;
        if existing.coach_id != session.user_id && !session.is_super_admin() {
            return Err(ServiceError::Forbidden);
        }

        sqlx::query("DELETE FROM recommendations WHERE id = $1")
            .bind(rec_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn check_visible(
        &self,
        session: &UserSession,
        recommendation: &Recommendation,
    ) -> Result<(), ServiceError> {
        if !session.is_coach() {
            if recommendation.athlete_id != session.user_id {
                return Err(ServiceError::Forbidden);
            }
            return Ok(());
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !scope.contains(recommendation.coach_id) {
            return Err(ServiceError::Forbidden);
        }

        Ok(())
    }
}
