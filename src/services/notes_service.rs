use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserSession;
use crate::models::{CreateNoteRequest, Note, UpdateNoteRequest};
use crate::services::permissions::{athlete_in_scope, resolve_coach_scope};
use crate::services::ServiceError;

const MAX_PAGE_SIZE: i64 = 100;

/// Coach observations. Notes are coach-only: athlete sessions are rejected
/// before any query runs.
#[derive(Clone)]
pub struct NotesService {
    db: PgPool,
}

impl NotesService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_note(
        &self,
        session: &UserSession,
        request: CreateNoteRequest,
    ) -> Result<Note, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }
        if request.body.trim().is_empty() {
            return Err(ServiceError::Invalid("Note body is empty".to_string()));
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !athlete_in_scope(&self.db, &scope, request.athlete_id).await? {
            return Err(ServiceError::Forbidden);
        }

        let note = sqlx::query_as::<_, Note>(
            "INSERT INTO notes (id, coach_id, athlete_id, body, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, coach_id, athlete_id, body, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(request.athlete_id)
        .bind(&request.body)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(note)
    }

    pub async fn get_note(
        &self,
        session: &UserSession,
        note_id: Uuid,
    ) -> Result<Note, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let note = sqlx::query_as::<_, Note>(
            "SELECT id, coach_id, athlete_id, body, created_at, updated_at
             FROM notes WHERE id = $1",
        )
        .bind(note_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(ServiceError::NotFound)?;

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !scope.contains(note.coach_id) {
            return Err(ServiceError::Forbidden);
        }

        Ok(note)
    }

    /// Notes visible to the session coach, newest first.
    pub async fn list_notes(
        &self,
        session: &UserSession,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Note>, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let limit = limit.unwrap_or(50).min(MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let scope = resolve_coach_scope(&self.db, session).await?;

        let notes = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, Note>(
                    "SELECT id, coach_id, athlete_id, body, created_at, updated_at
                     FROM notes ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, Note>(
                    "SELECT id, coach_id, athlete_id, body, created_at, updated_at
                     FROM notes WHERE coach_id = ANY($1)
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(coach_ids)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(notes)
    }

    /// All notes about one athlete, provided the athlete is in scope.
    pub async fn list_notes_for_athlete(
        &self,
        session: &UserSession,
        athlete_id: Uuid,
    ) -> Result<Vec<Note>, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !athlete_in_scope(&self.db, &scope, athlete_id).await? {
            return Err(ServiceError::Forbidden);
        }

        let notes = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, Note>(
                    "SELECT id, coach_id, athlete_id, body, created_at, updated_at
                     FROM notes WHERE athlete_id = $1 ORDER BY created_at DESC",
                )
                .bind(athlete_id)
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, Note>(
                    "SELECT id, coach_id, athlete_id, body, created_at, updated_at
                     FROM notes WHERE athlete_id = $1 AND coach_id = ANY($2)
                     ORDER BY created_at DESC",
                )
                .bind(athlete_id)
                .bind(coach_ids)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(notes)
    }

    /// Update a note. Only the author or a super admin may edit.
    pub async fn update_note(
        &self,
        session: &UserSession,
        note_id: Uuid,
        request: UpdateNoteRequest,
    ) -> Result<Note, ServiceError> {
        let note = self.get_note(session, note_id).await?;
        if note.coach_id != session.user_id && !session.is_super_admin() {
            return Err(ServiceError::Forbidden);
        }

        let note = sqlx::query_as::<_, Note>(
            "UPDATE notes
             SET body = COALESCE($2, body),
                 updated_at = $3
             WHERE id = $1
             RETURNING id, coach_id, athlete_id, body, created_at, updated_at",
        )
        .bind(note_id)
        .bind(request.body)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        note.ok_or(ServiceError::NotFound)
    }

    pub async fn delete_note(
        &self,
        session: &UserSession,
        note_id: Uuid,
    ) -> Result<(), ServiceError> {
        let note = self.get_note(session, note_id).await?;
        if note.coach_id != session.user_id && !session.is_super_admin() {
            return Err(ServiceError::Forbidden);
        }

        sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(note_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
