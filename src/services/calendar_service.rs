use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::UserSession;
use crate::models::{
    CalendarEvent, CreateEventRequest, EventParticipant, EventWithParticipants, Profile, Role,
    RsvpStatus, UpdateEventRequest,
};
use crate::services::permissions::{athlete_in_scope, resolve_coach_scope, CoachScope};
use crate::services::ServiceError;

const EVENT_COLUMNS: &str = "id, coach_id, title, description, location, starts_at, ends_at, \
                             all_day, google_event_id, google_synced_at, created_at, updated_at";

/// Scheduling: events, participants, RSVP. A coach sees events created by
/// coaches in scope; an athlete sees events they participate in.
#[derive(Clone)]
pub struct CalendarService {
    db: PgPool,
}

impl CalendarService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create_event(
        &self,
        session: &UserSession,
        request: CreateEventRequest,
    ) -> Result<EventWithParticipants, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }
        check_window(request.starts_at, request.ends_at)?;

        let event = sqlx::query_as::<_, CalendarEvent>(&format!(
            "INSERT INTO calendar_events
                 (id, coach_id, title, description, location, starts_at, ends_at, all_day, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.location)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(request.all_day.unwrap_or(false))
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        let mut participants = Vec::new();
        for profile_id in request.participants.unwrap_or_default() {
            let participant = self
                .insert_participant(session, event.id, profile_id)
                .await?;
            participants.push(participant);
        }

        Ok(EventWithParticipants {
            event,
            participants,
        })
    }

    pub async fn get_event(
        &self,
        session: &UserSession,
        event_id: Uuid,
    ) -> Result<EventWithParticipants, ServiceError> {
        let event = self
            .fetch_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.check_visible(session, &event).await?;

        let participants = self.fetch_participants(event_id).await?;

        Ok(EventWithParticipants {
            event,
            participants,
        })
    }

    /// Events in the given range visible to the session.
    pub async fn list_events(
        &self,
        session: &UserSession,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CalendarEvent>, ServiceError> {
        let from = from.unwrap_or_else(|| Utc::now() - chrono::Duration::days(30));
        let to = to.unwrap_or_else(|| Utc::now() + chrono::Duration::days(365));

        if !session.is_coach() {
            let events = sqlx::query_as::<_, CalendarEvent>(&format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events e
                 WHERE e.starts_at < $2 AND e.ends_at > $1
                   AND EXISTS (SELECT 1 FROM calendar_event_participants p
                               WHERE p.event_id = e.id AND p.profile_id = $3)
                 ORDER BY e.starts_at"
            ))
            .bind(from)
            .bind(to)
            .bind(session.user_id)
            .fetch_all(&self.db)
            .await?;

            return Ok(events);
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        let events = match scope.as_filter() {
            None => {
                sqlx::query_as::<_, CalendarEvent>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE starts_at < $2 AND ends_at > $1
                     ORDER BY starts_at"
                ))
                .bind(from)
                .bind(to)
                .fetch_all(&self.db)
                .await?
            }
            Some(coach_ids) => {
                sqlx::query_as::<_, CalendarEvent>(&format!(
                    "SELECT {EVENT_COLUMNS} FROM calendar_events
                     WHERE starts_at < $2 AND ends_at > $1 AND coach_id = ANY($3)
                     ORDER BY starts_at"
                ))
                .bind(from)
                .bind(to)
                .bind(coach_ids)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(events)
    }

    pub async fn update_event(
        &self,
        session: &UserSession,
        event_id: Uuid,
        request: UpdateEventRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let existing = self
            .fetch_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.check_mutable(session, &existing)?;

        let starts_at = request.starts_at.unwrap_or(existing.starts_at);
        let ends_at = request.ends_at.unwrap_or(existing.ends_at);
        check_window(starts_at, ends_at)?;

        let event = sqlx::query_as::<_, CalendarEvent>(&format!(
            "UPDATE calendar_events
             SET title = COALESCE($2, title),
                 description = COALESCE($3, description),
                 location = COALESCE($4, location),
                 starts_at = $5,
                 ends_at = $6,
                 all_day = COALESCE($7, all_day),
                 updated_at = $8
             WHERE id = $1
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event_id)
        .bind(request.title)
        .bind(request.description)
        .bind(request.location)
        .bind(starts_at)
        .bind(ends_at)
        .bind(request.all_day)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        event.ok_or(ServiceError::NotFound)
    }

    pub async fn delete_event(
        &self,
        session: &UserSession,
        event_id: Uuid,
    ) -> Result<(), ServiceError> {
        let existing = self
            .fetch_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.check_mutable(session, &existing)?;

        sqlx::query("DELETE FROM calendar_events WHERE id = $1")
            .bind(event_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn add_participant(
        &self,
        session: &UserSession,
        event_id: Uuid,
        profile_id: Uuid,
    ) -> Result<EventParticipant, ServiceError> {
        let event = self
            .fetch_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.check_mutable(session, &event)?;

        self.insert_participant(session, event_id, profile_id).await
    }

    pub async fn remove_participant(
        &self,
        session: &UserSession,
        event_id: Uuid,
        profile_id: Uuid,
    ) -> Result<(), ServiceError> {
        let event = self
            .fetch_event(event_id)
            .await?
            .ok_or(ServiceError::NotFound)?;
        self.check_mutable(session, &event)?;

        let result = sqlx::query(
            "DELETE FROM calendar_event_participants WHERE event_id = $1 AND profile_id = $2",
        )
        .bind(event_id)
        .bind(profile_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }

    /// RSVP to an event the session participates in. `responded_at` is set
    /// on the first response and kept afterwards.
    pub async fn rsvp(
        &self,
        session: &UserSession,
        event_id: Uuid,
        status: RsvpStatus,
    ) -> Result<EventParticipant, ServiceError> {
        let participant = sqlx::query_as::<_, EventParticipant>(
            "UPDATE calendar_event_participants
             SET rsvp_status = $3,
                 responded_at = COALESCE(responded_at, $4)
             WHERE event_id = $1 AND profile_id = $2
             RETURNING event_id, profile_id, rsvp_status, responded_at",
        )
        .bind(event_id)
        .bind(session.user_id)
        .bind(status)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        participant.ok_or(ServiceError::NotFound)
    }

    pub(crate) async fn fetch_event(
        &self,
        event_id: Uuid,
    ) -> Result<Option<CalendarEvent>, ServiceError> {
        let event = sqlx::query_as::<_, CalendarEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(event)
    }

    pub(crate) async fn fetch_participants(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<EventParticipant>, ServiceError> {
        let participants = sqlx::query_as::<_, EventParticipant>(
            "SELECT event_id, profile_id, rsvp_status, responded_at
             FROM calendar_event_participants WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        Ok(participants)
    }

    async fn insert_participant(
        &self,
        session: &UserSession,
        event_id: Uuid,
        profile_id: Uuid,
    ) -> Result<EventParticipant, ServiceError> {
        let scope = resolve_coach_scope(&self.db, session).await?;
        if !self.participant_allowed(session, &scope, profile_id).await? {
            return Err(ServiceError::Forbidden);
        }

        let participant = sqlx::query_as::<_, EventParticipant>(
            "INSERT INTO calendar_event_participants (event_id, profile_id)
             VALUES ($1, $2)
             ON CONFLICT (event_id, profile_id) DO UPDATE SET profile_id = EXCLUDED.profile_id
             RETURNING event_id, profile_id, rsvp_status, responded_at",
        )
        .bind(event_id)
        .bind(profile_id)
        .fetch_one(&self.db)
        .await?;

        Ok(participant)
    }

    async fn participant_allowed(
        &self,
        session: &UserSession,
        scope: &CoachScope,
        profile_id: Uuid,
    ) -> Result<bool, ServiceError> {
        if profile_id == session.user_id {
            return Ok(true);
        }

        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, role, coach_level, full_name, coach_id, supervisor_id, created_at, updated_at
             FROM profiles WHERE id = $1",
        )
        .bind(profile_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(profile) = profile else {
            return Ok(false);
        };

        Ok(match profile.role {
            Role::Coach => scope.contains(profile.id),
            Role::Athlete => athlete_in_scope(&self.db, scope, profile.id).await?,
        })
    }

    async fn check_visible(
        &self,
        session: &UserSession,
        event: &CalendarEvent,
    ) -> Result<(), ServiceError> {
        if !session.is_coach() {
            let participant: Option<(Uuid,)> = sqlx::query_as(
                "SELECT profile_id FROM calendar_event_participants
                 WHERE event_id = $1 AND profile_id = $2",
            )
            .bind(event.id)
            .bind(session.user_id)
            .fetch_optional(&self.db)
            .await?;

            if participant.is_none() {
                return Err(ServiceError::Forbidden);
            }
            return Ok(());
        }

        let scope = resolve_coach_scope(&self.db, session).await?;
        if !scope.contains(event.coach_id) {
            return Err(ServiceError::Forbidden);
        }

        Ok(())
    }

    fn check_mutable(
        &self,
        session: &UserSession,
        event: &CalendarEvent,
    ) -> Result<(), ServiceError> {
        if event.coach_id != session.user_id && !session.is_super_admin() {
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }
}

fn check_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<(), ServiceError> {
    if ends_at <= starts_at {
        return Err(ServiceError::Invalid(
            "Event must end after it starts".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_window() {
        let start = Utc::now();
        let end = start - chrono::Duration::hours(1);
        assert!(check_window(start, end).is_err());
        assert!(check_window(start, start).is_err());
        assert!(check_window(start, start + chrono::Duration::hours(1)).is_ok());
    }
}
