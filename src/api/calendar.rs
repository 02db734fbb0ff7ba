use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::models::{
    AddParticipantRequest, AuthorizeUrlResponse, CalendarEvent, CreateEventRequest,
    EventParticipant, EventWithParticipants, GoogleAccount, GoogleConnectRequest,
    NotificationKind, PushMessage, RsvpRequest, SyncReport, UpdateEventRequest,
};
use crate::services::{CalendarService, GoogleSyncService, IcalExporter, ServiceError, WebPushService};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CalendarAppState {
    pub calendar_service: CalendarService,
    pub google_sync: GoogleSyncService,
    pub push_service: WebPushService,
}

pub fn calendar_routes(
    db: PgPool,
    auth_service: AuthService,
    google_sync: GoogleSyncService,
    push_service: WebPushService,
) -> Router {
    let state = CalendarAppState {
        calendar_service: CalendarService::new(db),
        google_sync,
        push_service,
    };

    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:event_id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/:event_id/participants", post(add_participant))
        .route(
            "/events/:event_id/participants/:profile_id",
            delete(remove_participant),
        )
        .route("/events/:event_id/rsvp", post(rsvp))
        .route("/export", get(export_ical))
        .route("/google/authorize", get(google_authorize))
        .route("/google/connect", post(google_connect))
        .route("/google/sync", post(google_sync_run))
        .route("/google", delete(google_disconnect))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

async fn list_events(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<CalendarEvent>>, ServiceError> {
    Ok(Json(
        state
            .calendar_service
            .list_events(&session, query.from, query.to)
            .await?,
    ))
}

async fn create_event(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventWithParticipants>), ServiceError> {
    let created = state.calendar_service.create_event(&session, request).await?;

    for participant in &created.participants {
        notify_participant(&state.push_service, &created.event, participant.profile_id).await;
    }

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_event(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventWithParticipants>, ServiceError> {
    Ok(Json(
        state.calendar_service.get_event(&session, event_id).await?,
    ))
}

async fn update_event(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<UpdateEventRequest>,
) -> Result<Json<CalendarEvent>, ServiceError> {
    Ok(Json(
        state
            .calendar_service
            .update_event(&session, event_id, request)
            .await?,
    ))
}

async fn delete_event(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path(event_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    let existing = state.calendar_service.get_event(&session, event_id).await?;
    state
        .calendar_service
        .delete_event(&session, event_id)
        .await?;

    // Remove the Google mirror if one exists; best effort only
    if let Err(err) = state
        .google_sync
        .delete_remote(&session, &existing.event)
        .await
    {
        tracing::warn!("Failed to remove Google mirror for {}: {}", event_id, err);
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn add_participant(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<AddParticipantRequest>,
) -> Result<(StatusCode, Json<EventParticipant>), ServiceError> {
    let participant = state
        .calendar_service
        .add_participant(&session, event_id, request.profile_id)
        .await?;

    if let Some(event) = state.calendar_service.fetch_event(event_id).await? {
        notify_participant(&state.push_service, &event, participant.profile_id).await;
    }

    Ok((StatusCode::CREATED, Json(participant)))
}

async fn remove_participant(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path((event_id, profile_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state
        .calendar_service
        .remove_participant(&session, event_id, profile_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rsvp(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<RsvpRequest>,
) -> Result<Json<EventParticipant>, ServiceError> {
    let participant = state
        .calendar_service
        .rsvp(&session, event_id, request.status)
        .await?;

    // Tell the event creator about the response
    if let Some(event) = state.calendar_service.fetch_event(event_id).await? {
        let message = PushMessage {
            title: "RSVP update".to_string(),
            body: format!("{}: {}", event.title, request.status.as_str()),
            url: Some(format!("/calendar/events/{}", event.id)),
            tag: Some("rsvp".to_string()),
        };
        if let Err(err) = state
            .push_service
            .send_to_user(event.coach_id, &message, NotificationKind::RsvpUpdate)
            .await
        {
            tracing::warn!("Failed to push RSVP update: {}", err);
        }
    }

    Ok(Json(participant))
}

/// RFC 5545 export of the session's visible events
async fn export_ical(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let events = state
        .calendar_service
        .list_events(&session, query.from, query.to)
        .await?;
    let ics = IcalExporter::new().export(&events);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"coachboard.ics\"",
            ),
        ],
        ics,
    ))
}

async fn google_authorize(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<AuthorizeUrlResponse>, ServiceError> {
    let url = state
        .google_sync
        .authorize_url(&session, &session.user_id.to_string())?;
    Ok(Json(AuthorizeUrlResponse { url }))
}

async fn google_connect(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<GoogleConnectRequest>,
) -> Result<Json<GoogleAccount>, ServiceError> {
    Ok(Json(
        state.google_sync.connect(&session, &request.code).await?,
    ))
}

async fn google_sync_run(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<SyncReport>, ServiceError> {
    Ok(Json(state.google_sync.sync(&session).await?))
}

async fn google_disconnect(
    State(state): State<CalendarAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<StatusCode, ServiceError> {
    state.google_sync.disconnect(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notify_participant(push_service: &WebPushService, event: &CalendarEvent, profile_id: Uuid) {
    let message = PushMessage {
        title: event.title.clone(),
        body: format!("Scheduled for {}", event.starts_at.format("%Y-%m-%d %H:%M UTC")),
        url: Some(format!("/calendar/events/{}", event.id)),
        tag: Some("event".to_string()),
    };
    if let Err(err) = push_service
        .send_to_user(profile_id, &message, NotificationKind::EventReminder)
        .await
    {
        tracing::warn!("Failed to push event notification: {}", err);
    }
}
