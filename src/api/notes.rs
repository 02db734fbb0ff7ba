use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{coach_only_middleware, jwt_auth_middleware, AuthService, UserSession};
use crate::models::{CreateNoteRequest, Note, UpdateNoteRequest};
use crate::services::{NotesService, ServiceError};

#[derive(Debug, Deserialize)]
pub struct NoteQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Clone)]
pub struct NotesAppState {
    pub notes_service: NotesService,
}

pub fn notes_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = NotesAppState {
        notes_service: NotesService::new(db),
    };

    Router::new()
        .route("/", get(list_notes).post(create_note))
        .route(
            "/:note_id",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/athlete/:athlete_id", get(list_notes_for_athlete))
        // Notes are never visible to athletes
        .route_layer(middleware::from_fn(coach_only_middleware))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

async fn list_notes(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Query(query): Query<NoteQuery>,
) -> Result<Json<Vec<Note>>, ServiceError> {
    Ok(Json(
        state
            .notes_service
            .list_notes(&session, query.limit, query.offset)
            .await?,
    ))
}

async fn create_note(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<Note>), ServiceError> {
    let note = state.notes_service.create_note(&session, request).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Note>, ServiceError> {
    Ok(Json(state.notes_service.get_note(&session, note_id).await?))
}

async fn update_note(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Path(note_id): Path<Uuid>,
    Json(request): Json<UpdateNoteRequest>,
) -> Result<Json<Note>, ServiceError> {
    Ok(Json(
        state
            .notes_service
            .update_note(&session, note_id, request)
            .await?,
    ))
}

async fn delete_note(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Path(note_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.notes_service.delete_note(&session, note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_notes_for_athlete(
    State(state): State<NotesAppState>,
    Extension(session): Extension<UserSession>,
    Path(athlete_id): Path<Uuid>,
) -> Result<Json<Vec<Note>>, ServiceError> {
    Ok(Json(
        state
            .notes_service
            .list_notes_for_athlete(&session, athlete_id)
            .await?,
    ))
}
