use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::models::{AssignAthleteRequest, Profile, UpdateProfileRequest};
use crate::services::{ProfilesService, ServiceError};

#[derive(Clone)]
pub struct ProfilesAppState {
    pub profiles_service: ProfilesService,
}

pub fn profile_routes(db: PgPool, auth_service: AuthService) -> Router {
    let state = ProfilesAppState {
        profiles_service: ProfilesService::new(db),
    };

    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/athletes", get(list_athletes))
        .route("/coaches", get(list_coaches))
        .route("/athletes/:athlete_id/assign", post(assign_athlete))
        .route("/:profile_id", get(get_profile))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

async fn get_me(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Profile>, ServiceError> {
    Ok(Json(state.profiles_service.get_own_profile(&session).await?))
}

async fn update_me(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ServiceError> {
    Ok(Json(
        state
            .profiles_service
            .update_own_profile(&session, request)
            .await?,
    ))
}

async fn get_profile(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Profile>, ServiceError> {
    Ok(Json(
        state
            .profiles_service
            .get_profile(&session, profile_id)
            .await?,
    ))
}

/// Roster of athletes visible to the session coach
async fn list_athletes(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Vec<Profile>>, ServiceError> {
    Ok(Json(state.profiles_service.list_athletes(&session).await?))
}

async fn list_coaches(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Vec<Profile>>, ServiceError> {
    Ok(Json(state.profiles_service.list_coaches(&session).await?))
}

async fn assign_athlete(
    State(state): State<ProfilesAppState>,
    Extension(session): Extension<UserSession>,
    Path(athlete_id): Path<Uuid>,
    Json(request): Json<AssignAthleteRequest>,
) -> Result<Json<Profile>, ServiceError> {
    Ok(Json(
        state
            .profiles_service
            .assign_athlete(&session, athlete_id, request.coach_id)
            .await?,
    ))
}
