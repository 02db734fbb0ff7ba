use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::models::{
    CreateRecommendationRequest, NotificationKind, PushMessage, Recommendation,
    UnreadCountResponse, UpdateRecommendationRequest,
};
use crate::services::{RecommendationsService, ServiceError, WebPushService};

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Clone)]
pub struct RecommendationsAppState {
    pub recommendations_service: RecommendationsService,
    pub push_service: WebPushService,
}

pub fn recommendation_routes(
    db: PgPool,
    auth_service: AuthService,
    push_service: WebPushService,
) -> Router {
    let state = RecommendationsAppState {
        recommendations_service: RecommendationsService::new(db),
        push_service,
    };

    Router::new()
        .route("/", get(list_recommendations).post(create_recommendation))
        .route("/unread-count", get(unread_count))
        .route(
            "/:rec_id",
            get(get_recommendation)
                .put(update_recommendation)
                .delete(delete_recommendation),
        )
        .route("/:rec_id/read", post(mark_read))
        .route("/:rec_id/unread", post(mark_unread))
        .route("/athlete/:athlete_id", get(list_for_athlete))
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

async fn list_recommendations(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Vec<Recommendation>>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .list_recommendations(&session, query.limit, query.offset)
            .await?,
    ))
}

async fn create_recommendation(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateRecommendationRequest>,
) -> Result<(StatusCode, Json<Recommendation>), ServiceError> {
    let recommendation = state
        .recommendations_service
        .create_recommendation(&session, request)
        .await?;

    // Notify the athlete; delivery failures never fail the create
    let message = PushMessage {
        title: "New recommendation".to_string(),
        body: recommendation.title.clone(),
        url: Some("/recommendations".to_string()),
        tag: Some("recommendation".to_string()),
    };
    if let Err(err) = state
        .push_service
        .send_to_user(
            recommendation.athlete_id,
            &message,
            NotificationKind::RecommendationAlert,
        )
        .await
    {
        tracing::warn!("Failed to push recommendation alert: {}", err);
    }

    Ok((StatusCode::CREATED, Json(recommendation)))
}

async fn get_recommendation(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(rec_id): Path<Uuid>,
) -> Result<Json<Recommendation>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .get_recommendation(&session, rec_id)
            .await?,
    ))
}

async fn update_recommendation(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(rec_id): Path<Uuid>,
    Json(request): Json<UpdateRecommendationRequest>,
) -> Result<Json<Recommendation>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .update_recommendation(&session, rec_id, request)
            .await?,
    ))
}

async fn delete_recommendation(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(rec_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .recommendations_service
        .delete_recommendation(&session, rec_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_read(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(rec_id): Path<Uuid>,
) -> Result<Json<Recommendation>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .mark_read(&session, rec_id)
            .await?,
    ))
}

async fn mark_unread(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(rec_id): Path<Uuid>,
) -> Result<Json<Recommendation>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .mark_unread(&session, rec_id)
            .await?,
    ))
}

async fn unread_count(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<UnreadCountResponse>, ServiceError> {
    let unread = state.recommendations_service.unread_count(&session).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

async fn list_for_athlete(
    State(state): State<RecommendationsAppState>,
    Extension(session): Extension<UserSession>,
    Path(athlete_id): Path<Uuid>,
) -> Result<Json<Vec<Recommendation>>, ServiceError> {
    Ok(Json(
        state
            .recommendations_service
            .list_for_athlete(&session, athlete_id)
            .await?,
    ))
}
