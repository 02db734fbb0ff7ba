use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};

use crate::auth::{
    jwt_auth_middleware, super_admin_only_middleware, AuthService, UserSession,
};
use crate::models::{
    NotificationKind, NotificationPreferences, PushMessage, PushSubscription, SendNotificationRequest,
    SendOutcome, SubscribeRequest, UnsubscribeRequest, UpdatePreferencesRequest,
};
use crate::services::{ServiceError, WebPushService};

#[derive(Clone)]
pub struct NotificationsAppState {
    pub push_service: WebPushService,
}

pub fn notification_routes(auth_service: AuthService, push_service: WebPushService) -> Router {
    let state = NotificationsAppState { push_service };

    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/subscriptions", get(list_subscriptions))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/vapid-public-key", get(vapid_public_key))
        .route(
            "/send",
            post(send_notification).layer(middleware::from_fn(super_admin_only_middleware)),
        )
        .route_layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

async fn subscribe(
    State(state): State<NotificationsAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<PushSubscription>), ServiceError> {
    let subscription = state.push_service.subscribe(&session, request).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn unsubscribe(
    State(state): State<NotificationsAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<StatusCode, ServiceError> {
    state
        .push_service
        .unsubscribe(&session, &request.endpoint)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_subscriptions(
    State(state): State<NotificationsAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Vec<PushSubscription>>, ServiceError> {
    Ok(Json(state.push_service.list_subscriptions(&session).await?))
}

async fn get_preferences(
    State(state): State<NotificationsAppState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<NotificationPreferences>, ServiceError> {
    Ok(Json(state.push_service.get_preferences(&session).await?))
}

async fn update_preferences(
    State(state): State<NotificationsAppState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> Result<Json<NotificationPreferences>, ServiceError> {
    Ok(Json(
        state
            .push_service
            .update_preferences(&session, request)
            .await?,
    ))
}

async fn vapid_public_key(
    State(state): State<NotificationsAppState>,
) -> Json<Value> {
    Json(json!({ "public_key": state.push_service.vapid_public_key() }))
}

/// Bulk announcement to a set of profiles. Super admin only.
async fn send_notification(
    State(state): State<NotificationsAppState>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<Json<SendOutcome>, ServiceError> {
    let message = PushMessage {
        title: request.title,
        body: request.body,
        url: request.url,
        tag: None,
    };
    let outcome = state
        .push_service
        .broadcast(&request.profile_ids, &message, NotificationKind::Announcement)
        .await?;

    Ok(Json(outcome))
}
