use anyhow::Result;
use axum::{http::header, response::IntoResponse, routing::get, Router};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use super::auth::auth_routes;
use super::calendar::calendar_routes;
use super::health::health_check;
use super::notes::notes_routes;
use super::notifications::notification_routes;
use super::profiles::profile_routes;
use super::recommendations::recommendation_routes;
use crate::auth::{middleware::cors_layer, AuthService};
use crate::config::{AppConfig, GoogleCalendarConfig, WebPushConfig};
use crate::services::{GoogleCalendarClient, GoogleSyncService, WebPushService};

pub fn create_routes(
    db: PgPool,
    config: &AppConfig,
    google_config: GoogleCalendarConfig,
    push_config: WebPushConfig,
) -> Result<Router> {
    let auth_service = AuthService::new(db.clone(), &config.jwt_secret);
    let google_client = GoogleCalendarClient::new(google_config)?;
    let google_sync = GoogleSyncService::new(db.clone(), google_client);
    let push_service = WebPushService::new(db.clone(), push_config);

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/sw.js", get(service_worker))
        .nest("/api/auth", auth_routes(auth_service.clone()))
        .nest(
            "/api/profiles",
            profile_routes(db.clone(), auth_service.clone()),
        )
        .nest("/api/notes", notes_routes(db.clone(), auth_service.clone()))
        .nest(
            "/api/recommendations",
            recommendation_routes(db.clone(), auth_service.clone(), push_service.clone()),
        )
        .nest(
            "/api/calendar",
            calendar_routes(db, auth_service.clone(), google_sync, push_service.clone()),
        )
        .nest(
            "/api/notifications",
            notification_routes(auth_service, push_service),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer()))
}

/// The push display and click-routing service worker
async fn service_worker() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../../static/sw.js"),
    )
}
