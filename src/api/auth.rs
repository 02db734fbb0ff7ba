use axum::{extract::State, routing::post, Json, Router};

use crate::auth::{
    AuthError, AuthResponse, AuthService, LoginRequest, LogoutRequest, MessageResponse,
    RefreshTokenRequest, RegisterRequest, TokenResponse,
};

pub fn auth_routes(auth_service: AuthService) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(auth_service)
}

async fn register(
    State(auth_service): State<AuthService>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    Ok(Json(auth_service.register(request).await?))
}

async fn login(
    State(auth_service): State<AuthService>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    Ok(Json(auth_service.login(request).await?))
}

async fn refresh(
    State(auth_service): State<AuthService>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    Ok(Json(auth_service.refresh_token(request).await?))
}

async fn logout(
    State(auth_service): State<AuthService>,
    Json(request): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    Ok(Json(auth_service.logout(request).await?))
}
