use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::auth::{
    AuthError, AuthResponse, JwtService, LoginRequest, LogoutRequest, MessageResponse,
    RefreshTokenRequest, RegisterRequest, TokenResponse, UserInfo, UserSession,
};
use crate::models::{CoachLevel, Profile, Role};

/// User row used for authentication
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    jwt_service: JwtService,
    db: PgPool,
}

impl AuthService {
    pub fn new(db: PgPool, jwt_secret: &str) -> Self {
        Self {
            jwt_service: JwtService::new(jwt_secret),
            db,
        }
    }

    /// Register a new user together with its profile
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self.get_user_by_email(&request.email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        validate_password(&request.password)
            .map_err(|e| AuthError::PasswordValidation(e.to_string()))?;
        let password_hash = hash_password(&request.password)?;

        let role = request.role.unwrap_or(Role::Athlete);
        // coach_level is only meaningful for coaches
        let coach_level = match role {
            Role::Coach => Some(request.coach_level.unwrap_or(CoachLevel::Junior)),
            Role::Athlete => None,
        };

        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING id, email, password_hash, created_at, updated_at",
        )
        .bind(user_id)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, role, coach_level, full_name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, role, coach_level, full_name, coach_id, supervisor_id, created_at, updated_at",
        )
        .bind(user.id)
        .bind(role)
        .bind(coach_level)
        .bind(&request.full_name)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let (access_token, refresh_token) =
            self.jwt_service
                .create_token_pair(user.id, &user.email, role, coach_level)?;
        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
            user: UserInfo {
                id: user.id,
                email: user.email,
                role,
                coach_level,
                full_name: profile.full_name,
                created_at: user.created_at,
                updated_at: user.updated_at,
            },
        })
    }

    /// Login user
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let user = self
            .get_user_by_email(&request.email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let profile = self.get_profile(user.id).await?;

        let (access_token, refresh_token) = self.jwt_service.create_token_pair(
            user.id,
            &user.email,
            profile.role,
            profile.coach_level,
        )?;
        self.store_refresh_token(user.id, &refresh_token).await?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
            user: UserInfo {
                id: user.id,
                email: user.email,
                role: profile.role,
                coach_level: profile.coach_level,
                full_name: profile.full_name,
                created_at: user.created_at,
                updated_at: user.updated_at,
            },
        })
    }

    /// Issue a fresh access token for a valid stored refresh token
    pub async fn refresh_token(
        &self,
        request: RefreshTokenRequest,
    ) -> Result<TokenResponse, AuthError> {
        let claims = self.jwt_service.validate_token(&request.refresh_token)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        if !self
            .is_refresh_token_valid(user_id, &request.refresh_token)
            .await?
        {
            return Err(AuthError::InvalidToken);
        }

        let access_token = self.jwt_service.create_access_token(
            user_id,
            &claims.email,
            claims.role,
            claims.coach_level,
        )?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_service.access_token_expires_in_seconds(),
        })
    }

    /// Logout: revoke the presented refresh token
    pub async fn logout(&self, request: LogoutRequest) -> Result<MessageResponse, AuthError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(&request.refresh_token)
            .execute(&self.db)
            .await?;

        Ok(MessageResponse {
            message: "Logged out".to_string(),
        })
    }

    /// Validate an access token into a session (used by the middleware)
    pub fn validate_session(&self, token: &str) -> Result<UserSession, AuthError> {
        self.jwt_service.extract_user_session(token)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, AuthError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, role, coach_level, full_name, coach_id, supervisor_id, created_at, updated_at
             FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        profile.ok_or(AuthError::UserNotFound)
    }

    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> Result<(), AuthError> {
        let now = Utc::now();
        let expires_at = now + self.jwt_service.refresh_token_expires_in();

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn is_refresh_token_valid(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<bool, AuthError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM refresh_tokens
             WHERE user_id = $1 AND token = $2 AND expires_at > $3",
        )
        .bind(user_id)
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.is_some())
    }
}
