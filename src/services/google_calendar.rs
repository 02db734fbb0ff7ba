use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::UserSession;
use crate::config::GoogleCalendarConfig;
use crate::models::{CalendarEvent, GoogleAccount, SyncReport};
use crate::services::ServiceError;

const EVENT_COLUMNS: &str = "id, coach_id, title, description, location, starts_at, ends_at, \
                             all_day, google_event_id, google_synced_at, created_at, updated_at";

// Pull window around the sync instant
const SYNC_WINDOW_PAST_DAYS: i64 = 30;
const SYNC_WINDOW_FUTURE_DAYS: i64 = 365;

// Refresh when the stored token expires within this margin
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Google Calendar is not connected")]
    NotConnected,
    #[error("Google did not return a refresh token")]
    NoRefreshToken,
    #[error("Google API error: {status}")]
    Api { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Api { status: 401, .. })
    }
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected | SyncError::NoRefreshToken => {
                ServiceError::Conflict(err.to_string())
            }
            SyncError::Database(e) => ServiceError::Database(e),
            other => ServiceError::Other(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventPayload {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start: GoogleEventTime,
    pub end: GoogleEventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventList {
    items: Option<Vec<GoogleEvent>>,
    next_page_token: Option<String>,
}

/// Google Calendar REST client
///
/// Implements the OAuth 2.0 authorization-code flow and CRUD on the user's
/// primary calendar. Base URLs are injectable for tests.
#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    config: GoogleCalendarConfig,
    auth_base_url: String,
    token_url: String,
    api_base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(config: GoogleCalendarConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            auth_base_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
        })
    }

    /// Client pointed at alternate endpoints, used by tests and local stubs.
    pub fn with_base_urls(
        config: GoogleCalendarConfig,
        token_url: String,
        api_base_url: String,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            auth_base_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url,
            api_base_url,
        }
    }

    /// Offline-access consent URL
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("https://www.googleapis.com/auth/calendar"),
            urlencoding::encode(state),
        )
    }

    /// Exchange authorization code for a token pair
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokenResponse, SyncError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];

        let response = self.client.post(&self.token_url).form(&params).send().await?;
        Self::parse_json(response).await
    }

    /// Refresh an access token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<GoogleTokenResponse, SyncError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ];

        let response = self.client.post(&self.token_url).form(&params).send().await?;
        Self::parse_json(response).await
    }

    pub async fn insert_event(
        &self,
        access_token: &str,
        payload: &GoogleEventPayload,
    ) -> Result<GoogleEvent, SyncError> {
        let response = self
            .client
            .post(format!("{}/calendars/primary/events", self.api_base_url))
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        payload: &GoogleEventPayload,
    ) -> Result<GoogleEvent, SyncError> {
        let response = self
            .client
            .put(format!(
                "{}/calendars/primary/events/{}",
                self.api_base_url, event_id
            ))
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(format!(
                "{}/calendars/primary/events/{}",
                self.api_base_url, event_id
            ))
            .bearer_auth(access_token)
            .send()
            .await?;

        // Already-gone events are fine for delete
        if response.status().is_success()
            || response.status() == StatusCode::NOT_FOUND
            || response.status() == StatusCode::GONE
        {
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    /// List primary-calendar events in a window, following pagination.
    pub async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleEvent>, SyncError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/calendars/primary/events", self.api_base_url))
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", time_min.to_rfc3339()),
                    ("timeMax", time_max.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("maxResults", "250".to_string()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            let page: GoogleEventList = Self::parse_json(response).await?;

            events.extend(page.items.unwrap_or_default());
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, SyncError> {
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn api_error(response: reqwest::Response) -> SyncError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("Google Calendar API error: {} - {}", status, body);
        SyncError::Api { status, body }
    }
}

/// Bidirectional sync between local events and the connected account's
/// primary Google calendar. Calls are sequential; item failures are counted
/// and reported, never fatal.
#[derive(Clone)]
pub struct GoogleSyncService {
    db: PgPool,
    client: GoogleCalendarClient,
}

impl GoogleSyncService {
    pub fn new(db: PgPool, client: GoogleCalendarClient) -> Self {
        Self { db, client }
    }

    pub fn authorize_url(&self, session: &UserSession, state: &str) -> Result<String, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }
        Ok(self.client.authorization_url(state))
    }

    /// Exchange the OAuth code and store the account tokens.
    pub async fn connect(
        &self,
        session: &UserSession,
        code: &str,
    ) -> Result<GoogleAccount, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let tokens = self.client.exchange_code(code).await?;
        let existing = self.get_account(session.user_id).await?;
        if tokens.refresh_token.is_none() && existing.is_none() {
            return Err(SyncError::NoRefreshToken.into());
        }

        let now = Utc::now();
        let account = sqlx::query_as::<_, GoogleAccount>(
            "INSERT INTO google_accounts
                 (user_id, access_token, refresh_token, expires_at, scope, connected_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             ON CONFLICT (user_id) DO UPDATE
             SET access_token = EXCLUDED.access_token,
                 refresh_token = COALESCE($7, google_accounts.refresh_token),
                 expires_at = EXCLUDED.expires_at,
                 scope = EXCLUDED.scope,
                 updated_at = EXCLUDED.updated_at
             RETURNING user_id, access_token, refresh_token, expires_at, scope, connected_at, updated_at",
        )
        .bind(session.user_id)
        .bind(&tokens.access_token)
        .bind(tokens.refresh_token.clone().unwrap_or_default())
        .bind(now + Duration::seconds(tokens.expires_in))
        .bind(tokens.scope.clone().unwrap_or_default())
        .bind(now)
        .bind(tokens.refresh_token)
        .fetch_one(&self.db)
        .await
        .map_err(SyncError::Database)?;

        info!("Google Calendar connected for user {}", session.user_id);
        Ok(account)
    }

    pub async fn disconnect(&self, session: &UserSession) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM google_accounts WHERE user_id = $1")
            .bind(session.user_id)
            .execute(&self.db)
            .await
            .map_err(SyncError::Database)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotConnected.into());
        }
        Ok(())
    }

    /// Run one bidirectional sync pass for the session coach.
    pub async fn sync(&self, session: &UserSession) -> Result<SyncReport, ServiceError> {
        if !session.is_coach() {
            return Err(ServiceError::Forbidden);
        }

        let account = self
            .get_account(session.user_id)
            .await?
            .ok_or(SyncError::NotConnected)?;
        let mut access_token = self.ensure_fresh_token(&account).await?;

        let now = Utc::now();
        let window_start = now - Duration::days(SYNC_WINDOW_PAST_DAYS);
        let window_end = now + Duration::days(SYNC_WINDOW_FUTURE_DAYS);

        let mut report = SyncReport::default();

        self.push_local_events(session.user_id, &account, &mut access_token, window_start, window_end, &mut report)
            .await?;
        self.pull_remote_events(session.user_id, &account, &mut access_token, window_start, window_end, &mut report)
            .await?;

        info!(
            "Google sync for {}: pushed={} updated={} pulled={} deleted={} failed={}",
            session.user_id, report.pushed, report.updated, report.pulled, report.deleted, report.failed
        );
        Ok(report)
    }

    async fn push_local_events(
        &self,
        coach_id: Uuid,
        account: &GoogleAccount,
        access_token: &mut String,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), ServiceError> {
        let events = sqlx::query_as::<_, CalendarEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events
             WHERE coach_id = $1 AND starts_at < $3 AND ends_at > $2
             ORDER BY starts_at"
        ))
        .bind(coach_id)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(&self.db)
        .await
        .map_err(SyncError::Database)?;

        for event in events {
            let payload = payload_for(&event);
            let outcome = match &event.google_event_id {
                None => {
                    let mut result = self.client.insert_event(access_token, &payload).await;
                    if matches!(&result, Err(e) if e.is_unauthorized()) {
                        *access_token = self.refresh_and_store(account).await?;
                        result = self.client.insert_event(access_token, &payload).await;
                    }
                    result.map(|remote| (remote.id, true))
                }
                Some(remote_id) => {
                    // Only push events edited since the last sync
                    if event
                        .google_synced_at
                        .map_or(false, |synced| event.updated_at <= synced)
                    {
                        continue;
                    }
                    let mut result = self
                        .client
                        .update_event(access_token, remote_id, &payload)
                        .await;
                    if matches!(&result, Err(e) if e.is_unauthorized()) {
                        *access_token = self.refresh_and_store(account).await?;
                        result = self
                            .client
                            .update_event(access_token, remote_id, &payload)
                            .await;
                    }
                    result.map(|remote| (remote.id, false))
                }
            };

            match outcome {
                Ok((remote_id, inserted)) => {
                    sqlx::query(
                        "UPDATE calendar_events
                         SET google_event_id = $2, google_synced_at = $3
                         WHERE id = $1",
                    )
                    .bind(event.id)
                    .bind(&remote_id)
                    .bind(Utc::now())
                    .execute(&self.db)
                    .await
                    .map_err(SyncError::Database)?;

                    if inserted {
                        report.pushed += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                Err(err) => {
                    warn!("Failed to push event {}: {}", event.id, err);
                    report.failed += 1;
                    report.errors.push(format!("push {}: {}", event.id, err));
                }
            }
        }

        Ok(())
    }

    async fn pull_remote_events(
        &self,
        coach_id: Uuid,
        account: &GoogleAccount,
        access_token: &mut String,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<(), ServiceError> {
        let mut listing = self
            .client
            .list_events(access_token, window_start, window_end)
            .await;
        if matches!(&listing, Err(e) if e.is_unauthorized()) {
            *access_token = self.refresh_and_store(account).await?;
            listing = self
                .client
                .list_events(access_token, window_start, window_end)
                .await;
        }

        let remote_events = match listing {
            Ok(events) => events,
            Err(err) => {
                warn!("Failed to list Google events: {}", err);
                report.failed += 1;
                report.errors.push(format!("pull: {err}"));
                return Ok(());
            }
        };

        for remote in remote_events {
            if let Err(err) = self.apply_remote_event(coach_id, &remote, report).await {
                warn!("Failed to apply Google event {}: {}", remote.id, err);
                report.failed += 1;
                report.errors.push(format!("apply {}: {}", remote.id, err));
            }
        }

        Ok(())
    }

    async fn apply_remote_event(
        &self,
        coach_id: Uuid,
        remote: &GoogleEvent,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if remote.status.as_deref() == Some("cancelled") {
            let result = sqlx::query("DELETE FROM calendar_events WHERE google_event_id = $1")
                .bind(&remote.id)
                .execute(&self.db)
                .await?;
            if result.rows_affected() > 0 {
                report.deleted += 1;
            }
            return Ok(());
        }

        let Some((starts_at, ends_at, all_day)) = remote_window(remote) else {
            // Events without a resolvable window are skipped
            return Ok(());
        };

        let local: Option<CalendarEvent> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM calendar_events WHERE google_event_id = $1"
        ))
        .bind(&remote.id)
        .fetch_optional(&self.db)
        .await?;

        let title = remote
            .summary
            .clone()
            .unwrap_or_else(|| "(untitled)".to_string());
        let now = Utc::now();

        match local {
            None => {
                sqlx::query(
                    "INSERT INTO calendar_events
                         (id, coach_id, title, description, location, starts_at, ends_at,
                          all_day, google_event_id, google_synced_at, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $10)",
                )
                .bind(Uuid::new_v4())
                .bind(coach_id)
                .bind(&title)
                .bind(&remote.description)
                .bind(&remote.location)
                .bind(starts_at)
                .bind(ends_at)
                .bind(all_day)
                .bind(&remote.id)
                .bind(now)
                .execute(&self.db)
                .await?;
                report.pulled += 1;
            }
            Some(local) => {
                // Remote wins only when Google saw an edit after our last sync
                let remote_newer = match (remote.updated, local.google_synced_at) {
                    (Some(updated), Some(synced)) => updated > synced,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if !remote_newer {
                    return Ok(());
                }

                sqlx::query(
                    "UPDATE calendar_events
                     SET title = $2, description = $3, location = $4,
                         starts_at = $5, ends_at = $6, all_day = $7,
                         google_synced_at = $8, updated_at = $8
                     WHERE id = $1",
                )
                .bind(local.id)
                .bind(&title)
                .bind(&remote.description)
                .bind(&remote.location)
                .bind(starts_at)
                .bind(ends_at)
                .bind(all_day)
                .bind(now)
                .execute(&self.db)
                .await?;
                report.updated += 1;
            }
        }

        Ok(())
    }

    /// Best-effort removal of a local event's Google mirror, used when the
    /// local event is deleted. Failures are logged, never surfaced.
    pub async fn delete_remote(
        &self,
        session: &UserSession,
        event: &CalendarEvent,
    ) -> Result<(), ServiceError> {
        let Some(remote_id) = &event.google_event_id else {
            return Ok(());
        };
        let Some(account) = self.get_account(session.user_id).await? else {
            return Ok(());
        };

        let token = self.ensure_fresh_token(&account).await?;
        if let Err(err) = self.client.delete_event(&token, remote_id).await {
            warn!("Failed to delete Google event {}: {}", remote_id, err);
        }
        Ok(())
    }

    async fn get_account(&self, user_id: Uuid) -> Result<Option<GoogleAccount>, ServiceError> {
        let account = sqlx::query_as::<_, GoogleAccount>(
            "SELECT user_id, access_token, refresh_token, expires_at, scope, connected_at, updated_at
             FROM google_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(SyncError::Database)?;

        Ok(account)
    }

    /// Refresh the stored token when it expires within the margin.
    async fn ensure_fresh_token(&self, account: &GoogleAccount) -> Result<String, ServiceError> {
        if account.expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) {
            return Ok(account.access_token.clone());
        }
        Ok(self.refresh_and_store(account).await?)
    }

    async fn refresh_and_store(&self, account: &GoogleAccount) -> Result<String, SyncError> {
        let tokens = self
            .client
            .refresh_access_token(&account.refresh_token)
            .await?;

        sqlx::query(
            "UPDATE google_accounts
             SET access_token = $2, expires_at = $3, updated_at = $4
             WHERE user_id = $1",
        )
        .bind(account.user_id)
        .bind(&tokens.access_token)
        .bind(Utc::now() + Duration::seconds(tokens.expires_in))
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(tokens.access_token)
    }
}

fn payload_for(event: &CalendarEvent) -> GoogleEventPayload {
    let (start, end) = if event.all_day {
        let start_date = event.starts_at.date_naive();
        let mut end_date = event.ends_at.date_naive();
        if end_date <= start_date {
            end_date = start_date + Duration::days(1);
        }
        (
            GoogleEventTime {
                date: Some(start_date),
                ..Default::default()
            },
            GoogleEventTime {
                date: Some(end_date),
                ..Default::default()
            },
        )
    } else {
        (
            GoogleEventTime {
                date_time: Some(event.starts_at),
                ..Default::default()
            },
            GoogleEventTime {
                date_time: Some(event.ends_at),
                ..Default::default()
            },
        )
    };

    GoogleEventPayload {
        summary: event.title.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start,
        end,
    }
}

/// Resolve a remote event's window. Returns (starts_at, ends_at, all_day).
fn remote_window(remote: &GoogleEvent) -> Option<(DateTime<Utc>, DateTime<Utc>, bool)> {
    let start = remote.start.as_ref()?;
    let end = remote.end.as_ref()?;

    if let (Some(start_at), Some(end_at)) = (start.date_time, end.date_time) {
        if end_at > start_at {
            return Some((start_at, end_at, false));
        }
        return None;
    }

    if let (Some(start_date), Some(end_date)) = (start.date, end.date) {
        let starts_at = start_date.and_hms_opt(0, 0, 0)?.and_utc();
        let mut ends_at = end_date.and_hms_opt(0, 0, 0)?.and_utc();
        if ends_at <= starts_at {
            ends_at = starts_at + Duration::days(1);
        }
        return Some((starts_at, ends_at, true));
    }

    None
}
