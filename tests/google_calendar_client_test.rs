use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use coachboard::config::GoogleCalendarConfig;
use coachboard::services::{GoogleCalendarClient, SyncError};

fn test_config() -> GoogleCalendarConfig {
    GoogleCalendarConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        redirect_uri: "http://localhost:3000/calendar/google/callback".to_string(),
    }
}

fn client_for(server: &MockServer) -> GoogleCalendarClient {
    GoogleCalendarClient::with_base_urls(
        test_config(),
        format!("{}/token", server.uri()),
        format!("{}/calendar/v3", server.uri()),
    )
}

#[tokio::test]
async fn exchanges_authorization_code_for_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "expires_in": 3599,
            "refresh_token": "rt-1",
            "scope": "https://www.googleapis.com/auth/calendar",
            "token_type": "Bearer",
        })))
        .mount(&server)
        .await;

    let tokens = client_for(&server).exchange_code("auth-code-1").await.unwrap();

    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(tokens.expires_in, 3599);
}

#[tokio::test]
async fn refresh_omits_refresh_token_in_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/calendar",
            "token_type": "Bearer",
        })))
        .mount(&server)
        .await;

    let tokens = client_for(&server)
        .refresh_access_token("rt-1")
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "at-2");
    assert!(tokens.refresh_token.is_none());
}

#[tokio::test]
async fn lists_primary_calendar_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "remote-1",
                    "status": "confirmed",
                    "summary": "Club ride",
                    "start": { "dateTime": "2024-04-10T08:00:00Z" },
                    "end": { "dateTime": "2024-04-10T10:00:00Z" },
                    "updated": "2024-04-01T12:00:00Z",
                },
                {
                    "id": "remote-2",
                    "status": "cancelled",
                },
            ],
        })))
        .mount(&server)
        .await;

    let events = client_for(&server)
        .list_events(
            "at-1",
            chrono::Utc::now() - chrono::Duration::days(1),
            chrono::Utc::now() + chrono::Duration::days(30),
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "remote-1");
    assert_eq!(events[0].summary.as_deref(), Some("Club ride"));
    assert_eq!(events[1].status.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn surfaces_api_errors_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .list_events(
            "stale-token",
            chrono::Utc::now(),
            chrono::Utc::now() + chrono::Duration::days(1),
        )
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::Api { status: 401, .. });
}

#[tokio::test]
async fn delete_treats_missing_remote_event_as_success() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendar/v3/calendars/primary/events/remote-9"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let result = client_for(&server).delete_event("at-1", "remote-9").await;

    assert!(result.is_ok());
}

#[test]
fn authorization_url_carries_offline_access() {
    let client = GoogleCalendarClient::with_base_urls(
        test_config(),
        "http://unused/token".to_string(),
        "http://unused/api".to_string(),
    );

    let url = client.authorization_url("state-123");

    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=test-client"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("state=state-123"));
    assert!(url.contains(
        "scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar"
    ));
}
