use anyhow::Result;
use std::env;

/// Google Calendar OAuth application credentials.
#[derive(Debug, Clone)]
pub struct GoogleCalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl GoogleCalendarConfig {
    pub fn from_env() -> Result<Self> {
        Ok(GoogleCalendarConfig {
            client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: env::var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:3000/calendar/google/callback".to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// VAPID key pair identifying this server to push services.
///
/// Keys are base64url-encoded: the private key as a 32-byte P-256 scalar,
/// the public key as a 65-byte uncompressed point.
#[derive(Debug, Clone)]
pub struct WebPushConfig {
    pub vapid_public_key: String,
    pub vapid_private_key: String,
    pub vapid_subject: String,
}

impl WebPushConfig {
    pub fn from_env() -> Result<Self> {
        Ok(WebPushConfig {
            vapid_public_key: env::var("VAPID_PUBLIC_KEY").unwrap_or_default(),
            vapid_private_key: env::var("VAPID_PRIVATE_KEY").unwrap_or_default(),
            vapid_subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:admin@coachboard.local".to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.vapid_public_key.is_empty() && !self.vapid_private_key.is_empty()
    }
}
