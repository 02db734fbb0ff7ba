use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use reqwest::StatusCode;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM};
use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, ECDH_P256};
use ring::hkdf::{self, HKDF_SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::UserSession;
use crate::config::WebPushConfig;
use crate::models::{
    NotificationKind, NotificationPreferences, PushMessage, PushSubscription, SendOutcome,
    SubscribeRequest, UpdatePreferencesRequest,
};
use crate::services::ServiceError;

// aes128gcm record size advertised in the content-coding header
const RECORD_SIZE: u32 = 4096;
const PUSH_TTL_SECS: u32 = 86_400;
const VAPID_EXPIRY_SECS: i64 = 12 * 60 * 60;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Web Push is not configured")]
    NotConfigured,
    #[error("Invalid subscription key: {0}")]
    InvalidKey(String),
    #[error("Push encryption failed: {0}")]
    Crypto(String),
    #[error("Push delivery failed: {0}")]
    Delivery(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<PushError> for ServiceError {
    fn from(err: PushError) -> Self {
        match err {
            PushError::NotConfigured => ServiceError::Conflict(err.to_string()),
            PushError::InvalidKey(_) => ServiceError::Invalid(err.to_string()),
            PushError::Database(e) => ServiceError::Database(e),
            other => ServiceError::Other(anyhow::Error::new(other)),
        }
    }
}

/// Web Push delivery: subscription storage, per-user preferences, and
/// VAPID-signed, aes128gcm-encrypted sends to browser push services.
#[derive(Clone)]
pub struct WebPushService {
    db: PgPool,
    client: reqwest::Client,
    config: WebPushConfig,
}

impl WebPushService {
    pub fn new(db: PgPool, config: WebPushConfig) -> Self {
        Self {
            db,
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn vapid_public_key(&self) -> &str {
        &self.config.vapid_public_key
    }

    /// Store (or refresh) a browser subscription, keyed by endpoint.
    pub async fn subscribe(
        &self,
        session: &UserSession,
        request: SubscribeRequest,
    ) -> Result<PushSubscription, ServiceError> {
        let subscription = sqlx::query_as::<_, PushSubscription>(
            "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, user_agent, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (endpoint) DO UPDATE
             SET user_id = EXCLUDED.user_id,
                 p256dh = EXCLUDED.p256dh,
                 auth = EXCLUDED.auth,
                 user_agent = EXCLUDED.user_agent
             RETURNING id, user_id, endpoint, p256dh, auth, user_agent, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session.user_id)
        .bind(&request.endpoint)
        .bind(&request.keys.p256dh)
        .bind(&request.keys.auth)
        .bind(&request.user_agent)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(subscription)
    }

    pub async fn unsubscribe(
        &self,
        session: &UserSession,
        endpoint: &str,
    ) -> Result<(), ServiceError> {
        let result =
            sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
                .bind(session.user_id)
                .bind(endpoint)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    pub async fn list_subscriptions(
        &self,
        session: &UserSession,
    ) -> Result<Vec<PushSubscription>, ServiceError> {
        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            "SELECT id, user_id, endpoint, p256dh, auth, user_agent, created_at
             FROM push_subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(session.user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(subscriptions)
    }

    /// Preferences row, created with defaults on first read.
    pub async fn get_preferences(
        &self,
        session: &UserSession,
    ) -> Result<NotificationPreferences, ServiceError> {
        self.preferences_for(session.user_id).await
    }

    pub async fn update_preferences(
        &self,
        session: &UserSession,
        request: UpdatePreferencesRequest,
    ) -> Result<NotificationPreferences, ServiceError> {
        // Make sure the row exists before the partial update
        self.preferences_for(session.user_id).await?;

        let preferences = sqlx::query_as::<_, NotificationPreferences>(
            "UPDATE notification_preferences
             SET push_enabled = COALESCE($2, push_enabled),
                 event_reminders = COALESCE($3, event_reminders),
                 recommendation_alerts = COALESCE($4, recommendation_alerts),
                 rsvp_updates = COALESCE($5, rsvp_updates),
                 updated_at = $6
             WHERE user_id = $1
             RETURNING user_id, push_enabled, event_reminders, recommendation_alerts, rsvp_updates, updated_at",
        )
        .bind(session.user_id)
        .bind(request.push_enabled)
        .bind(request.event_reminders)
        .bind(request.recommendation_alerts)
        .bind(request.rsvp_updates)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(preferences)
    }

    /// Send one message to all of a user's subscriptions, honoring their
    /// preferences. Dead endpoints (404/410) are pruned. Never errors on
    /// individual delivery failures.
    pub async fn send_to_user(
        &self,
        user_id: Uuid,
        message: &PushMessage,
        kind: NotificationKind,
    ) -> Result<SendOutcome, ServiceError> {
        let mut outcome = SendOutcome::default();

        if !self.config.is_configured() {
            warn!("Web Push not configured; dropping notification for {}", user_id);
            return Ok(outcome);
        }

        let preferences = self.preferences_for(user_id).await?;
        if !kind_enabled(&preferences, kind) {
            return Ok(outcome);
        }

        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            "SELECT id, user_id, endpoint, p256dh, auth, user_agent, created_at
             FROM push_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        let payload = serde_json::to_vec(message).map_err(|e| {
            ServiceError::Other(anyhow::anyhow!("Failed to encode push payload: {e}"))
        })?;

        for subscription in subscriptions {
            match self.deliver(&subscription, &payload).await {
                Ok(Delivery::Sent) => outcome.sent += 1,
                Ok(Delivery::Expired) => {
                    sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
                        .bind(subscription.id)
                        .execute(&self.db)
                        .await?;
                    outcome.pruned += 1;
                }
                Err(err) => {
                    warn!(
                        "Push delivery to {} failed: {}",
                        subscription.endpoint, err
                    );
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Bulk send returning aggregate counts.
    pub async fn broadcast(
        &self,
        profile_ids: &[Uuid],
        message: &PushMessage,
        kind: NotificationKind,
    ) -> Result<SendOutcome, ServiceError> {
        if !self.config.is_configured() {
            return Err(PushError::NotConfigured.into());
        }

        let mut outcome = SendOutcome::default();
        for profile_id in profile_ids {
            let one = self.send_to_user(*profile_id, message, kind).await?;
            outcome.sent += one.sent;
            outcome.failed += one.failed;
            outcome.pruned += one.pruned;
        }

        info!(
            "Broadcast to {} users: sent={} failed={} pruned={}",
            profile_ids.len(),
            outcome.sent,
            outcome.failed,
            outcome.pruned
        );
        Ok(outcome)
    }

    async fn preferences_for(
        &self,
        user_id: Uuid,
    ) -> Result<NotificationPreferences, ServiceError> {
        let preferences = sqlx::query_as::<_, NotificationPreferences>(
            "INSERT INTO notification_preferences (user_id, updated_at)
             VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING user_id, push_enabled, event_reminders, recommendation_alerts, rsvp_updates, updated_at",
        )
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(preferences)
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<Delivery, PushError> {
        let body = encrypt_payload(&subscription.p256dh, &subscription.auth, payload)?;
        let authorization = self.vapid_auth_header(&subscription.endpoint)?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("Authorization", authorization)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("TTL", PUSH_TTL_SECS.to_string())
            .header("Urgency", "normal")
            .body(body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Delivery::Sent),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(Delivery::Expired),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PushError::Delivery(format!(
                    "push service returned {status}: {body}"
                )))
            }
        }
    }

    /// Build the `vapid t=...,k=...` authorization header for one endpoint
    /// origin (RFC 8292).
    fn vapid_auth_header(&self, endpoint: &str) -> Result<String, PushError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| PushError::InvalidKey(format!("bad endpoint: {e}")))?;
        let audience = url.origin().ascii_serialization();

        let private_key = decode_b64(&self.config.vapid_private_key)
            .map_err(|e| PushError::InvalidKey(format!("VAPID private key: {e}")))?;
        let public_key = decode_b64(&self.config.vapid_public_key)
            .map_err(|e| PushError::InvalidKey(format!("VAPID public key: {e}")))?;

        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_private_key_and_public_key(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            &private_key,
            &public_key,
            &rng,
        )
        .map_err(|e| PushError::InvalidKey(format!("VAPID key pair rejected: {e}")))?;

        let header = URL_SAFE_NO_PAD.encode(
            json!({
                "typ": "JWT",
                "alg": "ES256",
            })
            .to_string(),
        );
        let claims = URL_SAFE_NO_PAD.encode(
            json!({
                "aud": audience,
                "exp": Utc::now().timestamp() + VAPID_EXPIRY_SECS,
                "sub": self.config.vapid_subject,
            })
            .to_string(),
        );

        let signing_input = format!("{header}.{claims}");
        let signature = key_pair
            .sign(&rng, signing_input.as_bytes())
            .map_err(|_| PushError::Crypto("VAPID signing failed".to_string()))?;
        let token = format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.as_ref())
        );

        Ok(format!(
            "vapid t={token}, k={}",
            self.config.vapid_public_key
        ))
    }
}

enum Delivery {
    Sent,
    Expired,
}

fn kind_enabled(preferences: &NotificationPreferences, kind: NotificationKind) -> bool {
    if !preferences.push_enabled {
        return false;
    }
    match kind {
        NotificationKind::EventReminder => preferences.event_reminders,
        NotificationKind::RecommendationAlert => preferences.recommendation_alerts,
        NotificationKind::RsvpUpdate => preferences.rsvp_updates,
        NotificationKind::Announcement => true,
    }
}

/// aes128gcm content coding per RFC 8291: ECDH over P-256 with the
/// subscription keys, HKDF-SHA256 key derivation, a single AES-128-GCM
/// record carrying the whole payload.
fn encrypt_payload(
    p256dh_b64: &str,
    auth_b64: &str,
    plaintext: &[u8],
) -> Result<Vec<u8>, PushError> {
    let ua_public = decode_b64(p256dh_b64)
        .map_err(|e| PushError::InvalidKey(format!("p256dh: {e}")))?;
    let auth_secret =
        decode_b64(auth_b64).map_err(|e| PushError::InvalidKey(format!("auth: {e}")))?;
    if ua_public.len() != 65 {
        return Err(PushError::InvalidKey(format!(
            "p256dh must be a 65-byte uncompressed point, got {}",
            ua_public.len()
        )));
    }
    if auth_secret.len() != 16 {
        return Err(PushError::InvalidKey(format!(
            "auth must be 16 bytes, got {}",
            auth_secret.len()
        )));
    }

    let rng = SystemRandom::new();

    let ephemeral = EphemeralPrivateKey::generate(&ECDH_P256, &rng)
        .map_err(|_| PushError::Crypto("keygen failed".to_string()))?;
    let as_public = ephemeral
        .compute_public_key()
        .map_err(|_| PushError::Crypto("public key derivation failed".to_string()))?;
    let as_public = as_public.as_ref().to_vec();

    let peer = UnparsedPublicKey::new(&ECDH_P256, ua_public.clone());
    let shared_secret = agree_ephemeral(ephemeral, &peer, |secret| secret.to_vec())
        .map_err(|_| PushError::Crypto("ECDH agreement failed".to_string()))?;

    let mut salt = [0u8; 16];
    rng.fill(&mut salt)
        .map_err(|_| PushError::Crypto("salt generation failed".to_string()))?;

    // IKM = HKDF(auth_secret, ecdh_secret, "WebPush: info" || 0x00 || ua_public || as_public)
    let mut key_info = Vec::with_capacity(14 + 1 + 65 + 65);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(&ua_public);
    key_info.extend_from_slice(&as_public);
    let ikm = hkdf_derive(&auth_secret, &shared_secret, &key_info, 32)?;

    let cek = hkdf_derive(&salt, &ikm, b"Content-Encoding: aes128gcm\0", 16)?;
    let nonce = hkdf_derive(&salt, &ikm, b"Content-Encoding: nonce\0", 12)?;

    // Single record: payload || 0x02 delimiter, then the GCM tag
    let mut record = Vec::with_capacity(plaintext.len() + 1 + 16);
    record.extend_from_slice(plaintext);
    record.push(0x02);

    let unbound = UnboundKey::new(&AES_128_GCM, &cek)
        .map_err(|_| PushError::Crypto("bad content key".to_string()))?;
    let key = LessSafeKey::new(unbound);
    let nonce = Nonce::try_assume_unique_for_key(&nonce)
        .map_err(|_| PushError::Crypto("bad nonce".to_string()))?;
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut record)
        .map_err(|_| PushError::Crypto("encryption failed".to_string()))?;

    // Header: salt(16) || record size(4, BE) || key id length(1) || as_public(65)
    let mut body = Vec::with_capacity(16 + 4 + 1 + 65 + record.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(as_public.len() as u8);
    body.extend_from_slice(&as_public);
    body.extend_from_slice(&record);

    Ok(body)
}

fn hkdf_derive(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, PushError> {
    struct OutLen(usize);
    impl hkdf::KeyType for OutLen {
        fn len(&self) -> usize {
            self.0
        }
    }

    let prk = hkdf::Salt::new(HKDF_SHA256, salt).extract(ikm);
    let info_arr = [info];
    let okm = prk
        .expand(&info_arr, OutLen(len))
        .map_err(|_| PushError::Crypto("HKDF expand failed".to_string()))?;
    let mut out = vec![0u8; len];
    okm.fill(&mut out)
        .map_err(|_| PushError::Crypto("HKDF fill failed".to_string()))?;
    Ok(out)
}

/// Subscription keys arrive base64url-unpadded from browsers, but some
/// clients send standard base64.
fn decode_b64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .or_else(|_| STANDARD.decode(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subscription_keys() -> (String, String) {
        // A real browser key pair shape: any valid P-256 point works
        let rng = SystemRandom::new();
        let private = EphemeralPrivateKey::generate(&ECDH_P256, &rng).unwrap();
        let public = private.compute_public_key().unwrap();

        let mut auth = [0u8; 16];
        rng.fill(&mut auth).unwrap();

        (
            URL_SAFE_NO_PAD.encode(public.as_ref()),
            URL_SAFE_NO_PAD.encode(auth),
        )
    }

    #[test]
    fn encrypted_body_has_aes128gcm_layout() {
        let (p256dh, auth) = test_subscription_keys();
        let payload = br#"{"title":"Session","body":"Tomorrow 9am"}"#;

        let body = encrypt_payload(&p256dh, &auth, payload).unwrap();

        // salt(16) + rs(4) + idlen(1) + key(65) + payload + delimiter + tag(16)
        assert_eq!(body.len(), 16 + 4 + 1 + 65 + payload.len() + 1 + 16);
        assert_eq!(&body[16..20], &RECORD_SIZE.to_be_bytes());
        assert_eq!(body[20], 65);
        // uncompressed point marker on the sender public key
        assert_eq!(body[21], 0x04);
    }

    #[test]
    fn encryption_salts_are_unique_per_message() {
        let (p256dh, auth) = test_subscription_keys();
        let a = encrypt_payload(&p256dh, &auth, b"hello").unwrap();
        let b = encrypt_payload(&p256dh, &auth, b"hello").unwrap();
        assert_ne!(a[..16], b[..16]);
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_subscription_keys() {
        let result = encrypt_payload("not-a-key", "AAAA", b"x");
        assert!(matches!(result, Err(PushError::InvalidKey(_))));

        // Valid base64 but wrong length
        let short_point = URL_SAFE_NO_PAD.encode([0x04u8; 10]);
        let auth = URL_SAFE_NO_PAD.encode([0u8; 16]);
        let result = encrypt_payload(&short_point, &auth, b"x");
        assert!(matches!(result, Err(PushError::InvalidKey(_))));
    }

    #[test]
    fn decodes_standard_base64_fallback() {
        let bytes = [1u8, 2, 3, 4];
        assert_eq!(decode_b64(&STANDARD.encode(bytes)).unwrap(), bytes);
        assert_eq!(decode_b64(&URL_SAFE_NO_PAD.encode(bytes)).unwrap(), bytes);
    }

    #[test]
    fn preference_gates_match_kinds() {
        let prefs = NotificationPreferences {
            user_id: Uuid::new_v4(),
            push_enabled: true,
            event_reminders: false,
            recommendation_alerts: true,
            rsvp_updates: true,
            updated_at: Utc::now(),
        };

        assert!(!kind_enabled(&prefs, NotificationKind::EventReminder));
        assert!(kind_enabled(&prefs, NotificationKind::RecommendationAlert));
        assert!(kind_enabled(&prefs, NotificationKind::Announcement));

        let disabled = NotificationPreferences {
            push_enabled: false,
            ..prefs
        };
        assert!(!kind_enabled(&disabled, NotificationKind::Announcement));
    }
}
