//! Firebase Cloud Messaging (HTTP v1) client authenticated with a Google
//! service account.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{PushMessage, PushProvider};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const FCM_BASE_URL: &str = "https://fcm.googleapis.com";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// assertion lifetime accepted by Google's token endpoint
const ASSERTION_TTL_SECS: i64 = 3600;
// refresh the cached access token this long before it expires
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid service account file {}", path.display()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct FcmClient {
    client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    base_url: String,
    token: RwLock<Option<CachedToken>>,
}

impl FcmClient {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM")?;

        Ok(Self {
            client: reqwest::Client::new(),
            key,
            encoding_key,
            base_url: FCM_BASE_URL.to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ServiceAccountKey::from_file(path)?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.key.project_id
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.key.project_id
        )
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: FCM_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_TTL_SECS,
        };
        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    async fn access_token(&self) -> Result<String> {
        {
            // 1) cached and still fresh
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // another request may have refreshed while we waited
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        // 2) exchange a signed assertion
        let now = Utc::now();
        let assertion = self.assertion(now)?;
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("token_exchange_failed: {}", text));
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "refreshed FCM access token");

        // 3) store
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: refresh_at(now, token.expires_in),
        });

        Ok(token.access_token)
    }
}

/// When a token issued at `now` with lifetime `expires_in` should be refreshed.
/// The lifetime is clamped to what an assertion can grant.
fn refresh_at(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    let expires_in = expires_in.clamp(0, ASSERTION_TTL_SECS);
    let margin = TOKEN_REFRESH_MARGIN_SECS.min(expires_in / 2);
    now + Duration::seconds(expires_in - margin)
}

/// Absent fields are left out so the provider applies its own validation.
fn message_body(msg: &PushMessage) -> Value {
    let mut notification = Map::new();
    if let Some(title) = &msg.title {
        notification.insert("title".into(), json!(title));
    }
    if let Some(body) = &msg.body {
        notification.insert("body".into(), json!(body));
    }

    let mut message = Map::new();
    if let Some(token) = &msg.token {
        message.insert("token".into(), json!(token));
    }
    message.insert("notification".into(), Value::Object(notification));

    json!({ "message": message })
}

fn local_error(code: &str, err: impl std::fmt::Display) -> Value {
    json!({ "code": code, "message": err.to_string() })
}

#[async_trait]
impl PushProvider for FcmClient {
    async fn send(&self, msg: &PushMessage) -> Result<String, Value> {
        let access_token = self.access_token().await.map_err(|e| {
            error!("FCM authentication failed: {e:#}");
            local_error("app/invalid-credential", format!("{e:#}"))
        })?;

        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&message_body(msg))
            .send()
            .await
            .map_err(|e| {
                error!("Error sending message: {e}");
                local_error("messaging/transport-error", e)
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            error!(%status, "Error sending message: {body}");
            return Err(match body {
                Value::Object(mut obj) if obj.contains_key("error") => {
                    obj.remove("error").unwrap_or(Value::Null)
                }
                other => json!({ "code": status.as_u16(), "message": other }),
            });
        }

        let receipt = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| local_error("messaging/invalid-response", format!("{body}")))?;

        info!(%receipt, "Successfully sent message");
        Ok(receipt)
    }
}
