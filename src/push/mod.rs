use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod fcm;

pub use fcm::FcmClient;

/// Body of a send request. Fields are forwarded as given; the provider decides
/// what is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Push-delivery capability.
///
/// `Ok` carries the provider's delivery receipt, `Err` the provider's error
/// object as reported.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, msg: &PushMessage) -> Result<String, Value>;
}

/// Stands in when provider credentials could not be loaded at startup.
pub struct UnconfiguredProvider {
    reason: String,
}

impl UnconfiguredProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PushProvider for UnconfiguredProvider {
    async fn send(&self, _msg: &PushMessage) -> Result<String, Value> {
        Err(json!({
            "code": "provider/not-configured",
            "message": self.reason,
        }))
    }
}
