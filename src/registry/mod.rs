//! Device-token registry: upsert-by-email over the user collection and the
//! "latest token set" read path.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::{
    db::{UpsertOutcome, UserStore},
    error::ApiError,
    model::user::{LatestTokens, User},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub device_token: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub outcome: UpsertOutcome,
    pub user: User,
}

impl Registration {
    pub fn message(&self) -> &'static str {
        match self.outcome {
            UpsertOutcome::Created => "User registered successfully",
            UpsertOutcome::Updated => "Device token updated successfully",
        }
    }
}

pub struct DeviceRegistry {
    store: Arc<dyn UserStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn register_device(&self, req: RegisterDevice) -> Result<Registration, ApiError> {
        let (Some(name), Some(email), Some(token)) = (
            required(req.name.as_deref()),
            required(req.email.as_deref()),
            required(req.device_token.as_deref()),
        ) else {
            return Err(ApiError::Validation(
                "Name, email, and device token are required".into(),
            ));
        };

        let (user, outcome) = self
            .store
            .upsert_device(name, email, token)
            .await
            .map_err(|e| {
                error!(email, "Error storing user details: {e:#}");
                ApiError::storage(e)
            })?;

        info!(user_id = %user.id, ?outcome, "device registered");
        Ok(Registration { outcome, user })
    }

    pub async fn latest_tokens_by_email(&self, email: &str) -> Result<LatestTokens, ApiError> {
        let email = required(Some(email))
            .ok_or_else(|| ApiError::Validation("Email is required".into()))?;

        let user = self.store.find_by_email(email).await.map_err(|e| {
            error!(email, "Error retrieving user data: {e:#}");
            ApiError::storage(e)
        })?;

        user.map(|u| u.latest())
            .ok_or_else(|| ApiError::NotFound("User not found".into()))
    }

    pub async fn health(&self) -> Result<(), ApiError> {
        self.store.ping().await.map_err(|e| {
            error!("Error checking store connection: {e:#}");
            ApiError::Unavailable(format!("{e:#}"))
        })
    }
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
