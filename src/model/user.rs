use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A set of device tokens, insertion-ordered and duplicate-free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenBatch(Vec<String>);

impl TokenBatch {
    pub fn single(token: &str) -> Self {
        Self(vec![token.to_string()])
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Appends `token` unless already present; returns whether it was added.
    pub fn insert(&mut self, token: &str) -> bool {
        if self.contains(token) {
            return false;
        }
        self.0.push(token.to_string());
        true
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub device_tokens: Vec<TokenBatch>,
    pub registered_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: &str, email: &str, device_token: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            device_tokens: vec![TokenBatch::single(device_token)],
            registered_at: Utc::now(),
        }
    }

    /// The token set readers see: the newest batch, or empty when no history exists.
    pub fn latest_tokens(&self) -> TokenBatch {
        self.device_tokens.last().cloned().unwrap_or_default()
    }

    /// Records `token` against this user with a deduplicating add into the
    /// latest batch. Returns `false` when the token was already present.
    ///
    /// Each token is stored once, so the record grows linearly with the
    /// number of distinct tokens.
    pub fn add_token(&mut self, token: &str) -> bool {
        match self.device_tokens.last_mut() {
            Some(latest) => latest.insert(token),
            None => {
                self.device_tokens.push(TokenBatch::single(token));
                true
            }
        }
    }

    pub fn latest(&self) -> LatestTokens {
        LatestTokens {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            device_tokens: self.latest_tokens(),
        }
    }
}

/// Read projection served by the token lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestTokens {
    pub id: String,
    pub name: String,
    pub email: String,
    pub device_tokens: TokenBatch,
}
