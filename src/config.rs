use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Persistent HTTP listener.
    Listener,
    /// Driven per invocation by the AWS Lambda runtime.
    Lambda,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub db_name: String,
    pub collection_name: String,
    pub mode: DeploymentMode,
    pub bind_addr: String,
    pub port: u16,
    pub service_account_path: PathBuf,
    /// Overrides the FCM endpoint, e.g. for an egress proxy.
    pub fcm_base_url: Option<String>,
}

impl Config {
    /// Reads `.env` (when present) and the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let mode = match var("ENVIRONMENT").as_deref() {
            Some("lambda") => DeploymentMode::Lambda,
            _ => DeploymentMode::Listener,
        };

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {raw:?}"))?,
            None => 3000,
        };

        Ok(Self {
            store_path: PathBuf::from(or("STORE_PATH", "pushdb")),
            db_name: or("DB_NAME", "push"),
            collection_name: or("COLLECTION_NAME", "users"),
            mode,
            bind_addr: or("BIND_ADDR", "0.0.0.0"),
            port,
            service_account_path: PathBuf::from(or(
                "FCM_SERVICE_ACCOUNT",
                "firebase-service-account.json",
            )),
            fcm_base_url: var("FCM_BASE_URL"),
        })
    }

    /// Directory holding the named database.
    pub fn database_dir(&self) -> PathBuf {
        self.store_path.join(&self.db_name)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.bind_addr, self.port))
    }
}
