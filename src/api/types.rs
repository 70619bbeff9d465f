use serde::Serialize;

use crate::model::user::{LatestTokens, User};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: User,
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub success: bool,
    pub data: LatestTokens,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub error: &'static str,
}
