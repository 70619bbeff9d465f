//! API Gateway proxy event ⇄ HTTP translation (REST v1 and HTTP v2 payloads).

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    // v1
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string_parameters: Option<BTreeMap<String, String>>,
    // v2
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub raw_query_string: Option<String>,
    #[serde(default)]
    pub cookies: Option<Vec<String>>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,

    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub http: Option<HttpContext>,
}

#[derive(Debug, Deserialize)]
pub struct HttpContext {
    pub method: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ProxyEvent {
    fn method(&self) -> &str {
        self.http_method
            .as_deref()
            .or_else(|| {
                self.request_context
                    .as_ref()
                    .and_then(|c| c.http.as_ref())
                    .map(|h| h.method.as_str())
            })
            .unwrap_or("GET")
    }

    fn path_and_query(&self) -> Result<String> {
        let path = self
            .raw_path
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("/");

        if let Some(raw) = self.raw_query_string.as_deref().filter(|q| !q.is_empty()) {
            return Ok(format!("{path}?{raw}"));
        }

        let params = match &self.query_string_parameters {
            Some(params) if !params.is_empty() => params,
            _ => return Ok(path.to_string()),
        };

        // the base only serves to borrow Url's query encoder
        let mut url = Url::parse("http://lambda.invalid/").context("Invalid base URL")?;
        url.query_pairs_mut().extend_pairs(params.iter());
        Ok(format!("{path}?{}", url.query().unwrap_or_default()))
    }

    pub fn into_request(self) -> Result<Request<Body>> {
        let mut builder = Request::builder()
            .method(self.method())
            .uri(self.path_and_query()?);

        for (name, value) in self.headers.iter().flatten() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookies) = self.cookies.as_ref().filter(|c| !c.is_empty()) {
            builder = builder.header("cookie", cookies.join("; "));
        }

        let body = match self.body {
            Some(body) if self.is_base64_encoded => Body::from(
                STANDARD
                    .decode(body.as_bytes())
                    .context("Event body is not valid base64")?,
            ),
            Some(body) => Body::from(body),
            None => Body::empty(),
        };

        builder.body(body).context("Invalid request in event")
    }
}

impl ProxyResponse {
    pub async fn from_response(response: Response<Body>) -> Result<Self> {
        let (parts, body) = response.into_parts();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &parts.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .context("Failed to read response body")?;
        let (body, is_base64_encoded) = match String::from_utf8(bytes.to_vec()) {
            Ok(text) => (text, false),
            Err(_) => (STANDARD.encode(&bytes), true),
        };

        Ok(Self {
            status_code: parts.status.as_u16(),
            headers,
            body,
            is_base64_encoded,
        })
    }
}
