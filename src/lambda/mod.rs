//! Per-invocation entry point: drives the shared router from the AWS Lambda
//! Runtime API instead of a TCP listener.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::{error, info};

pub mod event;

use event::{ProxyEvent, ProxyResponse};

const RUNTIME_API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const MAX_NEXT_FAILURES: u32 = 3;
const NEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct Invocation {
    pub request_id: String,
    pub event: Value,
}

pub struct RuntimeClient {
    client: reqwest::Client,
    base: String,
}

impl RuntimeClient {
    pub fn new(runtime_api: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("http://{runtime_api}/{RUNTIME_API_VERSION}/runtime"),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api = dotenvy::var("AWS_LAMBDA_RUNTIME_API")
            .context("AWS_LAMBDA_RUNTIME_API is not set; not running under Lambda?")?;
        Ok(Self::new(&api))
    }

    pub async fn next(&self) -> Result<Invocation> {
        let response = self
            .client
            .get(format!("{}/invocation/next", self.base))
            .send()
            .await?
            .error_for_status()?;

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invocation without request id"))?;
        let event = response.json().await?;

        Ok(Invocation { request_id, event })
    }

    pub async fn respond(&self, request_id: &str, response: &ProxyResponse) -> Result<()> {
        self.client
            .post(format!("{}/invocation/{request_id}/response", self.base))
            .json(response)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn fail(&self, request_id: &str, err: &anyhow::Error) -> Result<()> {
        self.client
            .post(format!("{}/invocation/{request_id}/error", self.base))
            .header("Lambda-Runtime-Function-Error-Type", "Unhandled")
            .json(&json!({
                "errorMessage": format!("{err:#}"),
                "errorType": "InvalidEvent",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Translates one proxy event through the router.
pub async fn handle_event(app: &Router, event: Value) -> Result<ProxyResponse> {
    let event: ProxyEvent = serde_json::from_value(event).context("Unsupported event shape")?;
    let request = event.into_request()?;
    let response = app.clone().oneshot(request).await?;
    ProxyResponse::from_response(response).await
}

/// Handles one fetched invocation and posts its outcome back to the runtime.
pub async fn dispatch(app: &Router, runtime: &RuntimeClient, invocation: Invocation) -> Result<()> {
    let Invocation { request_id, event } = invocation;

    match handle_event(app, event).await {
        Ok(response) => {
            info!(%request_id, status = response.status_code, "invocation handled");
            runtime.respond(&request_id, &response).await
        }
        Err(err) => {
            error!(%request_id, "invocation failed: {err:#}");
            runtime.fail(&request_id, &err).await
        }
    }
}

/// Fetches, handles and answers a single invocation.
pub async fn serve_one(app: &Router, runtime: &RuntimeClient) -> Result<()> {
    let invocation = runtime.next().await?;
    dispatch(app, runtime, invocation).await
}

/// Serves invocations until the runtime stops handing them out.
///
/// A failure while answering one invocation is logged and the loop moves on;
/// only `MAX_NEXT_FAILURES` consecutive failed fetches end it.
pub async fn serve(app: &Router, runtime: &RuntimeClient) -> Result<()> {
    let mut failures = 0u32;
    loop {
        match runtime.next().await {
            Ok(invocation) => {
                failures = 0;
                let request_id = invocation.request_id.clone();
                if let Err(err) = dispatch(app, runtime, invocation).await {
                    error!(%request_id, "could not report invocation result: {err:#}");
                }
            }
            Err(err) => {
                failures += 1;
                error!(failures, "fetching next invocation failed: {err:#}");
                if failures >= MAX_NEXT_FAILURES {
                    return Err(err.context("Lambda runtime API unavailable"));
                }
                tokio::time::sleep(NEXT_RETRY_DELAY * failures).await;
            }
        }
    }
}

pub async fn run(app: Router) -> Result<()> {
    let runtime = RuntimeClient::from_env()?;
    info!("Serving Lambda invocations");
    serve(&app, &runtime).await
}
