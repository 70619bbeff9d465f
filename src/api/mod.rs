use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{push::PushProvider, registry::DeviceRegistry};

pub mod handlers;
pub mod types;

use handlers::{
    get_token_by_username, healthcheck, missing_email, not_found, register_device, root,
    send_notification,
};

/// Built once at startup; shared by the listener and the serverless adapter.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub push: Arc<dyn PushProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthcheck", get(healthcheck))
        .route("/registerDevice", post(register_device))
        .route("/getTokenByUsername", get(missing_email))
        .route("/getTokenByUsername/", get(missing_email))
        .route("/getTokenByUsername/{email}", get(get_token_by_username))
        // sic: deployed clients use this spelling
        .route("/sendNotifcation", post(send_notification))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        db::DBLayer,
        push::{PushMessage, UnconfiguredProvider},
        registry::tests::BrokenStore,
    };

    /// Records sent messages; tokens starting with "bad" are refused.
    #[derive(Default)]
    struct RecordingProvider {
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushProvider for RecordingProvider {
        async fn send(&self, msg: &PushMessage) -> Result<String, Value> {
            self.sent.lock().unwrap().push(msg.clone());
            match msg.token.as_deref() {
                Some(t) if !t.starts_with("bad") => Ok(format!("projects/p/messages/{t}")),
                _ => Err(json!({
                    "code": "messaging/invalid-argument",
                    "message": "invalid registration token"
                })),
            }
        }
    }

    struct Harness {
        app: Router,
        push: Arc<RecordingProvider>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = DBLayer::open(dir.path(), "users").unwrap();
        let push = Arc::new(RecordingProvider::default());
        let app = router(AppState {
            registry: Arc::new(DeviceRegistry::new(Arc::new(store))),
            push: push.clone(),
        });
        Harness {
            app,
            push,
            _dir: dir,
        }
    }

    fn broken_app() -> Router {
        router(AppState {
            registry: Arc::new(DeviceRegistry::new(Arc::new(BrokenStore::default()))),
            push: Arc::new(RecordingProvider::default()),
        })
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn root_greets() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Hello from root" }));
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let h = harness();

        let (status, body) = call(
            &h.app,
            Method::POST,
            "/registerDevice",
            Some(json!({ "name": "A", "email": "a@x.com", "deviceToken": "t1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "User registered successfully");
        assert_eq!(body["data"]["deviceTokens"], json!([["t1"]]));
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&h.app, Method::GET, "/getTokenByUsername/a@x.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "data": { "id": id, "name": "A", "email": "a@x.com", "deviceTokens": ["t1"] }
            })
        );
    }

    #[tokio::test]
    async fn second_token_is_reported_as_update() {
        let h = harness();
        for token in ["t1", "t2", "t2"] {
            call(
                &h.app,
                Method::POST,
                "/registerDevice",
                Some(json!({ "name": "A", "email": "a@x.com", "deviceToken": token })),
            )
            .await;
        }
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/registerDevice",
            Some(json!({ "name": "A", "email": "a@x.com", "deviceToken": "t1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Device token updated successfully");
        assert_eq!(body["data"]["deviceTokens"], json!([["t1", "t2"]]));

        let (_, body) = call(&h.app, Method::GET, "/getTokenByUsername/a%40x.com", None).await;
        assert_eq!(body["data"]["deviceTokens"], json!(["t1", "t2"]));
    }

    #[tokio::test]
    async fn register_with_missing_field_is_bad_request_and_stores_nothing() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/registerDevice",
            Some(json!({ "name": "A", "email": "a@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Name, email, and device token are required");

        let (status, _) = call(&h.app, Method::GET, "/getTokenByUsername/a@x.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_with_malformed_json_is_bad_request() {
        let h = harness();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/registerDevice")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn lookup_edge_cases() {
        let h = harness();

        let (status, body) = call(&h.app, Method::GET, "/getTokenByUsername/ghost@x.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "success": false, "message": "User not found" }));

        for uri in ["/getTokenByUsername/", "/getTokenByUsername"] {
            let (status, body) = call(&h.app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["message"], "Email is required");
        }
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not Found" }));

        let (status, body) = call(&h.app, Method::GET, "/registerDevice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not Found" }));
    }

    #[tokio::test]
    async fn healthcheck_reflects_store() {
        let h = harness();
        let (status, body) = call(&h.app, Method::GET, "/healthcheck", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = call(&broken_app(), Method::GET, "/healthcheck", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "connection refused");
    }

    #[tokio::test]
    async fn store_failure_is_500_with_message() {
        let app = broken_app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/registerDevice",
            Some(json!({ "name": "A", "email": "a@x.com", "deviceToken": "t1" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "success": false, "error": "connection refused" }));

        let (status, _) = call(&app, Method::GET, "/getTokenByUsername/a@x.com", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn send_notification_passes_through() {
        let h = harness();
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/sendNotifcation",
            Some(json!({ "token": "t1", "title": "Hi", "body": "There" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "response": "projects/p/messages/t1" }));

        // absent fields still reach the provider
        let (status, body) = call(&h.app, Method::POST, "/sendNotifcation", Some(json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "messaging/invalid-argument");

        let sent = h.push.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].token.is_none());
    }

    #[tokio::test]
    async fn send_without_json_content_type_reaches_provider() {
        let h = harness();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/sendNotifcation")
            .body(Body::from("token=t1"))
            .unwrap();
        let response = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let sent = h.push.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].token.is_none());
        assert!(sent[0].title.is_none());
    }

    #[tokio::test]
    async fn send_with_malformed_json_is_bad_request() {
        let h = harness();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/sendNotifcation")
            .header("content-type", "application/json")
            .body(Body::from("{\"token\":"))
            .unwrap();
        let response = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_without_credentials_is_delivery_error() {
        let dir = TempDir::new().unwrap();
        let store = DBLayer::open(dir.path(), "users").unwrap();
        let app = router(AppState {
            registry: Arc::new(DeviceRegistry::new(Arc::new(store))),
            push: Arc::new(UnconfiguredProvider::new("missing file")),
        });

        let (status, body) = call(
            &app,
            Method::POST,
            "/sendNotifcation",
            Some(json!({ "token": "t1", "title": "Hi", "body": "There" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "provider/not-configured");
        assert_eq!(body["error"]["message"], "missing file");
    }
}
