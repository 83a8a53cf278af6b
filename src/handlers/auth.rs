use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;

use crate::coerce::{self, RequestValues};
use crate::endpoints::{EndpointSpec, Method};
use crate::error::ApiError;
use crate::moodle;
use crate::state::AppState;

use super::forward::resolve_backend;

/// Credential Bridge: exchange username/password for a Moodle token.
///
/// Exactly one outbound call goes to the backend's token endpoint; the
/// issued token (and whatever else the backend returns) is passed through
/// unmodified. The gateway stores nothing - the token is a bearer value
/// the caller retains and resubmits.
pub async fn credential_exchange(
    spec: &EndpointSpec,
    state: &AppState,
    values: &RequestValues,
) -> Result<Response, ApiError> {
    let base = resolve_backend(&state.config, values)?;

    let coerced = coerce::collect(&spec.params, values)?;
    let mut params: Vec<(String, String)> = Vec::new();
    coerce::encode_all(&coerced, &mut params);

    if !params.iter().any(|(name, _)| name == "service") {
        params.push(("service".to_string(), moodle::DEFAULT_SERVICE.to_string()));
    }

    let mut upstream = state
        .moodle
        .call(Method::Post, &moodle::token_url(&base), &params)
        .await?;

    // Moodle reports bad credentials with a 200 and an error body; surface
    // that as unauthorized while keeping the body untouched.
    if upstream.status.is_success() && reports_auth_error(&upstream.body) {
        tracing::warn!("Moodle rejected credential exchange at {}", upstream.direct_url);
        upstream.status = StatusCode::UNAUTHORIZED;
    }

    Ok(upstream.into_response())
}

fn reports_auth_error(body: &[u8]) -> bool {
    serde_json::from_slice::<JsonValue>(body)
        .ok()
        .as_ref()
        .and_then(JsonValue::as_object)
        .map(|obj| obj.contains_key("error") || obj.contains_key("errorcode"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::endpoints::{self, EndpointDocument};
    use crate::moodle::{MoodleClient, DIRECT_METHOD_HEADER};
    use crate::router;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::{post, Router};
    use axum::Form;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const AUTH_DOCUMENT: &str = r#"{
        "endpoints": [
            {"path": "/auth", "method": "POST", "function": "auth",
             "description": "Get a Moodle token", "tags": ["auth"],
             "params": [
                {"name": "username", "type": "string", "required": true},
                {"name": "password", "type": "string", "required": true},
                {"name": "service", "type": "string"}
             ]}
        ]
    }"#;

    fn test_app(moodle_url: &str) -> Router {
        let document: EndpointDocument = serde_json::from_str(AUTH_DOCUMENT).unwrap();
        let specs = endpoints::validate(document).unwrap();
        let state = AppState {
            config: Arc::new(Config {
                moodle_url: Some(moodle_url.to_string()),
                endpoints_file: "endpoints.json".to_string(),
                service_port: 3000,
                service_host: "0.0.0.0".to_string(),
                allowed_origins: vec!["*".to_string()],
                request_timeout_secs: 5,
                log_level: "info".to_string(),
            }),
            moodle: MoodleClient::new(Duration::from_secs(5)).unwrap(),
            routes: Arc::new(router::compile(specs)),
        };
        router::build_router(state)
    }

    /// Mock token endpoint: valid credentials return a token plus the form
    /// it received, anything else returns Moodle's error shape.
    async fn spawn_token_backend(calls: Arc<AtomicUsize>) -> String {
        let handler = move |Form(form): Form<HashMap<String, String>>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if form.get("username").map(String::as_str) == Some("student")
                    && form.get("password").map(String::as_str) == Some("secret")
                {
                    axum::Json(json!({"token": "TOKEN123", "form": form}))
                } else {
                    axum::Json(json!({
                        "error": "Invalid login, please try again",
                        "errorcode": "invalidlogin"
                    }))
                }
            }
        };
        let app = Router::new().route("/login/token.php", post(handler));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn read_json(response: axum::response::Response) -> JsonValue {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_credential_exchange_returns_backend_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = spawn_token_backend(Arc::clone(&calls)).await;
        let app = test_app(&backend);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/auth")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username": "student", "password": "secret"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(DIRECT_METHOD_HEADER).unwrap(),
            "POST"
        );
        let body = read_json(response).await;
        assert_eq!(body["token"], "TOKEN123");
        // The default service shortname fills in when none is supplied.
        assert_eq!(body["form"]["service"], moodle::DEFAULT_SERVICE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_credential_exchange_bad_credentials_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = spawn_token_backend(Arc::clone(&calls)).await;
        let app = test_app(&backend);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/auth")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username": "student", "password": "wrong"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        // The backend's error body comes through unchanged, with the
        // status lifted to unauthorized.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["errorcode"], "invalidlogin");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_credential_exchange_missing_credentials_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = spawn_token_backend(Arc::clone(&calls)).await;
        let app = test_app(&backend);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/auth")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username": "student"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_form_encoded_credentials_accepted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = spawn_token_backend(Arc::clone(&calls)).await;
        let app = test_app(&backend);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/auth")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("username=student&password=secret&service=myservice"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["form"]["service"], "myservice");
    }

    #[test]
    fn test_reports_auth_error() {
        assert!(reports_auth_error(br#"{"error": "bad login"}"#));
        assert!(reports_auth_error(br#"{"errorcode": "invalidlogin"}"#));
        assert!(!reports_auth_error(br#"{"token": "abc"}"#));
        assert!(!reports_auth_error(b"not json"));
    }
}
