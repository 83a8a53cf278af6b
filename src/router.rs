use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method as HttpMethod};
use axum::response::Redirect;
use axum::routing::{get, on};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc;
use crate::endpoints::{EndpointSpec, AUTH_FUNCTION, UNIVERSAL_FUNCTION};
use crate::handlers;
use crate::routes;
use crate::state::AppState;

/// How a route handles requests, resolved once at synthesis time from the
/// declared function identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Forward to the backend function fixed at registration time
    FixedForward,
    /// Forward to whatever function the request names in wsfunction
    UniversalForward,
    /// Exchange credentials for a backend-issued token
    CredentialExchange,
}

impl HandlerKind {
    pub fn resolve(function: &str) -> Self {
        match function {
            AUTH_FUNCTION => HandlerKind::CredentialExchange,
            UNIVERSAL_FUNCTION => HandlerKind::UniversalForward,
            _ => HandlerKind::FixedForward,
        }
    }
}

/// A compiled route: one validated EndpointSpec with its handler kind.
/// Built once at startup, immutable for the process lifetime.
#[derive(Debug)]
pub struct RuntimeRoute {
    pub spec: EndpointSpec,
    pub kind: HandlerKind,
}

/// Compile the validated EndpointSpec set into the immutable route table.
pub fn compile(specs: Vec<EndpointSpec>) -> Vec<Arc<RuntimeRoute>> {
    specs
        .into_iter()
        .map(|spec| {
            let kind = HandlerKind::resolve(&spec.function);
            Arc::new(RuntimeRoute { spec, kind })
        })
        .collect()
}

/// Register one handler per compiled route, plus the fixed routes
/// (health, docs) and the process-wide layers.
pub fn build_router(state: AppState) -> Router {
    let doc = api_doc::build(&state.config, &state.routes);
    let cors = cors_layer(&state.config.allowed_origins);

    let mut router = Router::new().route(routes::HEALTH, get(handlers::health_handler));

    for route in state.routes.iter() {
        let rt = Arc::clone(route);
        let handler = move |state: State<AppState>, request: Request| {
            let rt = Arc::clone(&rt);
            async move { handlers::forward::dispatch(rt, state, request).await }
        };
        router = router.route(&route.spec.path, on(route.spec.method.filter(), handler));
    }

    router
        .merge(SwaggerUi::new(routes::DOCS).url(routes::OPENAPI_JSON, doc))
        .route(routes::ROOT, get(|| async { Redirect::permanent(routes::DOCS) }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Process-wide CORS policy, computed once from the configured origin
/// list. A wildcard allows every origin but cannot be combined with
/// credentialed requests; an explicit list enables credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                HttpMethod::GET,
                HttpMethod::POST,
                HttpMethod::PUT,
                HttpMethod::DELETE,
                HttpMethod::PATCH,
                HttpMethod::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::endpoints::{self, EndpointDocument};
    use crate::moodle::MoodleClient;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn specs_from(json: &str) -> Vec<EndpointSpec> {
        let document: EndpointDocument = serde_json::from_str(json).unwrap();
        endpoints::validate(document).unwrap()
    }

    fn test_state(specs: Vec<EndpointSpec>) -> AppState {
        AppState {
            config: Arc::new(Config {
                moodle_url: Some("https://moodle.example.com".to_string()),
                endpoints_file: "endpoints.json".to_string(),
                service_port: 3000,
                service_host: "0.0.0.0".to_string(),
                allowed_origins: vec!["*".to_string()],
                request_timeout_secs: 5,
                log_level: "info".to_string(),
            }),
            moodle: MoodleClient::new(Duration::from_secs(5)).unwrap(),
            routes: Arc::new(compile(specs)),
        }
    }

    const DOCUMENT: &str = r#"{
        "endpoints": [
            {"path": "/auth", "method": "POST", "function": "auth"},
            {"path": "/universal", "method": "GET", "function": "universal"},
            {"path": "/universal", "method": "POST", "function": "universal"},
            {"path": "/core_webservice_get_site_info", "method": "GET",
             "function": "core_webservice_get_site_info"}
        ]
    }"#;

    #[test]
    fn test_compile_preserves_count_and_resolves_kinds() {
        let routes = compile(specs_from(DOCUMENT));

        assert_eq!(routes.len(), 4);
        assert_eq!(routes[0].kind, HandlerKind::CredentialExchange);
        assert_eq!(routes[1].kind, HandlerKind::UniversalForward);
        assert_eq!(routes[2].kind, HandlerKind::UniversalForward);
        assert_eq!(routes[3].kind, HandlerKind::FixedForward);
    }

    #[tokio::test]
    async fn test_every_compiled_route_is_addressable() {
        let app = build_router(test_state(specs_from(DOCUMENT)));

        // A declared route answers (here: a local validation error rather
        // than a 404/405, since no token is supplied).
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("GET")
                    .uri("/core_webservice_get_site_info")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Same path, different method: not registered.
        let response = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/core_webservice_get_site_info")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        // Both methods of the universal path are independently addressable.
        for method in ["GET", "POST"] {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::builder()
                        .method(method)
                        .uri("/universal")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method}");
        }

        // Unknown paths still fall through to 404.
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("GET")
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_route_reports_route_count() {
        let app = build_router(test_state(specs_from(DOCUMENT)));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: crate::error::HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.routes, 4);
    }

    #[tokio::test]
    async fn test_root_redirects_to_docs() {
        let app = build_router(test_state(specs_from(DOCUMENT)));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("GET")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            routes::DOCS
        );
    }

    #[test]
    fn test_cors_layer_variants_build() {
        // Wildcard and explicit origin lists both produce a valid layer;
        // tower-http rejects invalid combinations at construction.
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&[
            "https://app.example.com".to_string(),
            "https://admin.example.com".to_string(),
        ]);
    }
}
