use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;

use crate::coerce::{self, RequestValues};
use crate::config::Config;
use crate::error::ApiError;
use crate::moodle;
use crate::router::{HandlerKind, RuntimeRoute};
use crate::state::AppState;

use super::auth;

/// Upper bound on proxied request bodies.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Parameter names the gateway owns; the universal route never forwards
/// them opaquely.
const RESERVED_PARAMS: [&str; 4] = ["wstoken", "moodle_url", "wsfunction", "moodlewsrestformat"];

/// Entry point for every synthesized route.
///
/// Parses the request once, then follows the handler kind resolved at
/// synthesis time. All validation happens here, before any outbound call
/// is attempted.
pub async fn dispatch(
    route: Arc<RuntimeRoute>,
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    let query = parse_query(parts.uri.query());
    let body_pairs = if route.spec.method.sends_body() {
        parse_body(&parts.headers, body).await?
    } else {
        Vec::new()
    };
    let values = RequestValues::new(query, body_pairs);

    if matches!(route.kind, HandlerKind::CredentialExchange) {
        return auth::credential_exchange(&route.spec, &state, &values).await;
    }

    let base = resolve_backend(&state.config, &values)?;
    let token = resolve_token(&parts.headers, &values).ok_or(ApiError::MissingToken)?;

    let function = match route.kind {
        HandlerKind::UniversalForward => values
            .get("wsfunction")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::MissingParameter("wsfunction".to_string()))?
            .to_string(),
        _ => route.spec.function.clone(),
    };

    let mut params: Vec<(String, String)> = vec![
        ("wstoken".to_string(), token),
        ("wsfunction".to_string(), function),
        (
            "moodlewsrestformat".to_string(),
            moodle::REST_FORMAT.to_string(),
        ),
    ];

    let coerced = coerce::collect(&route.spec.params, &values)?;
    coerce::encode_all(&coerced, &mut params);

    if matches!(route.kind, HandlerKind::UniversalForward) {
        append_passthrough(&route, &values, &mut params);
    }

    let upstream = state
        .moodle
        .call(route.spec.method, &moodle::ws_url(&base), &params)
        .await?;

    tracing::info!(
        "Forwarded {} {} -> {} ({})",
        route.spec.method.as_str(),
        route.spec.path,
        upstream.direct_url,
        upstream.status
    );

    Ok(upstream.into_response())
}

/// Resolve the backend base URL for one request: the fixed configured URL
/// wins; otherwise the caller must supply moodle_url.
pub fn resolve_backend(config: &Config, values: &RequestValues) -> Result<String, ApiError> {
    config
        .moodle_url
        .as_deref()
        .or_else(|| values.get("moodle_url"))
        .filter(|url| !url.trim().is_empty())
        .map(moodle::normalize_base_url)
        .ok_or(ApiError::BackendUnresolved)
}

/// Token from the Authorization header (Bearer) or the wstoken query
/// parameter; the header takes precedence when both are present.
fn resolve_token(headers: &HeaderMap, values: &RequestValues) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }
    values
        .get_query("wstoken")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Some(token.to_string())
        }
        _ => None,
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    match query {
        Some(raw) => url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}

/// Read body parameters for the methods that carry one. A JSON object and
/// a form-encoded body are both accepted; anything else is a validation
/// error, resolved before the outbound call.
async fn parse_body(headers: &HeaderMap, body: Body) -> Result<Vec<(String, String)>, ApiError> {
    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|err| ApiError::InvalidParameter {
            name: "body".to_string(),
            reason: err.to_string(),
        })?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/json") {
        let value: JsonValue =
            serde_json::from_slice(&bytes).map_err(|err| ApiError::InvalidParameter {
                name: "body".to_string(),
                reason: format!("invalid JSON body: {}", err),
            })?;
        let JsonValue::Object(map) = value else {
            return Err(ApiError::InvalidParameter {
                name: "body".to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        let mut pairs = Vec::with_capacity(map.len());
        for (name, field) in map {
            if field.is_null() {
                continue;
            }
            let text = coerce::json_value_text(&field).ok_or_else(|| ApiError::InvalidParameter {
                name: name.clone(),
                reason: "nested objects are not supported".to_string(),
            })?;
            pairs.push((name, text));
        }
        Ok(pairs)
    } else {
        Ok(url::form_urlencoded::parse(&bytes).into_owned().collect())
    }
}

/// Opaque passthrough for the universal route: every supplied value that
/// is neither reserved nor covered by a declared parameter goes out
/// unmodified.
fn append_passthrough(
    route: &RuntimeRoute,
    values: &RequestValues,
    params: &mut Vec<(String, String)>,
) {
    let declared: HashSet<&str> = route
        .spec
        .params
        .iter()
        .map(|param| param.name.as_str())
        .collect();
    let mut forwarded: HashSet<String> = HashSet::new();

    for (name, value) in values.iter() {
        if value.is_empty()
            || RESERVED_PARAMS.contains(&name)
            || declared.contains(name)
            || !forwarded.insert(name.to_string())
        {
            continue;
        }
        params.push((name.to_string(), value.to_string()));
    }
}
