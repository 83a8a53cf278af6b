use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::endpoints::Method;
use crate::error::ApiError;

/// Path of the Moodle REST web-service entry point, relative to the base URL
pub const WS_PATH: &str = "/webservice/rest/server.php";
/// Path of the Moodle token-issuance endpoint
pub const TOKEN_PATH: &str = "/login/token.php";
/// Web-service shortname used for token issuance when none is supplied
pub const DEFAULT_SERVICE: &str = "moodle_mobile_app";
/// Response format requested from the REST server
pub const REST_FORMAT: &str = "json";

/// Diagnostic response headers carrying the exact outbound call
pub const DIRECT_URL_HEADER: &str = "X-Moodle-Direct-URL";
pub const DIRECT_METHOD_HEADER: &str = "X-Moodle-Direct-Method";

/// Shareable outbound HTTP client for the Moodle backend
///
/// One client for the process lifetime; reqwest pools and reuses
/// connections internally, and the configured timeout bounds every
/// outbound call.
#[derive(Clone)]
pub struct MoodleClient {
    http: reqwest::Client,
}

/// The upstream's answer to one outbound call, relayed verbatim
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub direct_url: String,
    pub method: Method,
}

impl MoodleClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain;q=0.9, */*;q=0.8"),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build outbound HTTP client")?;

        Ok(Self { http })
    }

    /// Execute exactly one outbound call against a Moodle endpoint.
    ///
    /// GET and DELETE carry the parameters in the query string; the body
    /// methods send them form-encoded, which is what the Moodle REST
    /// server expects. Network failure and timeout surface as
    /// UpstreamUnreachable; any HTTP status the backend returns is relayed
    /// as-is, never reinterpreted.
    pub async fn call(
        &self,
        method: Method,
        endpoint_url: &str,
        params: &[(String, String)],
    ) -> Result<UpstreamResponse, ApiError> {
        let mut url = Url::parse(endpoint_url)
            .map_err(|_| ApiError::InvalidBackendUrl(endpoint_url.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        // The fully-encoded URL, reported back in the diagnostic header.
        let direct_url = url.to_string();

        let request = if method.sends_body() {
            self.http.request(method.http(), endpoint_url).form(params)
        } else {
            self.http.request(method.http(), url)
        };

        tracing::debug!("Outbound {} {}", method.as_str(), direct_url);

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::UpstreamUnreachable {
                url: direct_url.clone(),
                detail: err.to_string(),
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| ApiError::UpstreamUnreachable {
                url: direct_url.clone(),
                detail: err.to_string(),
            })?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
            direct_url,
            method,
        })
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut builder = Response::builder()
            .status(self.status)
            .header(DIRECT_METHOD_HEADER, self.method.as_str());
        if let Ok(value) = HeaderValue::from_str(&self.direct_url) {
            builder = builder.header(DIRECT_URL_HEADER, value);
        }
        if let Some(content_type) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder
            .body(Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
    }
}

/// Normalize a Moodle base URL: default to https when no scheme is given
/// and drop trailing slashes.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}

pub fn ws_url(base: &str) -> String {
    format!("{}{}", base, WS_PATH)
}

pub fn token_url(base: &str) -> String {
    format!("{}{}", base, TOKEN_PATH)
}
