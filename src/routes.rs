// Route path constants - single source of truth for the fixed API paths.
// Proxied paths come from the endpoint configuration document instead.

pub const ROOT: &str = "/";
pub const HEALTH: &str = "/health";
pub const DOCS: &str = "/docs";
pub const OPENAPI_JSON: &str = "/api-docs/openapi.json";

/// Paths a configured endpoint is not allowed to claim.
pub const RESERVED: [&str; 4] = [ROOT, HEALTH, DOCS, OPENAPI_JSON];
