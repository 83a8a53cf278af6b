use std::collections::{HashMap, HashSet};
use std::fs;

use anyhow::{Context, Result};
use axum::http;
use axum::routing::MethodFilter;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::coerce;
use crate::routes;

/// Function identifier that marks the credential-exchange endpoint.
pub const AUTH_FUNCTION: &str = "auth";
/// Function identifier that marks the pass-through endpoint taking the
/// Moodle function name from the request.
pub const UNIVERSAL_FUNCTION: &str = "universal";

/// HTTP methods a configured endpoint may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "PATCH" => Some(Method::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }

    pub fn filter(&self) -> MethodFilter {
        match self {
            Method::Get => MethodFilter::GET,
            Method::Post => MethodFilter::POST,
            Method::Put => MethodFilter::PUT,
            Method::Delete => MethodFilter::DELETE,
            Method::Patch => MethodFilter::PATCH,
        }
    }

    pub fn http(&self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
            Method::Patch => http::Method::PATCH,
        }
    }

    /// Moodle expects form-encoded bodies for these; the rest carry
    /// parameters in the query string.
    pub fn sends_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

/// Declared parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
}

impl ParamType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "str" | "string" => Some(ParamType::Str),
            "int" | "integer" => Some(ParamType::Int),
            "float" | "double" => Some(ParamType::Float),
            "bool" | "boolean" => Some(ParamType::Bool),
            "list" => Some(ParamType::List),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Str => "string",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::List => "list",
        }
    }
}

/// One validated endpoint declaration
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub path: String,
    pub method: Method,
    pub function: String,
    pub description: String,
    pub tags: Vec<String>,
    pub params: Vec<ParameterSpec>,
    /// Opaque response-documentation metadata, passed through to the docs
    pub responses: Option<JsonValue>,
}

/// One validated parameter declaration
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<JsonValue>,
    pub description: String,
    /// Send the parameter as an empty string when no value is supplied
    pub send_if_empty: bool,
}

/// The endpoint configuration document as parsed from JSON, before
/// validation. Field-level defaults keep parsing permissive so that the
/// validator can report every problem instead of failing on the first.
#[derive(Debug, Deserialize)]
pub struct EndpointDocument {
    #[serde(default)]
    pub endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
pub struct RawEndpoint {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "query_params")]
    pub params: Vec<RawParameter>,
    #[serde(default)]
    pub responses: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct RawParameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_param_type")]
    pub ty: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<JsonValue>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub send_if_empty: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// Validation failure for the endpoint configuration document.
///
/// Collects every offending entry, not just the first, so that a broken
/// deployment can be fixed in one pass.
#[derive(Debug, thiserror::Error)]
#[error(
    "endpoint configuration invalid, {} problem(s) found:\n  - {}",
    .issues.len(),
    .issues.join("\n  - ")
)]
pub struct ValidationError {
    pub issues: Vec<String>,
}

/// Load and validate the endpoint configuration document.
pub fn load(path: &str) -> Result<Vec<EndpointSpec>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read endpoint configuration from {}", path))?;
    let document: EndpointDocument =
        serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path))?;
    Ok(validate(document)?)
}

/// Validate a parsed endpoint document into an immutable EndpointSpec set.
pub fn validate(document: EndpointDocument) -> Result<Vec<EndpointSpec>, ValidationError> {
    let mut issues = Vec::new();
    let mut specs = Vec::with_capacity(document.endpoints.len());
    let mut seen: HashMap<(String, Method), usize> = HashMap::new();

    for (index, raw) in document.endpoints.into_iter().enumerate() {
        let entry = format!("entry {} ({} {})", index, raw.method, raw.path);

        if raw.path.is_empty() || !raw.path.starts_with('/') {
            issues.push(format!("{}: path must start with '/'", entry));
        } else if routes::RESERVED.contains(&raw.path.as_str()) {
            issues.push(format!(
                "{}: path '{}' is reserved by the gateway",
                entry, raw.path
            ));
        }

        let method = match Method::parse(&raw.method) {
            Some(method) => Some(method),
            None => {
                issues.push(format!(
                    "{}: unknown HTTP method '{}' (expected GET/POST/PUT/DELETE/PATCH)",
                    entry, raw.method
                ));
                None
            }
        };

        if raw.function.trim().is_empty() {
            issues.push(format!("{}: function identifier must not be empty", entry));
        }

        if let Some(method) = method {
            match seen.get(&(raw.path.clone(), method)) {
                Some(first) => issues.push(format!(
                    "{}: duplicates the (path, method) of entry {}",
                    entry, first
                )),
                None => {
                    seen.insert((raw.path.clone(), method), index);
                }
            }
        }

        let mut params = Vec::with_capacity(raw.params.len());
        let mut param_names: HashSet<String> = HashSet::new();
        for param in raw.params {
            if param.name.is_empty() {
                issues.push(format!("{}: parameter with empty name", entry));
                continue;
            }
            if !param_names.insert(param.name.clone()) {
                issues.push(format!(
                    "{}: duplicate parameter name '{}'",
                    entry, param.name
                ));
            }

            let ty = match ParamType::parse(&param.ty) {
                Some(ty) => ty,
                None => {
                    issues.push(format!(
                        "{}: parameter '{}' has unknown type '{}' (expected string/int/float/bool/list)",
                        entry, param.name, param.ty
                    ));
                    continue;
                }
            };

            if let Some(default) = &param.default {
                if param.required {
                    issues.push(format!(
                        "{}: parameter '{}' is required and must not declare a default",
                        entry, param.name
                    ));
                }
                match coerce::json_value_text(default) {
                    Some(text) => {
                        if coerce::coerce(&param.name, &text, ty).is_err() {
                            issues.push(format!(
                                "{}: parameter '{}' default {} is not coercible to {}",
                                entry, param.name, default, ty.as_str()
                            ));
                        }
                    }
                    None => issues.push(format!(
                        "{}: parameter '{}' default {} is not a scalar or list of scalars",
                        entry, param.name, default
                    )),
                }
            }

            params.push(ParameterSpec {
                name: param.name,
                ty,
                required: param.required,
                default: param.default,
                description: param.description,
                send_if_empty: param.send_if_empty,
            });
        }

        if let Some(method) = method {
            specs.push(EndpointSpec {
                path: raw.path,
                method,
                function: raw.function,
                description: raw.description,
                tags: raw.tags,
                params,
                responses: raw.responses,
            });
        }
    }

    if issues.is_empty() {
        Ok(specs)
    } else {
        Err(ValidationError { issues })
    }
}
