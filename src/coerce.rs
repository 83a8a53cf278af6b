use serde_json::Value as JsonValue;

use crate::endpoints::{ParamType, ParameterSpec};
use crate::error::ApiError;

/// A request value after coercion to its declared type
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

/// Values supplied with one inbound request, keyed by parameter name.
///
/// Body values take precedence over query-string values for the methods
/// that carry a body; for GET/DELETE the body set is simply empty.
#[derive(Debug, Default)]
pub struct RequestValues {
    query: Vec<(String, String)>,
    body: Vec<(String, String)>,
}

impl RequestValues {
    pub fn new(query: Vec<(String, String)>, body: Vec<(String, String)>) -> Self {
        Self { query, body }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.body
            .iter()
            .chain(self.query.iter())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Lookup restricted to the query string (token resolution only).
    pub fn get_query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All supplied pairs, body first, in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.body
            .iter()
            .chain(self.query.iter())
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Coerce a textual request value to its declared type.
pub fn coerce(name: &str, raw: &str, ty: ParamType) -> Result<CoercedValue, ApiError> {
    match ty {
        ParamType::Str => Ok(CoercedValue::Str(raw.to_string())),
        ParamType::Int => raw.trim().parse::<i64>().map(CoercedValue::Int).map_err(|_| {
            ApiError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected an integer, got '{}'", raw),
            }
        }),
        ParamType::Float => raw
            .trim()
            .parse::<f64>()
            .map(CoercedValue::Float)
            .map_err(|_| ApiError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected a number, got '{}'", raw),
            }),
        ParamType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(CoercedValue::Bool(true)),
            "false" | "0" | "no" => Ok(CoercedValue::Bool(false)),
            _ => Err(ApiError::InvalidParameter {
                name: name.to_string(),
                reason: format!("expected true/1/yes or false/0/no, got '{}'", raw),
            }),
        },
        ParamType::List => Ok(CoercedValue::List(split_list(raw))),
    }
}

/// Split a comma-separated value into an ordered list of trimmed items.
/// An empty input is an empty list.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render a JSON value (a declared default, or a JSON body field) as the
/// textual form the coercion rules operate on. Returns None for values
/// with no textual form (nested objects, arrays of non-scalars, null).
pub fn json_value_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    JsonValue::String(s) => parts.push(s.clone()),
                    JsonValue::Number(n) => parts.push(n.to_string()),
                    JsonValue::Bool(b) => parts.push(b.to_string()),
                    _ => return None,
                }
            }
            Some(parts.join(","))
        }
        _ => None,
    }
}

/// Apply the coercion rules of every declared parameter against the
/// supplied request values.
///
/// A supplied empty string counts as absent, matching how Moodle treats
/// empty query values; a parameter declared with send_if_empty still goes
/// out as an empty string in that case.
pub fn collect(
    specs: &[ParameterSpec],
    values: &RequestValues,
) -> Result<Vec<(String, CoercedValue)>, ApiError> {
    let mut out = Vec::with_capacity(specs.len());

    for spec in specs {
        let supplied = values.get(&spec.name).filter(|value| !value.is_empty());
        match supplied {
            Some(raw) => out.push((spec.name.clone(), coerce(&spec.name, raw, spec.ty)?)),
            None => {
                if let Some(default) = &spec.default {
                    // Coercibility was checked at startup validation.
                    let text = json_value_text(default).unwrap_or_default();
                    out.push((spec.name.clone(), coerce(&spec.name, &text, spec.ty)?));
                } else if spec.required {
                    return Err(ApiError::MissingParameter(spec.name.clone()));
                } else if spec.send_if_empty {
                    out.push((spec.name.clone(), CoercedValue::Str(String::new())));
                }
            }
        }
    }

    Ok(out)
}

/// Encode one coerced value into Moodle REST wire pairs.
///
/// Booleans become 1/0 and lists expand to indexed names
/// (name[0]=a&name[1]=b), the array format the Moodle REST server expects.
pub fn encode(name: &str, value: &CoercedValue, out: &mut Vec<(String, String)>) {
    match value {
        CoercedValue::Str(s) => out.push((name.to_string(), s.clone())),
        CoercedValue::Int(i) => out.push((name.to_string(), i.to_string())),
        CoercedValue::Float(f) => out.push((name.to_string(), f.to_string())),
        CoercedValue::Bool(b) => {
            out.push((name.to_string(), if *b { "1" } else { "0" }.to_string()))
        }
        CoercedValue::List(items) => {
            for (idx, item) in items.iter().enumerate() {
                out.push((format!("{}[{}]", name, idx), item.clone()));
            }
        }
    }
}

pub fn encode_all(params: &[(String, CoercedValue)], out: &mut Vec<(String, String)>) {
    for (name, value) in params {
        encode(name, value, out);
    }
}
