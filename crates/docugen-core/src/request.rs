use crate::FieldValues;
use crate::error::{DocuGenError, Result};
use crate::integrations::registry::{FieldSpec, FieldType, Registry, ResourceKind, RoutingTarget};
use crate::integrations::visibility::{loosely_equal, visible_fields};
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Map, Number, Value, json};
use std::collections::HashMap;
use url::Url;

/// Caller-supplied input for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RequestInput {
    pub fields: FieldValues,
    /// Extra headers. Headers declared by the operation win over these.
    pub headers: HeaderMap,
}

impl RequestInput {
    pub fn new(fields: FieldValues) -> Self {
        Self {
            fields,
            headers: HeaderMap::new(),
        }
    }
}

impl From<FieldValues> for RequestInput {
    fn from(fields: FieldValues) -> Self {
        Self::new(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    Multipart,
}

/// Fully resolved outbound request.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestPlan {
    pub fn encoding(&self) -> BodyEncoding {
        let multipart = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));
        if multipart {
            BodyEncoding::Multipart
        } else {
            BodyEncoding::Json
        }
    }

    /// JSON rendering for display. The `Authorization` header is masked.
    pub fn to_json(&self) -> Value {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == AUTHORIZATION {
                    "***".to_string()
                } else {
                    value.to_str().unwrap_or("").to_string()
                };
                (name.to_string(), Value::String(shown))
            })
            .collect();

        json!({
            "method": self.method.as_str(),
            "url": self.url.as_str(),
            "headers": headers,
            "body": self.body.clone().unwrap_or(Value::Null),
        })
    }
}

/// Builds the request for `resource`/`operation` from the supplied values.
///
/// Only fields visible for the supplied snapshot take part. Nothing is sent.
pub fn build_request(
    registry: &Registry,
    base_url: &Url,
    resource: ResourceKind,
    operation: &str,
    input: &RequestInput,
) -> Result<RequestPlan> {
    let spec = registry.operation(resource, operation)?;
    let fields = registry.fields(resource, operation)?;

    let mut path_params: HashMap<&str, String> = HashMap::new();
    let mut query: Vec<(&str, String)> = Vec::new();
    let mut body = Map::new();

    for field in visible_fields(fields, resource, operation, &input.fields) {
        let Some(raw) = input.fields.get(&field.name).filter(|v| is_present(v)) else {
            if field.required {
                return Err(DocuGenError::missing(&field.name));
            }
            continue;
        };

        let value = coerce(field, raw)?;
        let Some(routing) = &field.routing else {
            continue;
        };

        match routing.target {
            RoutingTarget::Path => {
                path_params.insert(routing.key.as_str(), scalar_text(&value));
            }
            RoutingTarget::Query => query.push((routing.key.as_str(), scalar_text(&value))),
            RoutingTarget::Body => {
                let path: Vec<&str> = routing.key.split('.').collect();
                insert_path(&mut body, &path, value);
            }
        }
    }

    let mut url = resolve_url(base_url, &spec.url_template, &path_params)?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in &query {
            pairs.append_pair(key, value);
        }
    }

    let mut headers = input.headers.clone();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in &spec.extra_headers {
        headers.insert(name.clone(), value.clone());
    }

    let body = if body.is_empty() {
        None
    } else {
        Some(Value::Object(body))
    };

    tracing::debug!(
        method = %spec.method,
        url = %url,
        has_body = body.is_some(),
        "Built request plan"
    );

    Ok(RequestPlan {
        method: spec.method.clone(),
        url,
        headers,
        body,
    })
}

/// Appends the template's segments to `base`, substituting `{name}`
/// placeholders. Every segment is percent-encoded.
pub(crate) fn resolve_url(
    base: &Url,
    template: &str,
    params: &HashMap<&str, String>,
) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            DocuGenError::configuration(format!("base URL '{}' cannot carry a path", base))
        })?;
        segments.pop_if_empty();
        for raw in template.split('/').filter(|s| !s.is_empty()) {
            segments.push(&substitute(raw, params)?);
        }
    }
    Ok(url)
}

fn substitute(segment: &str, params: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after[..end];
        let value = params.get(name).ok_or_else(|| DocuGenError::missing(name))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn insert_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Null and empty strings count as unset.
pub(crate) fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a supplied value to the field's declared type.
fn coerce(field: &FieldSpec, raw: &Value) -> Result<Value> {
    match field.field_type {
        FieldType::String => match raw {
            Value::String(_) => Ok(raw.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(DocuGenError::invalid(&field.name, "expected text")),
        },
        FieldType::Number => match raw {
            Value::Number(_) => Ok(raw.clone()),
            Value::String(s) => parse_number(s.trim())
                .ok_or_else(|| DocuGenError::invalid(&field.name, format!("'{}' is not a number", s))),
            _ => Err(DocuGenError::invalid(&field.name, "expected a number")),
        },
        FieldType::Boolean => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(DocuGenError::invalid(
                    &field.name,
                    format!("'{}' is not a boolean", s),
                )),
            },
            _ => Err(DocuGenError::invalid(&field.name, "expected a boolean")),
        },
        FieldType::Json => match raw {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| DocuGenError::invalid(&field.name, format!("invalid JSON: {}", e))),
            other => Ok(other.clone()),
        },
        FieldType::Options => {
            if field.load_options_method.is_some() || field.options.is_empty() {
                return match raw {
                    Value::String(_) => Ok(raw.clone()),
                    Value::Number(n) => Ok(Value::String(n.to_string())),
                    _ => Err(DocuGenError::invalid(&field.name, "expected an option value")),
                };
            }
            field
                .options
                .iter()
                .find(|o| loosely_equal(&o.value, raw))
                .map(|o| o.value.clone())
                .ok_or_else(|| {
                    DocuGenError::invalid(&field.name, format!("{} is not an allowed option", raw))
                })
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}
