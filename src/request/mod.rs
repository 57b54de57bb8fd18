//! Outbound request builder.
//!
//! Takes an effective Service Request configuration plus the caller's
//! runtime overrides and produces one fully-specified [`ApiRequest`].
//! The descriptor is built once per outbound call (every pagination page and
//! every child call gets its own) and never mutated after being handed to
//! the transport.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;
use uuid::Uuid;

use crate::auth::ResolvedAuth;
use crate::config::defaults;
use crate::config::{EffectiveSr, Provider};
use crate::error::ErrorContext;
use crate::{Error, Result};

/// Body payload of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    None,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Fully-specified HTTP request descriptor.
#[derive(Clone)]
pub struct ApiRequest {
    /// Correlation id; shared by every call of one pipeline run.
    pub run_id: String,
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            query: Vec::new(),
            body: RequestBody::None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Echo form for results and diagnostics. Credentials are redacted:
    /// the echo never carries an `Authorization` value or client secrets.
    pub fn echo(&self) -> Value {
        let headers: serde_json::Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| {
                let value = if k.eq_ignore_ascii_case("authorization") {
                    Value::String("[redacted]".to_string())
                } else {
                    Value::String(v.clone())
                };
                (k.clone(), value)
            })
            .collect();
        let body = match &self.body {
            RequestBody::None => Value::Null,
            RequestBody::Json(v) => v.clone(),
            RequestBody::Form(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let value = if k == "client_secret" || k == "password" {
                            "[redacted]".to_string()
                        } else {
                            v.clone()
                        };
                        (k.clone(), Value::String(value))
                    })
                    .collect(),
            ),
        };
        serde_json::json!({
            "run_id": self.run_id,
            "method": self.method,
            "url": self.url,
            "headers": headers,
            "query": Value::Object(
                self.query
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect()
            ),
            "body": body,
        })
    }
}

// Debug goes through the redacted echo so credentials never reach logs.
impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiRequest {}", self.echo())
    }
}

/// Build the outbound request for one cycle of a Service Request run.
///
/// Reserved placeholders (`{page}`, `{per_page}`, `{offset}`, `{search}`)
/// are substituted from the override map first, Service Request defaults
/// second. Overrides without a placeholder land as plain query parameters.
/// A missing or unparseable endpoint fails here, before any network call.
pub fn build_request(
    effective: &EffectiveSr,
    provider: &Provider,
    auth: &ResolvedAuth,
    overrides: &BTreeMap<String, String>,
    run_id: &str,
) -> Result<ApiRequest> {
    let url = resolve_endpoint(effective, provider)?;

    let substitutions = substitution_map(effective, overrides);
    let url = substitute(&url, &substitutions);

    // A parameter whose placeholder appears in the endpoint or a query
    // template is consumed there and never doubles as a bare parameter.
    let consumed = |name: &str| -> bool {
        let marker = defaults::placeholder(name);
        effective.endpoint.contains(&marker)
            || effective.query.values().any(|t| t.contains(&marker))
    };

    let mut query: Vec<(String, String)> = Vec::new();
    for (name, template) in &effective.query {
        query.push((name.clone(), substitute(template, &substitutions)));
    }

    for (name, value) in overrides {
        if consumed(name) {
            continue;
        }
        query.retain(|(existing, _)| existing != name);
        query.push((name.clone(), value.clone()));
    }

    // Paginated requests always carry their page-size parameter.
    if effective.pagination_type.is_some()
        && !consumed(defaults::PARAM_PER_PAGE)
        && !query.iter().any(|(k, _)| k == defaults::PARAM_PER_PAGE)
    {
        query.push((
            defaults::PARAM_PER_PAGE.to_string(),
            effective.per_page.to_string(),
        ));
    }

    let mut headers = effective.headers.clone();
    for value in headers.values_mut() {
        *value = substitute(value, &substitutions);
    }
    if let Some(value) = auth.header_value() {
        headers.insert("authorization".to_string(), value);
    }

    let body = match &effective.body {
        None => RequestBody::None,
        Some(template) => RequestBody::Json(substitute_value(template, &substitutions)),
    };

    Ok(ApiRequest {
        run_id: run_id.to_string(),
        method: effective.method.clone(),
        url,
        headers,
        query,
        body,
    })
}

fn resolve_endpoint(effective: &EffectiveSr, provider: &Provider) -> Result<String> {
    let endpoint = effective.endpoint.trim();
    if endpoint.is_empty() {
        return Err(Error::configuration_with_context(
            format!("service request '{}' has an empty endpoint", effective.name),
            ErrorContext::new()
                .with_field_path("service_request.endpoint")
                .with_source("request_builder"),
        ));
    }

    let absolute = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        let base = provider.base_url.as_deref().ok_or_else(|| {
            Error::configuration_with_context(
                format!(
                    "service request '{}' has relative endpoint '{}' but provider '{}' has no base_url",
                    effective.name, endpoint, provider.name
                ),
                ErrorContext::new()
                    .with_field_path("provider.base_url")
                    .with_source("request_builder"),
            )
        })?;
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    };

    // Placeholders are not valid URL characters; validate on a neutralized copy.
    let probe = absolute.replace('{', "_").replace('}', "_");
    Url::parse(&probe).map_err(|e| {
        Error::configuration_with_context(
            format!(
                "service request '{}' endpoint '{}' is not a valid URL: {}",
                effective.name, absolute, e
            ),
            ErrorContext::new()
                .with_field_path("service_request.endpoint")
                .with_source("request_builder"),
        )
    })?;

    Ok(absolute)
}

fn substitution_map(
    effective: &EffectiveSr,
    overrides: &BTreeMap<String, String>,
) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    map.insert(defaults::PARAM_PAGE.to_string(), "1".to_string());
    map.insert(
        defaults::PARAM_PER_PAGE.to_string(),
        effective.per_page.to_string(),
    );
    map.insert(defaults::PARAM_OFFSET.to_string(), "0".to_string());
    map.insert(defaults::PARAM_SEARCH.to_string(), String::new());
    for (k, v) in overrides {
        map.insert(k.clone(), v.clone());
    }
    map
}

fn substitute(template: &str, substitutions: &HashMap<String, String>) -> String {
    let mut out = template.to_string();
    for (name, value) in substitutions {
        out = out.replace(&defaults::placeholder(name), value);
    }
    out
}

fn substitute_value(template: &Value, substitutions: &HashMap<String, String>) -> Value {
    match template {
        Value::String(s) => Value::String(substitute(s, substitutions)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_value(v, substitutions))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, substitutions)))
                .collect(),
        ),
        other => other.clone(),
    }
}
