//! Service Requests: one configured, runnable API call definition, with
//! parent-chain configuration inheritance.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::defaults;
use super::response_key::ResponseKey;
use super::ConfigSnapshot;
use crate::error::ErrorContext;
use crate::{Error, Result};

/// Shape of the expected result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SrType {
    /// Iterable node at `list_key`, one normalized record per element.
    List,
    Single,
    Detail,
    /// List node when present, detail fallback otherwise.
    Mixed,
}

impl SrType {
    pub fn is_list(self) -> bool {
        matches!(self, SrType::List | SrType::Mixed)
    }
}

/// Multi-page fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationType {
    /// Page-number increment per cycle.
    Page,
    /// Row-offset increment per cycle.
    Offset,
}

/// Post-extraction transform coercing a raw list substring into iterable
/// form before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListFormatOption {
    /// Run the regex over the raw string and JSON-decode the capture group.
    RegexMatch {
        pattern: String,
        #[serde(default = "default_group")]
        group: usize,
    },
    /// JSON-decode a string node into its structured form.
    JsonDecode,
}

fn default_group() -> usize {
    1
}

/// One configured call unit, as authored. Optional fields inherit from the
/// parent chain; [`ServiceRequest::resolve_effective`] produces the flattened
/// view a run works from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: u64,
    pub name: String,
    pub provider_id: u64,
    pub service_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sr_type: Option<SrType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_type: Option<PaginationType>,
    /// Absolute URL, or a path joined to the provider's base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Query template defaults; values may carry reserved placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Dot-path to the array-of-items node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_key: Option<String>,
    /// Items nested one level further inside each list element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_item_repeater_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_format_option: Option<ListFormatOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Sr-level response-key overrides (win wholesale by name over the
    /// Service-level vocabulary).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_keys: Vec<ResponseKey>,
}

/// Flattened Service Request configuration after parent-chain inheritance.
#[derive(Debug, Clone)]
pub struct EffectiveSr {
    pub id: u64,
    pub name: String,
    pub provider_id: u64,
    pub service_id: u64,
    pub sr_type: SrType,
    pub pagination_type: Option<PaginationType>,
    pub endpoint: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub list_key: Option<String>,
    pub list_item_repeater_key: Option<String>,
    pub list_format_option: Option<ListFormatOption>,
    pub per_page: u32,
    /// Sr-level overrides accumulated across the chain (nearest wins).
    pub response_keys: Vec<ResponseKey>,
}

impl ServiceRequest {
    /// Flatten this Service Request against its parent chain.
    ///
    /// The chain is a strict tree: revisiting an id is a configuration
    /// error, not an infinite loop. A child's set field always wins over an
    /// ancestor's; headers and query templates merge entry-wise the same way.
    pub fn resolve_effective(&self, snapshot: &ConfigSnapshot) -> Result<EffectiveSr> {
        let mut visited: HashSet<u64> = HashSet::new();
        visited.insert(self.id);

        let mut sr_type = self.sr_type;
        let mut pagination_type = self.pagination_type;
        let mut endpoint = self.endpoint.clone();
        let mut method = self.method.clone();
        let mut headers = self.headers.clone();
        let mut query = self.query.clone();
        let mut body = self.body.clone();
        let mut list_key = self.list_key.clone();
        let mut repeater = self.list_item_repeater_key.clone();
        let mut format_option = self.list_format_option.clone();
        let mut per_page = self.per_page;
        let mut response_keys = self.response_keys.clone();

        let mut cursor = self.parent_id;
        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id) {
                return Err(Error::configuration_with_context(
                    format!(
                        "service request '{}' has a cycle in its parent chain at {}",
                        self.name, parent_id
                    ),
                    ErrorContext::new()
                        .with_field_path(format!("service_requests[{}].parent_id", self.id))
                        .with_source("config"),
                ));
            }
            let parent = snapshot.service_request(parent_id)?;

            sr_type = sr_type.or(parent.sr_type);
            pagination_type = pagination_type.or(parent.pagination_type);
            endpoint = endpoint.or_else(|| parent.endpoint.clone());
            method = method.or_else(|| parent.method.clone());
            for (k, v) in &parent.headers {
                headers.entry(k.clone()).or_insert_with(|| v.clone());
            }
            for (k, v) in &parent.query {
                query.entry(k.clone()).or_insert_with(|| v.clone());
            }
            body = body.or_else(|| parent.body.clone());
            list_key = list_key.or_else(|| parent.list_key.clone());
            repeater = repeater.or_else(|| parent.list_item_repeater_key.clone());
            format_option = format_option.or_else(|| parent.list_format_option.clone());
            per_page = per_page.or(parent.per_page);
            for key in &parent.response_keys {
                if !response_keys.iter().any(|k| k.name == key.name) {
                    response_keys.push(key.clone());
                }
            }

            cursor = parent.parent_id;
        }

        let sr_type = sr_type.ok_or_else(|| {
            Error::configuration_with_context(
                format!("service request '{}' has no type", self.name),
                ErrorContext::new()
                    .with_field_path(format!("service_requests[{}].sr_type", self.id))
                    .with_source("config"),
            )
        })?;
        let endpoint = endpoint.ok_or_else(|| {
            Error::configuration_with_context(
                format!("service request '{}' has no endpoint", self.name),
                ErrorContext::new()
                    .with_field_path(format!("service_requests[{}].endpoint", self.id))
                    .with_source("config"),
            )
        })?;

        Ok(EffectiveSr {
            id: self.id,
            name: self.name.clone(),
            provider_id: self.provider_id,
            service_id: self.service_id,
            sr_type,
            pagination_type,
            endpoint,
            method: method.unwrap_or_else(|| "GET".to_string()),
            headers,
            query,
            body,
            list_key,
            list_item_repeater_key: repeater,
            list_format_option: format_option,
            per_page: per_page.unwrap_or(defaults::DEFAULT_PER_PAGE),
            response_keys,
        })
    }
}
