//! List/detail normalization: walks the decoded payload and applies the
//! resolved response keys, producing normalized item records plus top-level
//! metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::{EffectiveSr, ListFormatOption, ResponseKey, SrType};
use crate::error::ErrorContext;
use crate::resolve::ResolvedKeys;
use crate::utils::dot_path::render_string;
use crate::utils::DotPath;
use crate::{Error, Result};

/// Canonical rendering for parsed date keys.
const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalized result data: one record per list item, or a single record.
#[derive(Debug, Clone)]
pub enum NormalizedData {
    List(Vec<Value>),
    Detail(Value),
}

impl NormalizedData {
    pub fn len(&self) -> usize {
        match self {
            NormalizedData::List(items) => items.len(),
            NormalizedData::Detail(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NormalizedData::List(items) if items.is_empty())
    }

    pub fn into_value(self) -> Value {
        match self {
            NormalizedData::List(items) => Value::Array(items),
            NormalizedData::Detail(item) => item,
        }
    }
}

/// Output of one normalization pass over one payload.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    pub data: NormalizedData,
    pub extra_data: Map<String, Value>,
    /// Per-key and per-item notes: unresolved optional keys, skipped items.
    pub warnings: Vec<String>,
}

enum ItemOutcome {
    Done(Map<String, Value>),
    MissingRequired(String),
}

/// Normalize one decoded payload according to the Service Request type.
pub fn normalize(
    payload: &Value,
    effective: &EffectiveSr,
    keys: &ResolvedKeys,
    provider_name: &str,
) -> Result<NormalizeOutcome> {
    let mut warnings = Vec::new();
    let extra_data = extract_meta(payload, keys, &mut warnings);

    let data = if effective.sr_type.is_list() {
        match locate_list_node(payload, effective)? {
            Some(node) => {
                let items = normalize_items(&node, effective, keys, provider_name, &mut warnings)?;
                NormalizedData::List(items)
            }
            // Mixed type falls back to detail when the list node is absent.
            None => NormalizedData::Detail(normalize_detail(
                payload,
                effective,
                keys,
                provider_name,
                &mut warnings,
            )?),
        }
    } else {
        NormalizedData::Detail(normalize_detail(
            payload,
            effective,
            keys,
            provider_name,
            &mut warnings,
        )?)
    };

    Ok(NormalizeOutcome {
        data,
        extra_data,
        warnings,
    })
}

/// Strip keys flagged `show_in_response = false` from finished records.
///
/// Hidden keys stay resolved through normalization and child-request
/// derivation; they only disappear from the caller-facing output.
pub fn strip_hidden_keys(data: &mut NormalizedData, keys: &ResolvedKeys) {
    let hidden: Vec<&str> = keys
        .all()
        .iter()
        .filter(|k| !k.show_in_response)
        .map(|k| k.name.as_str())
        .collect();
    if hidden.is_empty() {
        return;
    }
    let strip = |value: &mut Value| {
        if let Value::Object(map) = value {
            for name in &hidden {
                map.remove(*name);
            }
        }
    };
    match data {
        NormalizedData::List(items) => items.iter_mut().for_each(strip),
        NormalizedData::Detail(item) => strip(item),
    }
}

/// Locate the iterable list node, applying the configured format option.
///
/// `Ok(None)` is only returned for `mixed` requests whose list node is
/// absent; a plain `list` request fails with a validation error naming the
/// Service Request and the missing key.
fn locate_list_node(payload: &Value, effective: &EffectiveSr) -> Result<Option<Value>> {
    let list_key = effective.list_key.as_deref().ok_or_else(|| {
        Error::configuration_with_context(
            format!(
                "service request '{}' has type {:?} but no list_key",
                effective.name, effective.sr_type
            ),
            ErrorContext::new()
                .with_field_path("service_request.list_key")
                .with_source("normalizer"),
        )
    })?;

    let node = match DotPath::get(payload, list_key) {
        Some(node) => node.clone(),
        None if effective.sr_type == SrType::Mixed => return Ok(None),
        None => {
            return Err(Error::validation_with_context(
                format!(
                    "service request '{}' ({}): list key '{}' not found in response payload",
                    effective.name, effective.id, list_key
                ),
                ErrorContext::new()
                    .with_field_path(list_key)
                    .with_source("normalizer"),
            ))
        }
    };

    match &effective.list_format_option {
        None => Ok(Some(node)),
        Some(option) => Ok(Some(apply_format_option(node, option, effective)?)),
    }
}

/// Coerce a raw string node into iterable form before parsing.
fn apply_format_option(
    node: Value,
    option: &ListFormatOption,
    effective: &EffectiveSr,
) -> Result<Value> {
    let raw = match node {
        Value::String(s) => s,
        // Already structured; nothing to coerce.
        other => return Ok(other),
    };

    let decoded = match option {
        ListFormatOption::JsonDecode => raw,
        ListFormatOption::RegexMatch { pattern, group } => {
            let re = Regex::new(pattern).map_err(|e| {
                Error::configuration_with_context(
                    format!(
                        "service request '{}' has an invalid list format pattern: {}",
                        effective.name, e
                    ),
                    ErrorContext::new()
                        .with_field_path("service_request.list_format_option.pattern")
                        .with_source("normalizer"),
                )
            })?;
            let captures = re.captures(&raw).ok_or_else(|| {
                Error::validation_with_context(
                    format!(
                        "service request '{}': list format pattern matched nothing",
                        effective.name
                    ),
                    ErrorContext::new().with_source("normalizer"),
                )
            })?;
            captures
                .get(*group)
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    Error::validation_with_context(
                        format!(
                            "service request '{}': list format pattern has no group {}",
                            effective.name, group
                        ),
                        ErrorContext::new().with_source("normalizer"),
                    )
                })?
        }
    };

    serde_json::from_str(&decoded).map_err(|e| {
        Error::validation_with_context(
            format!(
                "service request '{}': list node did not JSON-decode: {}",
                effective.name, e
            ),
            ErrorContext::new().with_source("normalizer"),
        )
    })
}

fn normalize_items(
    node: &Value,
    effective: &EffectiveSr,
    keys: &ResolvedKeys,
    provider_name: &str,
    warnings: &mut Vec<String>,
) -> Result<Vec<Value>> {
    let raw_items: Vec<Value> = match node {
        Value::Array(items) => items.clone(),
        // Keyed collections iterate over their values.
        Value::Object(map) => map.values().cloned().collect(),
        _ => {
            return Err(Error::validation_with_context(
                format!(
                    "service request '{}' ({}): list key '{}' does not resolve to an iterable node",
                    effective.name,
                    effective.id,
                    effective.list_key.as_deref().unwrap_or_default()
                ),
                ErrorContext::new().with_source("normalizer"),
            ))
        }
    };

    // Items nested one level further inside each element.
    let raw_items: Vec<Value> = match &effective.list_item_repeater_key {
        None => raw_items,
        Some(repeater) => {
            let mut expanded = Vec::with_capacity(raw_items.len());
            for (index, element) in raw_items.into_iter().enumerate() {
                match DotPath::get(&element, repeater) {
                    Some(Value::Array(nested)) => expanded.extend(nested.iter().cloned()),
                    Some(nested) => expanded.push(nested.clone()),
                    None => {
                        warnings.push(format!(
                            "item {}: repeater key '{}' absent, using element as-is",
                            index, repeater
                        ));
                        expanded.push(element);
                    }
                }
            }
            expanded
        }
    };

    let item_keys: Vec<&ResponseKey> = keys.item_keys().collect();
    let mut items = Vec::with_capacity(raw_items.len());
    for (index, raw_item) in raw_items.iter().enumerate() {
        match apply_keys(raw_item, &item_keys, warnings, &format!("item {}", index)) {
            ItemOutcome::Done(mut record) => {
                record.insert(
                    "provider".to_string(),
                    Value::String(provider_name.to_string()),
                );
                items.push(Value::Object(record));
            }
            ItemOutcome::MissingRequired(key_name) => {
                // Partial success: the item is skipped, siblings continue.
                warnings.push(format!(
                    "item {} skipped: required key '{}' absent",
                    index, key_name
                ));
                warn!(
                    service_request = effective.name.as_str(),
                    item = index,
                    key = key_name.as_str(),
                    "item skipped, required key absent"
                );
            }
        }
    }
    Ok(items)
}

fn normalize_detail(
    payload: &Value,
    effective: &EffectiveSr,
    keys: &ResolvedKeys,
    provider_name: &str,
    warnings: &mut Vec<String>,
) -> Result<Value> {
    let item_keys: Vec<&ResponseKey> = keys.item_keys().collect();
    match apply_keys(payload, &item_keys, warnings, "detail") {
        ItemOutcome::Done(mut record) => {
            record.insert(
                "provider".to_string(),
                Value::String(provider_name.to_string()),
            );
            Ok(Value::Object(record))
        }
        // Detail runs have no siblings to fall back on.
        ItemOutcome::MissingRequired(key_name) => Err(Error::validation_with_context(
            format!(
                "service request '{}' ({}): required key '{}' absent from response payload",
                effective.name, effective.id, key_name
            ),
            ErrorContext::new()
                .with_field_path(key_name)
                .with_source("normalizer"),
        )),
    }
}

fn extract_meta(
    payload: &Value,
    keys: &ResolvedKeys,
    warnings: &mut Vec<String>,
) -> Map<String, Value> {
    let meta_keys: Vec<&ResponseKey> = keys.meta_keys().collect();
    match apply_keys(payload, &meta_keys, warnings, "extra_data") {
        ItemOutcome::Done(map) => map,
        ItemOutcome::MissingRequired(key_name) => {
            warnings.push(format!("extra data key '{}' absent", key_name));
            Map::new()
        }
    }
}

fn apply_keys(
    source: &Value,
    keys: &[&ResponseKey],
    warnings: &mut Vec<String>,
    label: &str,
) -> ItemOutcome {
    let mut record = Map::new();
    for key in keys {
        match resolve_key_value(source, key, warnings, label) {
            Some(value) => {
                record.insert(key.name.clone(), value);
            }
            None if key.required => return ItemOutcome::MissingRequired(key.name.clone()),
            None => {
                warnings.push(format!("{}: key '{}' not resolved, omitted", label, key.name));
            }
        }
    }
    ItemOutcome::Done(record)
}

fn resolve_key_value(
    source: &Value,
    key: &ResponseKey,
    warnings: &mut Vec<String>,
    label: &str,
) -> Option<Value> {
    if let Some(ref literal) = key.custom_value {
        return Some(decorate(literal.clone(), key));
    }

    let path = key.value.as_deref()?;
    let mut value = DotPath::get(source, path)?.clone();

    if !key.array_keys.is_empty() {
        if let Value::Array(elements) = value {
            let nested: Vec<&ResponseKey> = key.array_keys.iter().collect();
            let mut out = Vec::with_capacity(elements.len());
            for element in &elements {
                match apply_keys(element, &nested, warnings, label) {
                    ItemOutcome::Done(map) => out.push(Value::Object(map)),
                    ItemOutcome::MissingRequired(name) => {
                        warnings.push(format!(
                            "{}: sub-array element of '{}' missing required '{}', omitted",
                            label, key.name, name
                        ));
                    }
                }
            }
            return Some(Value::Array(out));
        }
        return Some(decorate(value, key));
    }

    if key.is_date {
        value = reparse_date(value, key.date_format.as_deref());
    }

    Some(decorate(value, key))
}

/// Parse a date key with its configured format and re-render canonically.
/// Parse failure leaves the raw value untouched; it never aborts.
fn reparse_date(value: Value, format: Option<&str>) -> Value {
    let raw = match &value {
        Value::String(s) => s.clone(),
        _ => return value,
    };
    let format = match format {
        Some(f) => f,
        None => return value,
    };

    if let Ok(dt) = DateTime::parse_from_str(&raw, format) {
        return Value::String(dt.naive_local().format(CANONICAL_DATE_FORMAT).to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&raw, format) {
        return Value::String(dt.format(CANONICAL_DATE_FORMAT).to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(&raw, format) {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Value::String(dt.format(CANONICAL_DATE_FORMAT).to_string());
        }
    }
    value
}

/// Append/prepend string decorations, applied after extraction.
fn decorate(value: Value, key: &ResponseKey) -> Value {
    if key.append_extra_data_value.is_none() && key.prepend_extra_data_value.is_none() {
        return value;
    }
    let mut out = String::new();
    if let Some(ref prefix) = key.prepend_extra_data_value {
        out.push_str(prefix);
    }
    out.push_str(&render_string(&value));
    if let Some(ref suffix) = key.append_extra_data_value {
        out.push_str(suffix);
    }
    Value::String(out)
}
