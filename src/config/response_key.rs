//! Response keys: declarative mappings from normalized output field names to
//! source expressions against the raw payload, plus the child-request
//! bindings that hang off them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One declarative field mapping.
///
/// Service-level entries form the default vocabulary; a Service Request may
/// override a subset with its own entries, which win wholesale by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseKey {
    /// Normalized output field name.
    pub name: String,
    /// Source expression (dot-notation path, e.g. "attribute.price" or
    /// "items.0.title"). Unused when `custom_value` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Include this key in the normalized output.
    #[serde(default = "default_true")]
    pub show_in_response: bool,
    /// Applies within list items (true) vs. top-level metadata (false).
    #[serde(default = "default_true")]
    pub list_item: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub search_priority: i32,
    /// Value requires date parsing with `date_format`.
    #[serde(default)]
    pub is_date: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    /// Literal output value, echoed instead of extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_extra_data_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend_extra_data_value: Option<String>,
    /// For keys resolving to sub-arrays: nested mappings applied to each
    /// element of the sub-array.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_keys: Vec<ResponseKey>,
    /// Absent key aborts normalization of the item instead of being omitted
    /// with a warning.
    #[serde(default)]
    pub required: bool,
    /// Follow-up request binding, if this key is populated by a secondary
    /// Service Request run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<ChildBinding>,
}

fn default_true() -> bool {
    true
}

impl ResponseKey {
    /// Minimal extraction mapping; everything else at its default.
    pub fn mapped(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            show_in_response: true,
            list_item: true,
            searchable: false,
            search_priority: 0,
            is_date: false,
            date_format: None,
            custom_value: None,
            append_extra_data_value: None,
            prepend_extra_data_value: None,
            array_keys: Vec::new(),
            required: false,
            child: None,
        }
    }

    /// Top-level metadata mapping (`list_item = false`).
    pub fn meta(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut key = Self::mapped(name, value);
        key.list_item = false;
        key
    }
}

/// What to do with a secondary result when folding it back into the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildAction {
    /// Merge the fetched fields into the existing value under the key.
    Merge,
    /// Replace the value under the key wholesale.
    Replace,
}

impl Default for ChildAction {
    fn default() -> Self {
        ChildAction::Merge
    }
}

/// Binding of a response key to a secondary Service Request.
///
/// Authored in the admin layer; read-only for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildBinding {
    /// The secondary Service Request to run.
    pub service_request_id: u64,
    #[serde(default)]
    pub action: ChildAction,
    /// One follow-up call for the whole batch (true) vs. one per item (false).
    #[serde(default)]
    pub single_request: bool,
    /// Kill-switch without deleting the configuration.
    #[serde(default)]
    pub disable_request: bool,
    /// Child query parameter name → source path in the parent extraction
    /// (per item, or top-level for batch mode).
    #[serde(default)]
    pub request_response_keys: BTreeMap<String, String>,
    /// Parent output field name → path in the child's normalized result.
    #[serde(default)]
    pub response_response_keys: BTreeMap<String, String>,
    /// Batch mode: parent item path whose value selects the matching child
    /// record. Without it the batch result is broadcast to every item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_parent_key: Option<String>,
    /// Batch mode: path within a child record matched against
    /// `join_parent_key`'s value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_child_key: Option<String>,
}
