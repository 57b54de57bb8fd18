//! Terminal result types: exactly one [`ApiResponse`] per pipeline run.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::PaginationType;
use crate::content::ContentKind;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// A secondary-request failure, recorded against the item/key it affected.
#[derive(Debug, Clone, Serialize)]
pub struct ChildFailure {
    /// Response key the child binding hangs off.
    pub key: String,
    /// Affected item, or `None` for batch-level failures.
    pub item_index: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub pages_fetched: u32,
    pub http_calls: u32,
    pub child_calls: u32,
    pub duration_ms: u64,
}

/// Non-fatal findings of one run: per-key omissions, skipped items,
/// isolated child-request failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDiagnostics {
    pub warnings: Vec<String>,
    pub child_failures: Vec<ChildFailure>,
    pub stats: RunStats,
}

/// The one terminal result a caller sees per run.
///
/// A run may perform many HTTP calls (pagination cycles, child requests,
/// token acquisition) but produces exactly one of these. Error results keep
/// a human-readable message plus the echoed request/response for
/// reproduction; credentials never appear in the echoes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub content_type: Option<ContentKind>,
    pub provider: Option<String>,
    pub request_service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub request_data: Value,
    pub extra_data: Map<String, Value>,
    pub pagination_type: Option<PaginationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_request_echo: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response_echo: Option<Value>,
    pub diagnostics: RunDiagnostics,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Items for a list run, as a slice (empty for error results).
    pub fn items(&self) -> &[Value] {
        self.request_data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn from_error(error: Error, api_request_echo: Option<Value>) -> Self {
        let message = error.to_string();
        let (request_echo, response_echo) = match error {
            Error::Authentication {
                request_echo,
                response_echo,
                ..
            } => (request_echo, response_echo),
            Error::Remote { response_echo, .. } => (None, response_echo),
            Error::Content {
                raw_body,
                content_type,
                ..
            } => (
                None,
                Some(serde_json::json!({
                    "content_type": content_type,
                    "body": raw_body,
                })),
            ),
            _ => (None, None),
        };
        Self {
            status: RunStatus::Error,
            message: Some(message),
            content_type: None,
            provider: None,
            request_service: None,
            category: None,
            request_data: Value::Null,
            extra_data: Map::new(),
            pagination_type: None,
            api_request_echo: request_echo.or(api_request_echo),
            raw_response_echo: response_echo,
            diagnostics: RunDiagnostics::default(),
        }
    }
}
