//! AI-assisted key-mapping: given a raw sample response and the registered
//! target key vocabulary, ask a pluggable AI backend to propose a mapping
//! from raw payload fields to target keys.
//!
//! The uniqueness invariant is enforced here, client-side, regardless of
//! backend: a target key appears as a mapping value at most once; any later
//! duplicate is routed to new-key creation instead. Backend failures abort
//! the operation with the raw diagnostic preserved — never a silent empty
//! mapping.

mod backends;

use keyring::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use tracing::info;

use backends::AssistBackend;

use crate::transport::HttpTransport;
use crate::{Error, Result};

/// The closed set of supported AI backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiBackendKind {
    Gemini,
    OpenAi,
    DeepSeek,
    Grok,
}

impl AiBackendKind {
    fn backend(self) -> &'static dyn AssistBackend {
        match self {
            AiBackendKind::Gemini => &backends::GEMINI,
            AiBackendKind::OpenAi => &backends::OPENAI,
            AiBackendKind::DeepSeek => &backends::DEEPSEEK,
            AiBackendKind::Grok => &backends::GROK,
        }
    }

    pub fn id(self) -> &'static str {
        self.backend().id()
    }
}

/// Proposed mapping from raw payload field names to target key names, plus
/// suggested new keys for raw fields nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingProposal {
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub new_keys: Vec<String>,
}

/// Key-mapping assistant over one configured backend.
pub struct KeyMappingAssistant {
    backend: AiBackendKind,
    api_key: Option<String>,
    model: Option<String>,
    base_url_override: Option<String>,
}

impl KeyMappingAssistant {
    pub fn new(backend: AiBackendKind) -> Self {
        Self {
            backend,
            api_key: None,
            model: None,
            base_url_override: None,
        }
    }

    /// Inject the API key explicitly (otherwise keyring, then environment).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the backend base URL (primarily for mock-server tests).
    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Propose a key mapping for a sample payload.
    pub async fn propose(
        &self,
        transport: &HttpTransport,
        sample: &Value,
        target_keys: &[String],
    ) -> Result<MappingProposal> {
        let backend = self.backend.backend();
        let api_key = self.resolve_api_key(backend)?;
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| backend.default_model().to_string());
        let base_url = self
            .base_url_override
            .clone()
            .unwrap_or_else(|| backend.default_base_url().to_string());

        let prompt = build_prompt(sample, target_keys);
        let request = backend.build_request(&base_url, &api_key, &model, &prompt);
        let response = transport.execute(request).await?;

        if !response.is_success() {
            return Err(Error::AiBackend {
                backend: backend.id().to_string(),
                message: format!("backend returned HTTP {}", response.status),
                raw: Some(response.body_text()),
            });
        }

        let body: Value =
            serde_json::from_slice(&response.body).map_err(|e| Error::AiBackend {
                backend: backend.id().to_string(),
                message: format!("backend response is not valid JSON: {}", e),
                raw: Some(response.body_text()),
            })?;

        let completion = backend
            .extract_completion(&body)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::AiBackend {
                backend: backend.id().to_string(),
                message: "backend returned an empty completion".to_string(),
                raw: Some(response.body_text()),
            })?;

        let proposal = parse_completion(&completion).map_err(|message| Error::AiBackend {
            backend: backend.id().to_string(),
            message,
            raw: Some(completion.clone()),
        })?;

        let proposal = enforce_unique_targets(proposal);
        info!(
            backend = backend.id(),
            mapped = proposal.mapping.len(),
            new_keys = proposal.new_keys.len(),
            "key mapping proposed"
        );
        Ok(proposal)
    }

    /// Explicit key first, then keyring, then `<BACKEND>_API_KEY`.
    fn resolve_api_key(&self, backend: &dyn AssistBackend) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        if let Ok(entry) = Entry::new("sr-pipeline", backend.id()) {
            if let Ok(key) = entry.get_password() {
                return Ok(key);
            }
        }
        let env_var = format!("{}_API_KEY", backend.id().to_uppercase());
        env::var(&env_var).map_err(|_| {
            Error::configuration(format!(
                "no API key for backend '{}' (explicit, keyring, or {})",
                backend.id(),
                env_var
            ))
        })
    }
}

fn build_prompt(sample: &Value, target_keys: &[String]) -> String {
    format!(
        "You map raw API response fields onto a fixed vocabulary of target keys.\n\
         Target keys: {}\n\
         Sample response:\n{}\n\
         Reply with strict JSON only, shaped as \
         {{\"mapping\": {{\"<raw field>\": \"<target key>\"}}, \"new_keys\": [\"<raw field>\"]}}. \
         Map each raw field to at most one target key; list raw fields with no \
         matching target key under new_keys.",
        target_keys.join(", "),
        serde_json::to_string_pretty(sample).unwrap_or_else(|_| sample.to_string()),
    )
}

/// Parse the completion as JSON, tolerating markdown code fences.
fn parse_completion(completion: &str) -> std::result::Result<MappingProposal, String> {
    let trimmed = completion.trim();
    let without_fences = if trimmed.starts_with("```") {
        let inner = trimmed.trim_start_matches("```json").trim_start_matches("```");
        inner.trim_end_matches("```").trim()
    } else {
        trimmed
    };
    serde_json::from_str(without_fences)
        .map_err(|e| format!("completion is not a valid mapping document: {}", e))
}

/// Client-side post-validation: a target key may be assigned at most once.
/// Later duplicates become unmapped raw fields routed to new-key creation.
fn enforce_unique_targets(proposal: MappingProposal) -> MappingProposal {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut mapping = BTreeMap::new();
    let mut new_keys = proposal.new_keys;

    for (raw, target) in proposal.mapping {
        if seen.insert(target.clone()) {
            mapping.insert(raw, target);
        } else if !new_keys.contains(&raw) {
            new_keys.push(raw);
        }
    }

    MappingProposal { mapping, new_keys }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_target_routes_second_raw_key_to_new_keys() {
        let proposal = MappingProposal {
            mapping: BTreeMap::from([
                ("headline".to_string(), "title".to_string()),
                ("name".to_string(), "title".to_string()),
                ("cost".to_string(), "price".to_string()),
            ]),
            new_keys: vec![],
        };
        let validated = enforce_unique_targets(proposal);
        // BTreeMap order: "cost" < "headline" < "name"; "headline" claims
        // "title" first, "name" is demoted.
        assert_eq!(validated.mapping.len(), 2);
        assert_eq!(
            validated.mapping.get("headline").map(String::as_str),
            Some("title")
        );
        assert_eq!(validated.new_keys, vec!["name".to_string()]);
    }

    #[test]
    fn fenced_completions_parse() {
        let completion = "```json\n{\"mapping\": {\"a\": \"b\"}, \"new_keys\": []}\n```";
        let proposal = parse_completion(completion).unwrap();
        assert_eq!(proposal.mapping.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn malformed_completion_is_an_error() {
        assert!(parse_completion("sure! here is the mapping you asked for").is_err());
    }

    #[test]
    fn prompt_carries_vocabulary_and_sample() {
        let prompt = build_prompt(
            &json!({"headline": "x"}),
            &["title".to_string(), "price".to_string()],
        );
        assert!(prompt.contains("title, price"));
        assert!(prompt.contains("headline"));
    }
}
