//! AI backend adapters: one request/parse implementation per variant.
//!
//! OpenAI, DeepSeek and Grok share the OpenAI-compatible chat wire shape
//! and differ only in base URL and default model; Gemini has its own
//! generateContent format with the API key as a query parameter.

use serde_json::{json, Value};

use crate::request::{ApiRequest, RequestBody};
use crate::utils::DotPath;

/// Contract every backend variant implements: build the HTTP request for a
/// prompt, and pull the completion text out of the response body.
pub(crate) trait AssistBackend: Send + Sync {
    fn id(&self) -> &'static str;
    fn default_model(&self) -> &'static str;
    fn default_base_url(&self) -> &'static str;
    fn build_request(&self, base_url: &str, api_key: &str, model: &str, prompt: &str)
        -> ApiRequest;
    fn extract_completion(&self, body: &Value) -> Option<String>;
}

/// Google Gemini generateContent.
pub(crate) struct GeminiBackend;

impl AssistBackend for GeminiBackend {
    fn id(&self) -> &'static str {
        "gemini"
    }

    fn default_model(&self) -> &'static str {
        "gemini-1.5-flash"
    }

    fn default_base_url(&self) -> &'static str {
        "https://generativelanguage.googleapis.com/v1beta"
    }

    fn build_request(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> ApiRequest {
        let url = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );
        let mut request = ApiRequest::new("POST", url);
        // Gemini authenticates via query parameter, not headers.
        request.query.push(("key".to_string(), api_key.to_string()));
        request.body = RequestBody::Json(json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0 }
        }));
        request
    }

    fn extract_completion(&self, body: &Value) -> Option<String> {
        DotPath::get(body, "candidates.0.content.parts.0.text")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// OpenAI-compatible chat completions — covers OpenAI, DeepSeek and Grok.
pub(crate) struct OpenAiCompatibleBackend {
    pub id: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
}

impl AssistBackend for OpenAiCompatibleBackend {
    fn id(&self) -> &'static str {
        self.id
    }

    fn default_model(&self) -> &'static str {
        self.model
    }

    fn default_base_url(&self) -> &'static str {
        self.base_url
    }

    fn build_request(
        &self,
        base_url: &str,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> ApiRequest {
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let mut request = ApiRequest::new("POST", url);
        request
            .headers
            .insert("authorization".to_string(), format!("Bearer {}", api_key));
        request.body = RequestBody::Json(json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0
        }));
        request
    }

    fn extract_completion(&self, body: &Value) -> Option<String> {
        DotPath::get(body, "choices.0.message.content")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

pub(crate) static GEMINI: GeminiBackend = GeminiBackend;

pub(crate) static OPENAI: OpenAiCompatibleBackend = OpenAiCompatibleBackend {
    id: "openai",
    base_url: "https://api.openai.com/v1",
    model: "gpt-4o-mini",
};

pub(crate) static DEEPSEEK: OpenAiCompatibleBackend = OpenAiCompatibleBackend {
    id: "deepseek",
    base_url: "https://api.deepseek.com/v1",
    model: "deepseek-chat",
};

pub(crate) static GROK: OpenAiCompatibleBackend = OpenAiCompatibleBackend {
    id: "grok",
    base_url: "https://api.x.ai/v1",
    model: "grok-2-latest",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_compatible_request_carries_bearer_and_model() {
        let request = OPENAI.build_request("https://mock.test/v1", "k", "gpt-4o-mini", "hi");
        assert_eq!(request.url, "https://mock.test/v1/chat/completions");
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer k")
        );
        match request.body {
            RequestBody::Json(body) => assert_eq!(body["model"], json!("gpt-4o-mini")),
            other => panic!("expected json body, got {other:?}"),
        }
    }

    #[test]
    fn gemini_authenticates_via_query_parameter() {
        let request = GEMINI.build_request(
            GEMINI.default_base_url(),
            "secret",
            GEMINI.default_model(),
            "hi",
        );
        assert!(request.url.ends_with(":generateContent"));
        assert!(request
            .query
            .contains(&("key".to_string(), "secret".to_string())));
        assert!(request.headers.get("authorization").is_none());
    }

    #[test]
    fn completion_extraction_per_wire_shape() {
        let openai_body = json!({"choices": [{"message": {"content": "done"}}]});
        assert_eq!(OPENAI.extract_completion(&openai_body).as_deref(), Some("done"));

        let gemini_body =
            json!({"candidates": [{"content": {"parts": [{"text": "done"}]}}]});
        assert_eq!(GEMINI.extract_completion(&gemini_body).as_deref(), Some("done"));
    }
}
