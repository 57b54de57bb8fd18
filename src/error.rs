use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for diagnostics and operator-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Configuration key or payload path that caused the error
    /// (e.g. "service_request.endpoint", "results.3.id")
    pub field_path: Option<String>,
    /// Additional context (expected shape, offending value)
    pub details: Option<String>,
    /// Component that raised the error (e.g. "request_builder", "normalizer")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the pipeline.
///
/// Variants map one-to-one onto the run-time taxonomy: configuration and
/// validation problems fail before/during a run without retry, transport
/// problems are isolated per call, content and AI-backend problems preserve
/// the raw upstream material for inspection.
#[derive(Debug, Error)]
pub enum Error {
    /// Broken or missing configuration. Fails before any network call.
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    /// A required key or node is absent from a payload.
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// OAuth token acquisition failed. Carries the echoed token request and
    /// the raw token response for reproduction.
    #[error("Oauth response error: {message}")]
    Authentication {
        message: String,
        request_echo: Option<serde_json::Value>,
        response_echo: Option<serde_json::Value>,
    },

    /// Network-level failure (timeout, DNS, connection refused), as opposed
    /// to a successful-but-non-2xx HTTP response.
    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    /// Unclassifiable content type or a body that does not parse as the
    /// classified type. The raw body is preserved.
    #[error("Content error: {message}")]
    Content {
        message: String,
        content_type: Option<String>,
        raw_body: Option<String>,
    },

    /// Upstream answered with a non-2xx status. The raw response rides
    /// along for reproduction.
    #[error("Remote error: HTTP {status}: {message}")]
    Remote {
        status: u16,
        message: String,
        response_echo: Option<serde_json::Value>,
    },

    /// AI backend call failed (non-2xx, malformed or empty completion).
    #[error("AI backend error ({backend}): {message}")]
    AiBackend {
        backend: String,
        message: String,
        raw: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn content(msg: impl Into<String>) -> Self {
        Error::Content {
            message: msg.into(),
            content_type: None,
            raw_body: None,
        }
    }

    /// Extract structured context if the variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Validation { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
