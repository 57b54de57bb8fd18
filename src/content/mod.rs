//! Content-type classification and body decoding.
//!
//! The classifier scans the `Content-Type` header against an ordered table
//! of known media types; first substring match wins, JSON before the XML
//! variants. Both decoders produce a `serde_json::Value`, so everything
//! downstream (key resolution, normalization, children, pagination) has one
//! payload shape to work against.

pub mod xml;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Interpretation selected from response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Json,
    Xml,
}

/// Ordered media-type table. Immutable; injected once at startup.
pub const CONTENT_TYPE_TABLE: &[(&str, ContentKind)] = &[
    ("application/json", ContentKind::Json),
    ("text/xml", ContentKind::Xml),
    ("application/rss+xml", ContentKind::Xml),
    ("application/xml", ContentKind::Xml),
];

/// Classify a `Content-Type` header value. `None` means unclassifiable;
/// the pipeline turns that into an error-status result, not a crash.
pub fn classify(content_type: Option<&str>) -> Option<ContentKind> {
    let header = content_type?.to_ascii_lowercase();
    CONTENT_TYPE_TABLE
        .iter()
        .find(|(media_type, _)| header.contains(media_type))
        .map(|(_, kind)| *kind)
}

/// Decode a raw body according to its classified kind.
///
/// A malformed body is a content error preserving the raw text for
/// inspection.
pub fn decode(kind: ContentKind, body: &[u8]) -> Result<Value> {
    match kind {
        ContentKind::Json => serde_json::from_slice(body).map_err(|e| Error::Content {
            message: format!("body is not valid JSON: {}", e),
            content_type: Some("json".to_string()),
            raw_body: Some(String::from_utf8_lossy(body).into_owned()),
        }),
        ContentKind::Xml => {
            let text = String::from_utf8_lossy(body);
            xml::xml_to_value(&text).map_err(|e| Error::Content {
                message: format!("body is not valid XML: {}", e),
                content_type: Some("xml".to_string()),
                raw_body: Some(text.into_owned()),
            })
        }
    }
}
