//! # sr-pipeline
//!
//! Response acquisition and normalization pipeline for configured provider
//! service requests.
//!
//! ## Overview
//!
//! Operators define Providers (external APIs), Service Requests (configured
//! calls against those providers) and Response Keys (a declarative mapping
//! of arbitrary upstream JSON/XML shapes onto a normalized vocabulary).
//! This crate is the runtime underneath that configuration: it builds and
//! sends the outbound request (with pluggable authentication including
//! OAuth token refresh), classifies and decodes the response, applies the
//! key mapping into a normalized list-or-detail result, resolves recursive
//! child requests per item or per batch, and stitches paginated fetches
//! into one result set.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sr_pipeline::{ConfigSnapshot, Pipeline};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sr_pipeline::Result<()> {
//!     let raw = std::fs::read_to_string("config.json")?;
//!     let snapshot = Arc::new(ConfigSnapshot::from_json(&raw)?);
//!     let pipeline = Pipeline::builder(snapshot).max_pages(5).build()?;
//!
//!     let mut query = BTreeMap::new();
//!     query.insert("search".to_string(), "widgets".to_string());
//!
//!     let response = pipeline.run(1, query).await;
//!     println!("{} items", response.items().len());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Read-only configuration snapshot (providers, service requests, response keys) |
//! | [`request`] | Outbound request builder and the `ApiRequest` descriptor |
//! | [`auth`] | Authentication schemes and the OAuth token cache |
//! | [`transport`] | HTTP execution against the network |
//! | [`content`] | Content-type classification and JSON/XML decoding |
//! | [`resolve`] | Response-key resolution with Sr-over-Service overrides |
//! | [`normalize`] | List/detail normalization into item records + metadata |
//! | [`children`] | Child-request orchestration with bounded concurrency |
//! | [`paginate`] | Page/offset pagination state machine |
//! | [`assist`] | AI-assisted key-mapping proposals |
//! | [`pipeline`] | The end-to-end runner producing one `ApiResponse` per run |

pub mod assist;
pub mod auth;
pub mod children;
pub mod config;
pub mod content;
pub mod error;
pub mod normalize;
pub mod paginate;
pub mod pipeline;
pub mod request;
pub mod resolve;
pub mod transport;
pub mod utils;

// Re-export main types for convenience
pub use assist::{AiBackendKind, KeyMappingAssistant, MappingProposal};
pub use auth::{AuthConfig, InMemoryTokenStore, TokenStore};
pub use config::{
    ConfigSnapshot, PaginationType, Provider, ResponseKey, Service, ServiceRequest, SrType,
};
pub use content::ContentKind;
pub use error::{Error, ErrorContext};
pub use pipeline::{ApiResponse, Pipeline, PipelineBuilder, RunStatus};
pub use request::ApiRequest;
pub use transport::HttpTransport;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
