//! Pipeline entry point: runs a configured Service Request end to end and
//! produces one normalized [`ApiResponse`].
//!
//! A run is sequential across its own pagination cycles (later cycles
//! depend on earlier metadata); independent per-item child requests inside
//! a cycle run concurrently under a bounded worker pool. Independent runs
//! against different Service Requests are free to run concurrently; the
//! only shared mutable state is the OAuth token cache.

pub mod response;
pub(crate) mod runner;

pub use response::{ApiResponse, ChildFailure, RunDiagnostics, RunStats, RunStatus};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{AuthResolver, InMemoryTokenStore, TokenStore};
use crate::config::{defaults, ConfigSnapshot};
use crate::paginate::PageCaps;
use crate::transport::HttpTransport;
use crate::Result;

pub(crate) use runner::RunContext;

/// Ceilings applied to every run of one pipeline instance.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_pages: Option<u32>,
    pub max_items: Option<usize>,
    pub child_concurrency: usize,
    pub max_child_depth: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_items: None,
            child_concurrency: defaults::DEFAULT_CHILD_CONCURRENCY,
            max_child_depth: defaults::DEFAULT_MAX_CHILD_DEPTH,
        }
    }
}

/// The response acquisition & normalization pipeline.
pub struct Pipeline {
    pub(crate) snapshot: Arc<ConfigSnapshot>,
    pub(crate) transport: HttpTransport,
    pub(crate) auth: AuthResolver,
    pub(crate) limits: RunLimits,
    pub(crate) base_url_override: Option<String>,
}

impl Pipeline {
    pub fn builder(snapshot: Arc<ConfigSnapshot>) -> PipelineBuilder {
        PipelineBuilder::new(snapshot)
    }

    /// Run one Service Request with the caller's query overrides.
    ///
    /// Never panics and never returns `Err`: run-level failures come back
    /// as an error-status [`ApiResponse`] carrying the message and echoes.
    pub async fn run(
        &self,
        sr_id: u64,
        overrides: BTreeMap<String, String>,
    ) -> ApiResponse {
        let ctx = RunContext::new();
        match self.run_internal(&ctx, sr_id, overrides).await {
            Ok(outcome) => outcome.into_response(),
            Err(error) => ApiResponse::from_error(error, None),
        }
    }

    pub(crate) fn page_caps(&self) -> PageCaps {
        PageCaps {
            max_pages: self.limits.max_pages,
            max_items: self.limits.max_items,
        }
    }
}

/// Builder for a pipeline instance.
///
/// Keep this surface small and predictable: a config snapshot in, optional
/// store/limit/test hooks, one `build()`.
pub struct PipelineBuilder {
    snapshot: Arc<ConfigSnapshot>,
    token_store: Option<Arc<dyn TokenStore>>,
    limits: RunLimits,
    /// Override every provider's base URL (primarily for mock-server tests).
    base_url_override: Option<String>,
}

impl PipelineBuilder {
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self {
            snapshot,
            token_store: None,
            limits: RunLimits::default(),
            base_url_override: None,
        }
    }

    /// Plug a persistent token store in; defaults to the in-memory cache.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Cap pages fetched per run.
    pub fn max_pages(mut self, max: u32) -> Self {
        self.limits.max_pages = Some(max.max(1));
        self
    }

    /// Cap total items fetched per run.
    pub fn max_items(mut self, max: usize) -> Self {
        self.limits.max_items = Some(max.max(1));
        self
    }

    /// Bound on concurrently running per-item child requests.
    pub fn child_concurrency(mut self, limit: usize) -> Self {
        self.limits.child_concurrency = limit.max(1);
        self
    }

    /// Hard ceiling on recursive child-request depth.
    pub fn max_child_depth(mut self, depth: usize) -> Self {
        self.limits.max_child_depth = depth.max(1);
        self
    }

    pub fn base_url_override(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        self.snapshot.validate()?;
        let store = self
            .token_store
            .unwrap_or_else(|| Arc::new(InMemoryTokenStore::new()));
        Ok(Pipeline {
            snapshot: self.snapshot,
            transport: HttpTransport::new()?,
            auth: AuthResolver::new(store),
            limits: self.limits,
            base_url_override: self.base_url_override,
        })
    }
}
