//! Core run loop: one full pass per pagination cycle, child enrichment
//! inside each cycle, a single outcome at the end.

use async_recursion::async_recursion;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::response::{ApiResponse, RunDiagnostics, RunStatus};
use super::Pipeline;
use crate::children;
use crate::config::{PaginationType, Provider};
use crate::content::{self, ContentKind};
use crate::normalize::{self, NormalizedData};
use crate::paginate::Paginator;
use crate::request::build_request;
use crate::resolve::ResolvedKeys;
use crate::{Error, Result};

/// Correlation and recursion state shared by every call of one run.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub run_id: String,
    /// Service Request ids on the current recursion path, root first.
    pub ancestry: Vec<u64>,
    pub depth: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            ancestry: Vec::new(),
            depth: 0,
        }
    }

    /// Context for a child run below the given Service Request.
    pub fn descend(&self, current_sr: u64) -> Self {
        let mut ancestry = self.ancestry.clone();
        ancestry.push(current_sr);
        Self {
            run_id: self.run_id.clone(),
            ancestry,
            depth: self.depth + 1,
        }
    }
}

/// Internal result of one (possibly recursive) run.
pub(crate) struct RunOutcome {
    pub data: NormalizedData,
    pub extra_data: Map<String, Value>,
    pub content_type: Option<ContentKind>,
    pub provider: String,
    pub request_service: String,
    pub category: Option<String>,
    pub pagination_type: Option<PaginationType>,
    pub request_echo: Option<Value>,
    pub diagnostics: RunDiagnostics,
}

impl RunOutcome {
    pub fn into_response(self) -> ApiResponse {
        ApiResponse {
            status: RunStatus::Success,
            message: None,
            content_type: self.content_type,
            provider: Some(self.provider),
            request_service: Some(self.request_service),
            category: self.category,
            request_data: self.data.into_value(),
            extra_data: self.extra_data,
            pagination_type: self.pagination_type,
            api_request_echo: self.request_echo,
            raw_response_echo: None,
            diagnostics: self.diagnostics,
        }
    }
}

impl Pipeline {
    /// One logical run: request → transport → classify → decode → resolve →
    /// normalize → children, looped across pagination cycles.
    #[async_recursion]
    pub(crate) async fn run_internal(
        &self,
        ctx: &RunContext,
        sr_id: u64,
        overrides: BTreeMap<String, String>,
    ) -> Result<RunOutcome> {
        let started = Instant::now();

        let sr = self.snapshot.service_request(sr_id)?;
        let effective = sr.resolve_effective(&self.snapshot)?;
        let provider = self.effective_provider(self.snapshot.provider(effective.provider_id)?);
        let service = self.snapshot.service(effective.service_id)?;
        let keys = ResolvedKeys::resolve(service, &effective);

        let mut paginator = Paginator::new(
            effective.pagination_type,
            effective.per_page,
            self.page_caps(),
        );

        let mut items: Vec<Value> = Vec::new();
        let mut single: Option<Value> = None;
        let mut extra_data: Map<String, Value> = Map::new();
        let mut content_type: Option<ContentKind> = None;
        let mut request_echo: Option<Value> = None;
        let mut diagnostics = RunDiagnostics::default();

        while let Some(cycle_overrides) = paginator.next_overrides(&overrides) {
            let auth = self.auth.resolve(&provider, &self.transport).await?;
            let request =
                build_request(&effective, &provider, &auth, &cycle_overrides, &ctx.run_id)?;
            if request_echo.is_none() {
                request_echo = Some(request.echo());
            }

            let raw = match self.transport.execute(request).await {
                Ok(raw) => raw,
                Err(error) => {
                    // A failed later page stops the fetch but keeps what
                    // earlier cycles already produced.
                    if paginator.pages_fetched() == 0 {
                        return Err(error);
                    }
                    warn!(
                        run_id = ctx.run_id.as_str(),
                        service_request = effective.name.as_str(),
                        page = paginator.pages_fetched() + 1,
                        error = %error,
                        "pagination cycle failed, keeping earlier pages"
                    );
                    diagnostics
                        .warnings
                        .push(format!("pagination stopped early: {}", error));
                    break;
                }
            };
            diagnostics.stats.http_calls += 1;

            if !raw.is_success() {
                let error = Error::Remote {
                    status: raw.status,
                    message: format!(
                        "service request '{}' ({}) received HTTP {}",
                        effective.name, effective.id, raw.status
                    ),
                    response_echo: Some(raw.echo()),
                };
                if paginator.pages_fetched() == 0 {
                    return Err(error);
                }
                diagnostics
                    .warnings
                    .push(format!("pagination stopped early: {}", error));
                break;
            }

            let kind = content::classify(raw.content_type()).ok_or_else(|| Error::Content {
                message: format!(
                    "unclassifiable content type '{}'",
                    raw.content_type().unwrap_or("<missing>")
                ),
                content_type: raw.content_type().map(str::to_string),
                raw_body: Some(raw.body_text()),
            })?;
            content_type.get_or_insert(kind);

            let payload = content::decode(kind, &raw.body)?;
            let mut outcome = normalize::normalize(&payload, &effective, &keys, &provider.name)?;
            diagnostics.warnings.append(&mut outcome.warnings);

            let enrichment =
                children::enrich(self, ctx, sr_id, &mut outcome.data, &outcome.extra_data, &keys)
                    .await?;
            diagnostics.stats.child_calls += enrichment.calls;
            diagnostics
                .child_failures
                .extend(enrichment.failures);

            let cycle_count = outcome.data.len();
            for (k, v) in outcome.extra_data {
                extra_data.insert(k, v);
            }
            match outcome.data {
                NormalizedData::List(mut cycle_items) => items.append(&mut cycle_items),
                NormalizedData::Detail(item) => {
                    single = Some(item);
                    // Detail payloads have nothing to paginate.
                    break;
                }
            }
            paginator.record_cycle(cycle_count, &extra_data);
        }

        let mut data = match single {
            Some(item) => NormalizedData::Detail(item),
            None => NormalizedData::List(items),
        };
        normalize::strip_hidden_keys(&mut data, &keys);

        diagnostics.stats.pages_fetched = paginator.pages_fetched().max(1);
        diagnostics.stats.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            run_id = ctx.run_id.as_str(),
            service_request = effective.name.as_str(),
            provider = provider.name.as_str(),
            items = data.len(),
            pages = diagnostics.stats.pages_fetched,
            http_calls = diagnostics.stats.http_calls,
            child_calls = diagnostics.stats.child_calls,
            duration_ms = diagnostics.stats.duration_ms,
            "run complete"
        );

        Ok(RunOutcome {
            data,
            extra_data,
            content_type,
            provider: provider.name.clone(),
            request_service: effective.name.clone(),
            category: service.category.clone(),
            pagination_type: effective.pagination_type,
            request_echo,
            diagnostics,
        })
    }

    /// Apply the test-only base URL override to a provider.
    fn effective_provider(&self, provider: &Provider) -> Provider {
        match &self.base_url_override {
            None => provider.clone(),
            Some(base) => {
                let mut provider = provider.clone();
                provider.base_url = Some(base.clone());
                provider
            }
        }
    }
}
