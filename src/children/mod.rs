//! Child-request orchestration: follow-up Service Request runs per item or
//! per batch, with their normalized output folded back into the parent
//! records.
//!
//! A child failure is recorded against its item/key only; sibling items
//! keep normalizing. Per-item children run concurrently under a bounded
//! worker pool, and results land in a pre-sized slot vector so the merged
//! output keeps the original item order.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::{ChildAction, ChildBinding};
use crate::error::ErrorContext;
use crate::normalize::NormalizedData;
use crate::pipeline::response::ChildFailure;
use crate::pipeline::runner::RunOutcome;
use crate::pipeline::{Pipeline, RunContext};
use crate::resolve::ResolvedKeys;
use crate::utils::dot_path::render_string;
use crate::utils::DotPath;
use crate::{Error, Result};

#[derive(Default)]
pub(crate) struct ChildEnrichment {
    pub failures: Vec<ChildFailure>,
    pub calls: u32,
}

/// Run every enabled child binding against the freshly normalized data.
pub(crate) async fn enrich(
    pipeline: &Pipeline,
    ctx: &RunContext,
    current_sr: u64,
    data: &mut NormalizedData,
    extra_data: &Map<String, Value>,
    keys: &ResolvedKeys,
) -> Result<ChildEnrichment> {
    let bindings = keys.child_bindings();

    let mut enrichment = ChildEnrichment::default();
    if bindings.is_empty() {
        return Ok(enrichment);
    }

    let child_ctx = ctx.descend(current_sr);
    for (key_name, binding) in &bindings {
        guard_recursion(pipeline, &child_ctx, key_name, binding)?;
    }

    match data {
        NormalizedData::List(items) => {
            for (key_name, binding) in &bindings {
                if binding.single_request {
                    run_batch(
                        pipeline, &child_ctx, key_name, binding, items, extra_data,
                        &mut enrichment,
                    )
                    .await;
                } else {
                    run_per_item(pipeline, &child_ctx, key_name, binding, items, &mut enrichment)
                        .await;
                }
            }
        }
        NormalizedData::Detail(item) => {
            for (key_name, binding) in &bindings {
                let source = item.clone();
                let query = match derive_query(&source, &binding.request_response_keys) {
                    Ok(query) => query,
                    Err(message) => {
                        enrichment.failures.push(ChildFailure {
                            key: key_name.to_string(),
                            item_index: None,
                            message,
                        });
                        continue;
                    }
                };
                enrichment.calls += 1;
                match pipeline
                    .run_internal(&child_ctx, binding.service_request_id, query)
                    .await
                {
                    Ok(outcome) => fold_back(item, key_name, binding, &child_source(outcome)),
                    Err(error) => enrichment.failures.push(ChildFailure {
                        key: key_name.to_string(),
                        item_index: None,
                        message: error.to_string(),
                    }),
                }
            }
        }
    }

    Ok(enrichment)
}

/// A binding that points back into its own ancestry, or past the depth cap,
/// is a configuration defect: fail the run before any call.
fn guard_recursion(
    pipeline: &Pipeline,
    child_ctx: &RunContext,
    key_name: &str,
    binding: &ChildBinding,
) -> Result<()> {
    if child_ctx.ancestry.contains(&binding.service_request_id) {
        return Err(Error::configuration_with_context(
            format!(
                "child binding on key '{}' points back into its own ancestry (service request {})",
                key_name, binding.service_request_id
            ),
            ErrorContext::new()
                .with_field_path(format!("response_keys.{}.child", key_name))
                .with_source("children"),
        ));
    }
    if child_ctx.depth > pipeline.limits.max_child_depth {
        return Err(Error::configuration_with_context(
            format!(
                "child binding on key '{}' exceeds the recursion depth limit of {}",
                key_name, pipeline.limits.max_child_depth
            ),
            ErrorContext::new()
                .with_field_path(format!("response_keys.{}.child", key_name))
                .with_source("children"),
        ));
    }
    Ok(())
}

/// One secondary call per parent item, bounded by the worker pool.
async fn run_per_item(
    pipeline: &Pipeline,
    child_ctx: &RunContext,
    key_name: &str,
    binding: &ChildBinding,
    items: &mut [Value],
    enrichment: &mut ChildEnrichment,
) {
    let semaphore = Arc::new(Semaphore::new(pipeline.limits.child_concurrency));

    let runs = items.iter().enumerate().map(|(index, item)| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let query = match derive_query(item, &binding.request_response_keys) {
                Ok(query) => query,
                Err(message) => return (index, false, Err(message)),
            };
            let permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (index, false, Err("worker pool closed".to_string())),
            };
            let result = pipeline
                .run_internal(child_ctx, binding.service_request_id, query)
                .await
                .map_err(|e| e.to_string());
            drop(permit);
            (index, true, result)
        }
    });

    // Pre-sized slots keep the merged output in original item order even
    // though completions interleave.
    let mut slots: Vec<Option<RunOutcome>> = Vec::new();
    slots.resize_with(items.len(), || None);
    for (index, called, result) in futures::future::join_all(runs).await {
        if called {
            enrichment.calls += 1;
        }
        match result {
            Ok(outcome) => slots[index] = Some(outcome),
            Err(message) => {
                warn!(
                    key = key_name,
                    item = index,
                    message = message.as_str(),
                    "child request failed, field omitted"
                );
                enrichment.failures.push(ChildFailure {
                    key: key_name.to_string(),
                    item_index: Some(index),
                    message,
                });
            }
        }
    }

    for (item, slot) in items.iter_mut().zip(slots) {
        if let Some(outcome) = slot {
            fold_back(item, key_name, binding, &child_source(outcome));
        }
    }
}

/// One secondary call services the whole batch; its records are joined back
/// per item, or broadcast when no join key is configured.
async fn run_batch(
    pipeline: &Pipeline,
    child_ctx: &RunContext,
    key_name: &str,
    binding: &ChildBinding,
    items: &mut [Value],
    extra_data: &Map<String, Value>,
    enrichment: &mut ChildEnrichment,
) {
    let batch_source = Value::Object(extra_data.clone());
    let query = match derive_query(&batch_source, &binding.request_response_keys) {
        Ok(query) => query,
        Err(message) => {
            enrichment.failures.push(ChildFailure {
                key: key_name.to_string(),
                item_index: None,
                message,
            });
            return;
        }
    };

    enrichment.calls += 1;
    let outcome = match pipeline
        .run_internal(child_ctx, binding.service_request_id, query)
        .await
    {
        Ok(outcome) => outcome,
        Err(error) => {
            enrichment.failures.push(ChildFailure {
                key: key_name.to_string(),
                item_index: None,
                message: error.to_string(),
            });
            return;
        }
    };

    match (&binding.join_parent_key, &binding.join_child_key) {
        (Some(parent_key), Some(child_key)) => {
            let records: Vec<Value> = match outcome.data {
                NormalizedData::List(list) => list,
                NormalizedData::Detail(record) => vec![record],
            };
            for (index, item) in items.iter_mut().enumerate() {
                let parent_value = match DotPath::get(item, parent_key) {
                    Some(value) => value.clone(),
                    None => {
                        enrichment.failures.push(ChildFailure {
                            key: key_name.to_string(),
                            item_index: Some(index),
                            message: format!("join key '{}' absent from item", parent_key),
                        });
                        continue;
                    }
                };
                match records
                    .iter()
                    .find(|r| DotPath::get(r, child_key) == Some(&parent_value))
                {
                    Some(record) => fold_back(item, key_name, binding, record),
                    None => enrichment.failures.push(ChildFailure {
                        key: key_name.to_string(),
                        item_index: Some(index),
                        message: format!(
                            "no child record with {} == {}",
                            child_key,
                            render_string(&parent_value)
                        ),
                    }),
                }
            }
        }
        _ => {
            let source = child_source(outcome);
            for item in items.iter_mut() {
                fold_back(item, key_name, binding, &source);
            }
        }
    }
}

/// Shape a child outcome as the value fold-back paths resolve against.
fn child_source(outcome: RunOutcome) -> Value {
    match outcome.data {
        NormalizedData::Detail(record) => record,
        NormalizedData::List(list) => json!({
            "items": list,
            "extra_data": outcome.extra_data,
        }),
    }
}

/// Build a child query from the parent extraction. Every configured source
/// path must resolve; a miss fails the derivation for this item/batch.
fn derive_query(
    source: &Value,
    mapping: &BTreeMap<String, String>,
) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut query = BTreeMap::new();
    for (param, path) in mapping {
        match DotPath::get(source, path) {
            Some(value) => {
                query.insert(param.clone(), render_string(value));
            }
            None => {
                return Err(format!(
                    "request key source path '{}' unresolved in parent extraction",
                    path
                ))
            }
        }
    }
    Ok(query)
}

/// Fold the child's fields back into the parent record under the binding's
/// key, honoring the configured action. On merge, fetched fields win over
/// same-named existing entries.
fn fold_back(item: &mut Value, key_name: &str, binding: &ChildBinding, child_source: &Value) {
    let folded = if binding.response_response_keys.is_empty() {
        child_source.clone()
    } else {
        let mut map = Map::new();
        for (field, path) in &binding.response_response_keys {
            if let Some(value) = DotPath::get(child_source, path) {
                map.insert(field.clone(), value.clone());
            }
        }
        Value::Object(map)
    };

    let Value::Object(record) = item else { return };
    match binding.action {
        ChildAction::Replace => {
            record.insert(key_name.to_string(), folded);
        }
        ChildAction::Merge => match (record.get_mut(key_name), folded) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k, v);
                }
            }
            (_, folded) => {
                record.insert(key_name.to_string(), folded);
            }
        },
    }
}
