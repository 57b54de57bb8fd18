//! Shared fixtures: config snapshot builders and a mockito-backed pipeline.
#![allow(dead_code)]

use sr_pipeline::config::{ConfigSnapshot, ServiceRequest, SrType};
use sr_pipeline::{Pipeline, Provider, ResponseKey, Service};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub fn provider(id: u64, name: &str) -> Provider {
    Provider {
        id,
        name: name.to_string(),
        base_url: None,
        auth: Default::default(),
    }
}

pub fn service(id: u64, name: &str, response_keys: Vec<ResponseKey>) -> Service {
    Service {
        id,
        name: name.to_string(),
        category: None,
        response_keys,
    }
}

/// Bare Service Request; tests set what they need.
pub fn sr(id: u64, name: &str) -> ServiceRequest {
    ServiceRequest {
        id,
        name: name.to_string(),
        provider_id: 1,
        service_id: 1,
        parent_id: None,
        sr_type: None,
        pagination_type: None,
        endpoint: None,
        method: None,
        headers: HashMap::new(),
        query: BTreeMap::new(),
        body: None,
        list_key: None,
        list_item_repeater_key: None,
        list_format_option: None,
        per_page: None,
        response_keys: Vec::new(),
    }
}

pub fn list_sr(id: u64, name: &str, endpoint: &str, list_key: &str) -> ServiceRequest {
    let mut request = sr(id, name);
    request.sr_type = Some(SrType::List);
    request.endpoint = Some(endpoint.to_string());
    request.list_key = Some(list_key.to_string());
    request
}

/// Mock server plus a pipeline whose providers all point at it.
pub struct PipelineFixture {
    pub server: mockito::ServerGuard,
    pub pipeline: Pipeline,
}

impl PipelineFixture {
    pub async fn new(snapshot: ConfigSnapshot) -> Self {
        // RUST_LOG-driven output for debugging test runs.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let server = mockito::Server::new_async().await;
        let pipeline = Pipeline::builder(Arc::new(snapshot))
            .base_url_override(server.url())
            .build()
            .expect("pipeline builds");
        Self { server, pipeline }
    }
}
