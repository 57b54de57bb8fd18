//! Configuration snapshot: the read-only records a pipeline run is driven by.
//!
//! Providers, Services, Service Requests and their Response Keys are
//! authored in the admin layer and handed to this crate as an immutable
//! snapshot for the duration of one run. Nothing here writes configuration
//! back.

pub mod defaults;
pub mod response_key;
pub mod service_request;

pub use response_key::{ChildAction, ChildBinding, ResponseKey};
pub use service_request::{
    EffectiveSr, ListFormatOption, PaginationType, ServiceRequest, SrType,
};

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;
use crate::error::ErrorContext;
use crate::{Error, Result};

/// An external API a Service Request runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: u64,
    pub name: String,
    /// Base URL relative endpoints are joined to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// A logical grouping of Service Requests sharing a default response-key
/// vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Service-level default response keys. Key names are unique per service.
    #[serde(default)]
    pub response_keys: Vec<ResponseKey>,
}

/// Read-only configuration snapshot for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub service_requests: Vec<ServiceRequest>,
}

impl ConfigSnapshot {
    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn provider(&self, id: u64) -> Result<&Provider> {
        self.providers.iter().find(|p| p.id == id).ok_or_else(|| {
            Error::configuration_with_context(
                format!("provider {} not found", id),
                ErrorContext::new().with_source("config"),
            )
        })
    }

    pub fn service(&self, id: u64) -> Result<&Service> {
        self.services.iter().find(|s| s.id == id).ok_or_else(|| {
            Error::configuration_with_context(
                format!("service {} not found", id),
                ErrorContext::new().with_source("config"),
            )
        })
    }

    pub fn service_request(&self, id: u64) -> Result<&ServiceRequest> {
        self.service_requests
            .iter()
            .find(|sr| sr.id == id)
            .ok_or_else(|| {
                Error::configuration_with_context(
                    format!("service request {} not found", id),
                    ErrorContext::new().with_source("config"),
                )
            })
    }

    /// Referential-integrity pass, run once at snapshot load: every Service
    /// Request must point at an existing provider, service and (if set)
    /// parent, every child binding at an existing Service Request, and key
    /// names must be unique within a service.
    pub fn validate(&self) -> Result<()> {
        for service in &self.services {
            let mut seen = std::collections::HashSet::new();
            for key in &service.response_keys {
                if !seen.insert(key.name.as_str()) {
                    return Err(Error::configuration_with_context(
                        format!(
                            "service '{}' declares response key '{}' more than once",
                            service.name, key.name
                        ),
                        ErrorContext::new()
                            .with_field_path(format!("services[{}].response_keys", service.id))
                            .with_source("config"),
                    ));
                }
                if let Some(ref child) = key.child {
                    self.service_request(child.service_request_id).map_err(|_| {
                        Error::configuration_with_context(
                            format!(
                                "response key '{}' on service '{}' binds unknown service request {}",
                                key.name, service.name, child.service_request_id
                            ),
                            ErrorContext::new()
                                .with_field_path(format!("services[{}].response_keys", service.id))
                                .with_source("config"),
                        )
                    })?;
                }
            }
        }
        for sr in &self.service_requests {
            let ctx = || {
                ErrorContext::new()
                    .with_field_path(format!("service_requests[{}]", sr.id))
                    .with_source("config")
            };
            self.provider(sr.provider_id).map_err(|_| {
                Error::configuration_with_context(
                    format!(
                        "service request '{}' references unknown provider {}",
                        sr.name, sr.provider_id
                    ),
                    ctx(),
                )
            })?;
            self.service(sr.service_id).map_err(|_| {
                Error::configuration_with_context(
                    format!(
                        "service request '{}' references unknown service {}",
                        sr.name, sr.service_id
                    ),
                    ctx(),
                )
            })?;
            if let Some(parent_id) = sr.parent_id {
                self.service_request(parent_id).map_err(|_| {
                    Error::configuration_with_context(
                        format!(
                            "service request '{}' references unknown parent {}",
                            sr.name, parent_id
                        ),
                        ctx(),
                    )
                })?;
            }
            for key in &sr.response_keys {
                if let Some(ref child) = key.child {
                    self.service_request(child.service_request_id).map_err(|_| {
                        Error::configuration_with_context(
                            format!(
                                "response key '{}' on service request '{}' binds unknown service request {}",
                                key.name, sr.name, child.service_request_id
                            ),
                            ctx(),
                        )
                    })?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_json() -> &'static str {
        r#"{
            "providers": [{"id": 1, "name": "acme", "base_url": "https://api.acme.test"}],
            "services": [{"id": 1, "name": "catalog", "response_keys": []}],
            "service_requests": [{
                "id": 1, "name": "products", "provider_id": 1, "service_id": 1,
                "sr_type": "list", "endpoint": "/v1/products", "list_key": "results"
            }]
        }"#
    }

    #[test]
    fn snapshot_loads_and_validates() {
        let snapshot = ConfigSnapshot::from_json(snapshot_json()).unwrap();
        assert_eq!(snapshot.service_request(1).unwrap().name, "products");
    }

    #[test]
    fn dangling_provider_reference_is_a_configuration_error() {
        let mut snapshot = ConfigSnapshot::from_json(snapshot_json()).unwrap();
        snapshot.service_requests[0].provider_id = 99;
        let err = snapshot.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("unknown provider 99"));
    }
}
