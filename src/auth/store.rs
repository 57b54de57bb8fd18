//! Token cache backends.
//!
//! The trait seam lets the host application plug a persistent credential
//! store in; the in-memory implementation covers single-process deployments
//! and tests. Concurrent runs against the same Provider are not serialized:
//! acquisition races are tolerated, last write wins.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::oauth::OauthAccessToken;
use crate::Result;

/// Read/write access to the OAuth token cache, keyed by Provider id.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, provider_id: u64) -> Result<Option<OauthAccessToken>>;
    async fn put(&self, provider_id: u64, token: OauthAccessToken) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Process-local token cache.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<u64, OauthAccessToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, provider_id: u64) -> Result<Option<OauthAccessToken>> {
        Ok(self.tokens.read().await.get(&provider_id).cloned())
    }

    async fn put(&self, provider_id: u64, token: OauthAccessToken) -> Result<()> {
        self.tokens.write().await.insert(provider_id, token);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryTokenStore::new();
        let token = OauthAccessToken {
            access_token: "abc".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        store.put(7, token).await.unwrap();
        let got = store.get(7).await.unwrap().unwrap();
        assert_eq!(got.access_token, "abc");
        assert!(store.get(8).await.unwrap().is_none());
    }
}
