use crate::models::{EnrichmentFragment, EnrichmentRequest};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cache of successful enrichment fragments.
///
/// Keys are derived from the content actually sent to the provider (kind plus
/// the serialized request), never from the submission identity, so a resubmitted
/// form with an edited vacancy text always misses.
#[derive(Clone)]
pub struct FragmentCache {
    inner: Cache<String, EnrichmentFragment>,
}

impl FragmentCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_capacity)
                .build(),
        }
    }

    /// SHA-256 over `kind:request_json`, hex encoded.
    pub fn key_for(request: &EnrichmentRequest) -> String {
        let body = serde_json::to_string(request).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(request.kind().as_str().as_bytes());
        hasher.update(b":");
        hasher.update(body.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, request: &EnrichmentRequest) -> Option<EnrichmentFragment> {
        self.inner.get(&Self::key_for(request)).await
    }

    /// Stores `fragment` only when it carries a payload.
    pub async fn insert(&self, request: &EnrichmentRequest, fragment: &EnrichmentFragment) {
        if fragment.is_success() {
            self.inner
                .insert(Self::key_for(request), fragment.clone())
                .await;
        }
    }
}
