//! Single enrichment call with bounded retry.
//!
//! `EnrichmentClient::call` never fails: transport faults, non-2xx answers
//! and undecodable bodies end up as a `Failed` fragment once the attempt
//! budget is spent, and replies that parse but lack the expected fields end
//! up as `Skipped`.

use crate::fragment_cache::FragmentCache;
use crate::models::{EnrichmentFragment, EnrichmentPayload, EnrichmentRequest};
use crate::services::EnrichmentProvider;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Linear backoff: after failed attempt `n` the client waits `n × base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

pub struct EnrichmentClient {
    provider: Arc<dyn EnrichmentProvider>,
    retry: RetryPolicy,
    cache: Option<FragmentCache>,
    request_counter: AtomicU64,
}

impl EnrichmentClient {
    pub fn new(provider: Arc<dyn EnrichmentProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            cache: None,
            request_counter: AtomicU64::new(0),
        }
    }

    pub fn with_cache(mut self, cache: FragmentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn call(&self, request: &EnrichmentRequest) -> EnrichmentFragment {
        self.call_tracked(request, &AtomicU32::new(0)).await
    }

    /// Like `call`, publishing the number of provider round-trips started so
    /// far to `attempts`, so a caller that abandons the call still knows it.
    pub async fn call_tracked(
        &self,
        request: &EnrichmentRequest,
        attempts: &AtomicU32,
    ) -> EnrichmentFragment {
        let kind = request.kind();
        let role = request.role();
        let request_id = self.next_request_id();
        let provider = self.provider.name();

        if let Some(ref cache) = self.cache {
            if let Some(hit) = cache.get(request).await {
                tracing::debug!(%kind, request_id, provider, "Enrichment cache hit");
                return hit;
            }
        }

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            attempts.store(attempt, Ordering::Relaxed);
            tracing::debug!(%kind, request_id, provider, attempt, "Calling enrichment provider");

            let error = match self.provider.fetch(request).await {
                Ok(reply) => {
                    let fragment = match EnrichmentPayload::from_reply(request, &reply) {
                        Some(payload) => EnrichmentFragment::success(request, payload, attempt),
                        None => {
                            tracing::warn!(
                                %kind,
                                request_id,
                                provider,
                                "Provider response missing expected fields"
                            );
                            EnrichmentFragment::skipped(
                                kind,
                                role,
                                attempt,
                                "provider response missing expected fields",
                            )
                        }
                    };

                    if let Some(ref cache) = self.cache {
                        cache.insert(request, &fragment).await;
                    }
                    return fragment;
                }
                Err(e) => e,
            };

            tracing::warn!(
                %kind,
                request_id,
                provider,
                attempt,
                error = %error,
                "Enrichment attempt failed"
            );

            if !error.is_retryable() || attempt >= self.retry.max_attempts {
                break error;
            }
            tokio::time::sleep(self.retry.delay_after(attempt)).await;
        };

        tracing::error!(
            %kind,
            request_id,
            provider,
            attempts = attempt,
            "Enrichment call failed: {}",
            last_error
        );
        EnrichmentFragment::failed(kind, role, attempt, last_error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::models::{ContactRole, EnrichmentKind, FragmentStatus};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Replays scripted outcomes, one per call; repeats the last one when exhausted.
    struct ScriptedProvider {
        outcomes: Mutex<Vec<Result<Value, ProviderError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(mut outcomes: Vec<Result<Value, ProviderError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EnrichmentProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, _request: &EnrichmentRequest) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop().unwrap()
            } else {
                outcomes.last().cloned().unwrap()
            }
        }
    }

    fn hr_request() -> EnrichmentRequest {
        EnrichmentRequest::ContactDiscovery {
            domain: "acme.nl".into(),
            role: ContactRole::Hr,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Timeout),
            Err(ProviderError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
            Ok(json!({"count": 3})),
        ]));
        let client = EnrichmentClient::new(provider.clone(), fast_retry());

        let fragment = client.call(&hr_request()).await;
        assert!(fragment.is_success());
        assert_eq!(fragment.attempts, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::Transport("connection refused".into()),
        )]));
        let client = EnrichmentClient::new(provider.clone(), fast_retry());

        let fragment = client.call(&hr_request()).await;
        assert_eq!(fragment.kind, EnrichmentKind::ContactDiscovery);
        assert_eq!(fragment.role, Some(ContactRole::Hr));
        assert!(matches!(fragment.status, FragmentStatus::Failed { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tracked_attempts_follow_retries() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Timeout),
            Ok(json!({"count": 1})),
        ]));
        let client = EnrichmentClient::new(provider, fast_retry());
        let attempts = AtomicU32::new(0);

        let fragment = client.call_tracked(&hr_request(), &attempts).await;
        assert_eq!(fragment.attempts, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Status {
            status: 401,
            body: "invalid api key".into(),
        })]));
        let client = EnrichmentClient::new(provider.clone(), fast_retry());

        let fragment = client.call(&hr_request()).await;
        assert!(matches!(fragment.status, FragmentStatus::Failed { .. }));
        assert_eq!(fragment.attempts, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_become_skipped() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(json!({"people": "?"}))]));
        let client = EnrichmentClient::new(provider.clone(), fast_retry());

        let fragment = client.call(&hr_request()).await;
        assert!(matches!(fragment.status, FragmentStatus::Skipped { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(json!({"count": 2}))]));
        let client = EnrichmentClient::new(provider.clone(), fast_retry())
            .with_cache(FragmentCache::new(Duration::from_secs(60), 10));

        let first = client.call(&hr_request()).await;
        let second = client.call(&hr_request()).await;
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
