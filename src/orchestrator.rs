//! Concurrent fan-out of enrichment calls for one submission.
//!
//! Every issued call runs as its own tokio task and is joined with
//! `join_all`, so one call's failure, panic or timeout never touches its
//! siblings. With a deadline configured, calls still running when it passes
//! are aborted and reported as `Failed("timeout")`. Dropping the `gather`
//! future aborts every call still in flight.

use crate::enrichment_client::EnrichmentClient;
use crate::errors::AppError;
use crate::models::{
    ContactRole, EnrichmentFragment, EnrichmentKind, EnrichmentRequest, Submission,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const NO_DOMAIN_REASON: &str = "no resolvable company domain";
pub const TIMEOUT_REASON: &str = "timeout";

/// Produces the enrichment fragments for a submission.
///
/// An `Err` means orchestration itself broke down before any fragment could
/// be returned; individual call failures are reported inside the fragments.
#[async_trait]
pub trait LeadGatherer: Send + Sync {
    async fn gather(&self, submission: &Submission) -> Result<Vec<EnrichmentFragment>, AppError>;
}

pub struct EnrichmentOrchestrator {
    vacancy: Arc<EnrichmentClient>,
    organization: Arc<EnrichmentClient>,
    contacts: Arc<EnrichmentClient>,
    deadline: Option<Duration>,
}

impl EnrichmentOrchestrator {
    pub fn new(
        vacancy: Arc<EnrichmentClient>,
        organization: Arc<EnrichmentClient>,
        contacts: Arc<EnrichmentClient>,
    ) -> Self {
        Self {
            vacancy,
            organization,
            contacts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    fn client_for(&self, kind: EnrichmentKind) -> Arc<EnrichmentClient> {
        match kind {
            EnrichmentKind::VacancyAnalysis => Arc::clone(&self.vacancy),
            EnrichmentKind::OrganizationProfile => Arc::clone(&self.organization),
            EnrichmentKind::ContactDiscovery => Arc::clone(&self.contacts),
        }
    }

    /// The requests to issue, plus fragments for calls skipped up front.
    fn plan(
        submission: &Submission,
    ) -> Result<(Vec<EnrichmentRequest>, Vec<EnrichmentFragment>), AppError> {
        let domain = submission.resolve_company_domain()?;

        let mut requests = vec![EnrichmentRequest::vacancy_analysis(
            submission,
            domain.as_deref(),
        )];
        let mut skipped = Vec::new();

        match domain {
            Some(domain) => {
                requests.push(EnrichmentRequest::OrganizationProfile {
                    domain: domain.clone(),
                });
                for role in [ContactRole::Hr, ContactRole::DecisionMaker] {
                    requests.push(EnrichmentRequest::ContactDiscovery {
                        domain: domain.clone(),
                        role,
                    });
                }
            }
            None => {
                tracing::info!(
                    email = %submission.email,
                    "No company domain, skipping organization and contact lookups"
                );
                skipped.push(EnrichmentFragment::skipped(
                    EnrichmentKind::OrganizationProfile,
                    None,
                    0,
                    NO_DOMAIN_REASON,
                ));
                for role in [ContactRole::Hr, ContactRole::DecisionMaker] {
                    skipped.push(EnrichmentFragment::skipped(
                        EnrichmentKind::ContactDiscovery,
                        Some(role),
                        0,
                        NO_DOMAIN_REASON,
                    ));
                }
            }
        }

        Ok((requests, skipped))
    }
}

/// One spawned enrichment call. Dropping it aborts the task, so calls never
/// outlive an abandoned `gather`.
struct InFlight {
    handle: JoinHandle<EnrichmentFragment>,
    attempts: Arc<AtomicU32>,
    kind: EnrichmentKind,
    role: Option<ContactRole>,
}

impl InFlight {
    fn spawn(client: Arc<EnrichmentClient>, request: EnrichmentRequest) -> Self {
        let kind = request.kind();
        let role = request.role();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let handle =
            tokio::spawn(async move { client.call_tracked(&request, &counter).await });
        Self {
            handle,
            attempts,
            kind,
            role,
        }
    }

    /// Round-trips started before the call was cut off; at least 1, since the
    /// call was issued.
    fn attempts_so_far(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed).max(1)
    }

    /// Wait for the call, converting timeouts and task faults into fragments.
    async fn settle(mut self, deadline: Option<Instant>) -> EnrichmentFragment {
        let (kind, role) = (self.kind, self.role);
        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, &mut self.handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let fragment = EnrichmentFragment::failed(
                        kind,
                        role,
                        self.attempts_so_far(),
                        TIMEOUT_REASON,
                    );
                    tracing::warn!(
                        call = %fragment.label(),
                        attempts = fragment.attempts,
                        "Enrichment call hit the deadline, aborted"
                    );
                    return fragment;
                }
            },
            None => (&mut self.handle).await,
        };

        joined.unwrap_or_else(|e| {
            let fragment = EnrichmentFragment::failed(
                kind,
                role,
                self.attempts_so_far(),
                format!("task failed: {}", e),
            );
            tracing::error!(call = %fragment.label(), "Enrichment task did not complete: {}", e);
            fragment
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[async_trait]
impl LeadGatherer for EnrichmentOrchestrator {
    async fn gather(&self, submission: &Submission) -> Result<Vec<EnrichmentFragment>, AppError> {
        let (requests, mut fragments) = Self::plan(submission)?;
        let deadline = self.deadline.map(|d| Instant::now() + d);

        tracing::info!(
            issued = requests.len(),
            skipped = fragments.len(),
            "Fanning out enrichment calls"
        );

        let in_flight: Vec<InFlight> = requests
            .into_iter()
            .map(|request| InFlight::spawn(self.client_for(request.kind()), request))
            .collect();

        let settled = join_all(in_flight.into_iter().map(|call| call.settle(deadline))).await;

        for fragment in &settled {
            tracing::debug!(
                call = %fragment.label(),
                attempts = fragment.attempts,
                success = fragment.is_success(),
                "Enrichment call settled"
            );
        }
        let succeeded = settled.iter().filter(|f| f.is_success()).count();
        tracing::info!(
            succeeded,
            issued = settled.len(),
            "Enrichment calls settled"
        );

        fragments.extend(settled);
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn submission(email: &str) -> Submission {
        let mut fields = HashMap::new();
        fields.insert("email".to_string(), email.to_string());
        Submission::from_fields(&fields)
    }

    #[test]
    fn test_plan_with_domain_issues_four_calls() {
        let (requests, skipped) = EnrichmentOrchestrator::plan(&submission("jan@acme.nl")).unwrap();

        assert_eq!(requests.len(), 4);
        assert!(skipped.is_empty());
        assert_eq!(
            requests.iter().filter(|r| r.role().is_some()).count(),
            2
        );
        assert!(requests.iter().any(|r| matches!(
            r,
            EnrichmentRequest::OrganizationProfile { domain } if domain == "acme.nl"
        )));
    }

    #[test]
    fn test_plan_without_domain_skips_three() {
        let (requests, skipped) =
            EnrichmentOrchestrator::plan(&submission("jan@hotmail.com")).unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind(), EnrichmentKind::VacancyAnalysis);
        assert_eq!(skipped.len(), 3);
        assert!(skipped.iter().all(|f| !f.was_issued()));
    }
}
