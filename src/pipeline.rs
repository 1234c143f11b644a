use crate::errors::AppError;
use crate::models::{LeadFlags, LeadRecord, LeadStage, RecordMeta, Submission, Tier};
use crate::orchestrator::LeadGatherer;
use crate::scoring::ScoringEngine;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Tier assigned to degraded records, distinct from a low-information lead.
pub const DEGRADED_TIER: Tier = Tier::Medium;

/// Sequences gathering, scoring and record assembly for one submission.
///
/// The only error `process` returns is `InvalidSubmission`; every other
/// failure ends in a (possibly degraded) record.
pub struct PipelineCoordinator {
    gatherer: Arc<dyn LeadGatherer>,
    scoring: ScoringEngine,
}

fn enter(stage: LeadStage, lead_id: &Uuid) {
    tracing::debug!(%lead_id, ?stage, "Lead stage transition");
}

impl PipelineCoordinator {
    pub fn new(gatherer: Arc<dyn LeadGatherer>, scoring: ScoringEngine) -> Self {
        Self { gatherer, scoring }
    }

    pub async fn process(&self, submission: Submission) -> Result<LeadRecord, AppError> {
        submission.validate()?;

        let started = Instant::now();
        let lead_id = Uuid::new_v4();
        enter(LeadStage::Received, &lead_id);

        tracing::info!(
            %lead_id,
            email = %submission.email,
            company = %submission.company_name,
            "Processing lead submission"
        );

        enter(LeadStage::Gathering, &lead_id);
        let gathered = AssertUnwindSafe(self.gatherer.gather(&submission))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(AppError::OrchestrationError(format!(
                    "enrichment orchestration panicked: {}",
                    message
                )))
            });

        let fragments = match gathered {
            Ok(fragments) => fragments,
            Err(e) => {
                enter(LeadStage::Degraded, &lead_id);
                tracing::error!(%lead_id, "Enrichment orchestration failed, using fallback: {}", e);
                let record = self.degraded_record(lead_id, submission, started);
                enter(LeadStage::Complete, &lead_id);
                return Ok(record);
            }
        };

        enter(LeadStage::Scoring, &lead_id);
        let lead_score = self.scoring.score(&submission, &fragments);

        let calls_issued = fragments.iter().filter(|f| f.was_issued()).count();
        let calls_succeeded = fragments.iter().filter(|f| f.is_success()).count();
        let success_rate = if calls_issued == 0 {
            0.0
        } else {
            calls_succeeded as f64 / calls_issued as f64
        };

        let record = LeadRecord {
            id: lead_id,
            submission,
            fragments,
            score: lead_score.score,
            tier: lead_score.tier,
            flags: lead_score.flags,
            breakdown: lead_score.breakdown,
            meta: RecordMeta {
                processed_at: Utc::now(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                calls_issued,
                calls_succeeded,
                success_rate,
                degraded: false,
            },
        };
        enter(LeadStage::Complete, &lead_id);

        tracing::info!(
            %lead_id,
            score = record.score,
            tier = %record.tier,
            auto_qualify = record.flags.auto_qualify,
            immediate_callback = record.flags.immediate_callback,
            elapsed_ms = record.meta.elapsed_ms,
            "✓ Lead scored"
        );

        Ok(record)
    }

    /// Record for a submission whose enrichment could not be orchestrated.
    fn degraded_record(&self, id: Uuid, submission: Submission, started: Instant) -> LeadRecord {
        let lead_score = self.scoring.score(&submission, &[]);
        LeadRecord {
            id,
            submission,
            fragments: Vec::new(),
            score: lead_score.score,
            tier: DEGRADED_TIER,
            flags: LeadFlags::default(),
            breakdown: lead_score.breakdown,
            meta: RecordMeta {
                processed_at: Utc::now(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                calls_issued: 0,
                calls_succeeded: 0,
                success_rate: 0.0,
                degraded: true,
            },
        }
    }
}
