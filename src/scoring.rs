//! Deterministic lead scoring.
//!
//! Four independent signals, each capped at its own ceiling before summing:
//!
//! | Signal          | Max | Source                                   |
//! |-----------------|-----|------------------------------------------|
//! | Vacancy quality | 40  | `round(quality × 4)`                     |
//! | Company size    | 25  | employee-count bands                     |
//! | Industry match  | 15  | case-insensitive substring against a list |
//! | Contactability  | 20  | `min(hr×2,10) + min(decision×2,10)`      |
//!
//! Absent, failed or skipped fragments contribute 0.

use crate::config::DEFAULT_PRIORITY_INDUSTRIES;
use crate::models::{
    ContactRole, EnrichmentFragment, EnrichmentPayload, LeadFlags, ScoreBreakdown, Submission,
    Tier,
};
use serde::{Deserialize, Serialize};

pub const MAX_VACANCY_POINTS: u8 = 40;
pub const MAX_SIZE_POINTS: u8 = 25;
pub const MAX_INDUSTRY_POINTS: u8 = 15;
pub const MAX_CONTACT_POINTS_PER_ROLE: u8 = 10;
pub const MAX_SCORE: u8 = 100;

/// Thresholds and industry list; all overridable, defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub high_threshold: u8,
    pub medium_threshold: u8,
    pub auto_qualify_threshold: u8,
    pub immediate_callback_threshold: u8,
    pub priority_industries: Vec<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_threshold: 80,
            medium_threshold: 60,
            auto_qualify_threshold: 70,
            immediate_callback_threshold: 85,
            priority_industries: DEFAULT_PRIORITY_INDUSTRIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub score: u8,
    pub tier: Tier,
    pub flags: LeadFlags,
    pub breakdown: ScoreBreakdown,
}

pub fn vacancy_points(quality: Option<f64>) -> u8 {
    match quality {
        Some(q) if q.is_finite() => {
            let points = (q.clamp(0.0, 10.0) * 4.0).round();
            (points as u8).min(MAX_VACANCY_POINTS)
        }
        _ => 0,
    }
}

pub fn size_points(employees: Option<u64>) -> u8 {
    match employees {
        Some(n) if n > 500 => 25,
        Some(n) if n > 200 => 20,
        Some(n) if n > 50 => 15,
        Some(n) if n > 10 => 10,
        _ => 0,
    }
}

pub fn contact_points(hr_count: u32, decision_count: u32) -> u8 {
    let per_role = |count: u32| -> u8 {
        let doubled = count.saturating_mul(2);
        doubled.min(u32::from(MAX_CONTACT_POINTS_PER_ROLE)) as u8
    };
    per_role(hr_count) + per_role(decision_count)
}

#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn industry_points(&self, industry: Option<&str>) -> u8 {
        let Some(industry) = industry else {
            return 0;
        };
        let industry = industry.to_lowercase();
        let matched = self
            .config
            .priority_industries
            .iter()
            .map(|p| p.trim().to_lowercase())
            .any(|p| !p.is_empty() && industry.contains(&p));
        if matched {
            MAX_INDUSTRY_POINTS
        } else {
            0
        }
    }

    pub fn tier_for(&self, score: u8) -> Tier {
        if score >= self.config.high_threshold {
            Tier::High
        } else if score >= self.config.medium_threshold {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    pub fn flags_for(&self, score: u8) -> LeadFlags {
        LeadFlags {
            auto_qualify: score >= self.config.auto_qualify_threshold,
            immediate_callback: score >= self.config.immediate_callback_threshold,
        }
    }

    /// Score a submission from whichever fragments arrived.
    ///
    /// Submission fields do not currently feed any signal; only successful
    /// fragment payloads do. When several fragments of one kind succeed, the
    /// first one counts.
    pub fn score(&self, _submission: &Submission, fragments: &[EnrichmentFragment]) -> LeadScore {
        let mut quality = None;
        let mut organization = None;
        let mut hr_count = None;
        let mut decision_count = None;

        for payload in fragments.iter().filter_map(EnrichmentFragment::payload) {
            match payload {
                EnrichmentPayload::VacancyAnalysis(v) => {
                    quality.get_or_insert(v.quality_score);
                }
                EnrichmentPayload::OrganizationProfile(o) => {
                    organization.get_or_insert(o);
                }
                EnrichmentPayload::ContactDiscovery(c) => match c.role {
                    ContactRole::Hr => {
                        hr_count.get_or_insert(c.count);
                    }
                    ContactRole::DecisionMaker => {
                        decision_count.get_or_insert(c.count);
                    }
                },
            }
        }

        let breakdown = ScoreBreakdown {
            vacancy_quality: vacancy_points(quality),
            company_size: size_points(organization.and_then(|o| o.employees)),
            industry_match: self.industry_points(organization.map(|o| o.industry.as_str())),
            contactability: contact_points(hr_count.unwrap_or(0), decision_count.unwrap_or(0)),
        };

        let score = breakdown.total().min(u32::from(MAX_SCORE)) as u8;

        LeadScore {
            score,
            tier: self.tier_for(score),
            flags: self.flags_for(score),
            breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacancy_points_rounding() {
        assert_eq!(vacancy_points(Some(10.0)), 40);
        assert_eq!(vacancy_points(Some(4.2)), 17);
        assert_eq!(vacancy_points(Some(6.125)), 25);
        assert_eq!(vacancy_points(Some(-3.0)), 0);
        assert_eq!(vacancy_points(Some(f64::NAN)), 0);
        assert_eq!(vacancy_points(None), 0);
    }

    #[test]
    fn test_size_bands_are_exclusive_lower_bounds() {
        assert_eq!(size_points(Some(501)), 25);
        assert_eq!(size_points(Some(500)), 20);
        assert_eq!(size_points(Some(201)), 20);
        assert_eq!(size_points(Some(200)), 15);
        assert_eq!(size_points(Some(51)), 15);
        assert_eq!(size_points(Some(50)), 10);
        assert_eq!(size_points(Some(11)), 10);
        assert_eq!(size_points(Some(10)), 0);
        assert_eq!(size_points(None), 0);
    }

    #[test]
    fn test_contact_points_cap_per_role() {
        assert_eq!(contact_points(3, 2), 10);
        assert_eq!(contact_points(5, 0), 10);
        assert_eq!(contact_points(50, 50), 20);
        assert_eq!(contact_points(u32::MAX, 1), 12);
    }

    #[test]
    fn test_industry_match_case_insensitive() {
        let engine = ScoringEngine::default();
        assert_eq!(engine.industry_points(Some("Information Technology & Services")), 15);
        assert_eq!(engine.industry_points(Some("HEALTHCARE")), 15);
        assert_eq!(engine.industry_points(Some("Retail")), 0);
        assert_eq!(engine.industry_points(Some("Unknown")), 0);
        assert_eq!(engine.industry_points(None), 0);
    }

    #[test]
    fn test_custom_thresholds() {
        let engine = ScoringEngine::new(ScoringConfig {
            high_threshold: 50,
            medium_threshold: 20,
            auto_qualify_threshold: 30,
            immediate_callback_threshold: 90,
            priority_industries: vec!["logistics".into()],
        });
        assert_eq!(engine.tier_for(55), Tier::High);
        assert_eq!(engine.tier_for(25), Tier::Medium);
        assert_eq!(engine.tier_for(19), Tier::Low);
        assert!(engine.flags_for(30).auto_qualify);
        assert!(!engine.flags_for(89).immediate_callback);
        assert_eq!(engine.industry_points(Some("Logistics & Supply Chain")), 15);
        assert_eq!(engine.industry_points(Some("Technology")), 0);
    }
}
