use crate::scoring::ScoringConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub apollo_api_key: String,
    pub apollo_base_url: String,
    pub pipedrive_token: Option<String>, // CRM push disabled when absent
    pub pipedrive_base_url: String,
    pub pipedrive_pipeline_id: i64,
    pub pipedrive_stage_id: Option<i64>, // deal stays in its first stage when absent
    pub enrichment_max_attempts: u32,
    pub enrichment_base_delay_ms: u64,
    pub enrichment_deadline_secs: Option<u64>,
    pub enrichment_cache_ttl_secs: u64,
    pub score_high_threshold: u8,
    pub score_medium_threshold: u8,
    pub score_auto_qualify_threshold: u8,
    pub score_callback_threshold: u8,
    pub priority_industries: Vec<String>,
}

pub const DEFAULT_PRIORITY_INDUSTRIES: &[&str] = &[
    "technology",
    "tech",
    "software",
    "healthcare",
    "manufacturing",
    "financial",
];

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn url_or_default(name: &str, default: &str) -> anyhow::Result<String> {
    let url = optional(name).unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn parsed_or_default<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, raw)),
        None => Ok(default),
    }
}

fn threshold(name: &str, default: u8) -> anyhow::Result<u8> {
    let value: u8 = parsed_or_default(name, default)?;
    if value > 100 {
        anyhow::bail!("{} must be between 0 and 100", name);
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: parsed_or_default("PORT", 8080u16)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            anthropic_base_url: url_or_default("ANTHROPIC_BASE_URL", "https://api.anthropic.com")?,
            anthropic_model: optional("ANTHROPIC_MODEL")
                .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            apollo_api_key: required("APOLLO_API_KEY")?,
            apollo_base_url: url_or_default("APOLLO_BASE_URL", "https://api.apollo.io")?,
            pipedrive_token: optional("PIPEDRIVE_API_TOKEN"),
            pipedrive_base_url: url_or_default(
                "PIPEDRIVE_BASE_URL",
                "https://api.pipedrive.com/v1",
            )?,
            pipedrive_pipeline_id: parsed_or_default("PIPEDRIVE_PIPELINE_ID", 4i64)?,
            pipedrive_stage_id: optional("PIPEDRIVE_STAGE_ID")
                .map(|raw| {
                    raw.trim()
                        .parse::<i64>()
                        .map_err(|_| anyhow::anyhow!("PIPEDRIVE_STAGE_ID must be a valid number"))
                })
                .transpose()?,
            enrichment_max_attempts: parsed_or_default("ENRICHMENT_MAX_ATTEMPTS", 3u32)?.max(1),
            enrichment_base_delay_ms: parsed_or_default("ENRICHMENT_BASE_DELAY_MS", 1000u64)?,
            enrichment_deadline_secs: optional("ENRICHMENT_DEADLINE_SECS")
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| {
                        anyhow::anyhow!("ENRICHMENT_DEADLINE_SECS must be a valid number")
                    })
                })
                .transpose()?,
            enrichment_cache_ttl_secs: parsed_or_default("ENRICHMENT_CACHE_TTL_SECS", 3600u64)?,
            score_high_threshold: threshold("SCORE_HIGH_THRESHOLD", 80)?,
            score_medium_threshold: threshold("SCORE_MEDIUM_THRESHOLD", 60)?,
            score_auto_qualify_threshold: threshold("SCORE_AUTO_QUALIFY_THRESHOLD", 70)?,
            score_callback_threshold: threshold("SCORE_CALLBACK_THRESHOLD", 85)?,
            priority_industries: optional("PRIORITY_INDUSTRIES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| {
                    DEFAULT_PRIORITY_INDUSTRIES
                        .iter()
                        .map(|s| s.to_string())
                        .collect()
                }),
        };

        if config.score_medium_threshold > config.score_high_threshold {
            anyhow::bail!("SCORE_MEDIUM_THRESHOLD cannot exceed SCORE_HIGH_THRESHOLD");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Anthropic Base URL: {}", config.anthropic_base_url);
        tracing::debug!("Apollo Base URL: {}", config.apollo_base_url);
        if config.pipedrive_token.is_none() {
            tracing::warn!("PIPEDRIVE_API_TOKEN not set, CRM push disabled");
        }
        tracing::debug!(
            "Enrichment: {} attempts, {}ms base delay, deadline {:?}s",
            config.enrichment_max_attempts,
            config.enrichment_base_delay_ms,
            config.enrichment_deadline_secs
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.enrichment_base_delay_ms)
    }

    pub fn enrichment_deadline(&self) -> Option<Duration> {
        self.enrichment_deadline_secs.map(Duration::from_secs)
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            high_threshold: self.score_high_threshold,
            medium_threshold: self.score_medium_threshold,
            auto_qualify_threshold: self.score_auto_qualify_threshold,
            immediate_callback_threshold: self.score_callback_threshold,
            priority_industries: self.priority_industries.clone(),
        }
    }
}
