use crate::config::Config;
use crate::errors::ProviderError;
use crate::models::{ContactRole, EnrichmentRequest};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

/// A source of enrichment intelligence.
///
/// Implementations perform exactly one round-trip and translate the
/// provider's wire format into a neutral JSON reply. Retries, normalization
/// into typed payloads and failure folding live in `EnrichmentClient`.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: &EnrichmentRequest) -> Result<Value, ProviderError>;
}

/// Read a successful JSON body, or turn a non-2xx status into an error.
async fn read_json(response: reqwest::Response, provider: &str) -> Result<Value, ProviderError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!("{} returned error {}: {}", provider, status, error_text);
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: error_text,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ProviderError::Decode(e.to_string()))
}

// ============ Vacancy analysis (Anthropic Messages API) ============

const ANALYSIS_PROMPT: &str = r#"Je bent een expert vacaturetekst-analist voor de Nederlandse arbeidsmarkt.

## CONTEXT
- Bedrijf: {company}
- Functie: {job_title}
- Sector: {sector}
- Doel: {goal}
- Website: {domain}

## OPDRACHT
Analyseer de vacaturetekst en lever exact deze structuur:

---
## ANALYSE
**Score:** X/10
**Sterke punten:** [bullets]
**Verbeterpunten:** [bullets]

---
## GEOPTIMALISEERDE VACATURETEKST
[Herschreven tekst, 400-600 woorden]

---
## CONVERSIE
Sollicitaties +X%, Time-to-fill -X dagen

## VACATURETEKST
{vacancy}"#;

const NO_VACANCY_TEXT: &str =
    "Geen vacaturetekst aangeleverd - beoordeel op basis van de context en geef algemene tips.";

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

fn score_regex() -> &'static Regex {
    static SCORE: OnceLock<Regex> = OnceLock::new();
    SCORE.get_or_init(|| {
        Regex::new(r"(?i)\*{0,2}score:?\*{0,2}:?\s*(\d+(?:[.,]\d+)?)\s*/\s*10")
            .expect("static score regex")
    })
}

fn conversion_regex() -> &'static Regex {
    static CONVERSION: OnceLock<Regex> = OnceLock::new();
    CONVERSION.get_or_init(|| {
        Regex::new(r"(?is)##\s*CONVERSIE\s*\n+\s*([^\n]+)").expect("static conversion regex")
    })
}

/// Pull the `Score: X/10` figure out of an analysis text.
pub fn extract_quality_score(analysis: &str) -> Option<f64> {
    score_regex()
        .captures(analysis)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
}

/// Pull the first line of the conversion section out of an analysis text.
pub fn extract_conversion_estimate(analysis: &str) -> Option<String> {
    conversion_regex()
        .captures(analysis)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

pub struct AnthropicVacancyProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicVacancyProvider {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(
            config.anthropic_base_url.clone(),
            config.anthropic_api_key.clone(),
            config.anthropic_model.clone(),
        )
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
            model,
            max_tokens: 4096,
        }
    }

    fn build_prompt(request: &EnrichmentRequest) -> Option<String> {
        let EnrichmentRequest::VacancyAnalysis {
            vacancy_text,
            company_name,
            job_title,
            sector,
            goal,
            company_domain,
        } = request
        else {
            return None;
        };

        Some(
            ANALYSIS_PROMPT
                .replace("{company}", or_placeholder(company_name, "Onbekend"))
                .replace("{job_title}", or_placeholder(job_title, "Onbekend"))
                .replace("{sector}", or_placeholder(sector, "Algemeen"))
                .replace(
                    "{goal}",
                    or_placeholder(goal, "Meer gekwalificeerde sollicitanten"),
                )
                .replace(
                    "{domain}",
                    company_domain.as_deref().unwrap_or("Onbekend"),
                )
                .replace("{vacancy}", or_placeholder(vacancy_text, NO_VACANCY_TEXT)),
        )
    }
}

#[async_trait]
impl EnrichmentProvider for AnthropicVacancyProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn fetch(&self, request: &EnrichmentRequest) -> Result<Value, ProviderError> {
        let prompt = Self::build_prompt(request)
            .ok_or_else(|| ProviderError::Unsupported(request.kind().to_string()))?;

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        tracing::info!("Requesting vacancy analysis from Anthropic");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let result = read_json(response, self.name()).await?;

        let Some(text) = result
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
        else {
            tracing::warn!("Anthropic response has no text content");
            return Ok(Value::Null);
        };

        let tokens_used = result.get("usage").map(|usage| {
            usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0)
                + usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0)
        });

        let score = extract_quality_score(text);
        tracing::info!(
            "Vacancy analysis received: {} chars, score {:?}",
            text.len(),
            score
        );

        Ok(json!({
            "analysis": text,
            "score": score,
            "conversion_estimate": extract_conversion_estimate(text),
            "tokens_used": tokens_used,
        }))
    }
}

// ============ Organization and contacts (Apollo) ============

pub const HR_TITLES: &[&str] = &[
    "hr",
    "human resources",
    "hr manager",
    "recruiter",
    "recruitment",
    "talent acquisition",
    "people operations",
];

pub const DECISION_MAKER_SENIORITIES: &[&str] = &["c_suite", "vp", "director", "owner", "founder"];

pub struct ApolloProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApolloProvider {
    pub fn new(config: &Config) -> Self {
        Self::with_base_url(config.apollo_base_url.clone(), config.apollo_api_key.clone())
    }

    pub fn with_base_url(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Organization enrichment by domain.
    async fn organization(&self, domain: &str) -> Result<Value, ProviderError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/v1/organizations/enrich", self.base_url),
            &[("domain", domain)],
        )
        .map_err(|e| ProviderError::Transport(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Apollo: enriching organization {}", domain);

        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        let result = read_json(response, self.name()).await?;

        let Some(org) = result.get("organization").filter(|o| o.is_object()) else {
            tracing::info!("Apollo: no organization found for {}", domain);
            return Ok(Value::Null);
        };

        Ok(json!({
            "name": org.get("name"),
            "employees": org.get("estimated_num_employees"),
            "industry": org.get("industry"),
            "revenue": org.get("annual_revenue"),
        }))
    }

    /// People search by domain, filtered to one role group.
    async fn contacts(&self, domain: &str, role: ContactRole) -> Result<Value, ProviderError> {
        let mut body = json!({
            "q_organization_domains": domain,
            "page": 1,
            "per_page": 10,
        });
        match role {
            ContactRole::Hr => body["person_titles"] = json!(HR_TITLES),
            ContactRole::DecisionMaker => {
                body["person_seniorities"] = json!(DECISION_MAKER_SENIORITIES)
            }
        }

        tracing::info!("Apollo: searching {:?} contacts at {}", role, domain);

        let response = self
            .client
            .post(format!("{}/v1/mixed_people/search", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Cache-Control", "no-cache")
            .json(&body)
            .send()
            .await?;

        let result = read_json(response, self.name()).await?;

        let count = result
            .get("pagination")
            .and_then(|p| p.get("total_entries"))
            .and_then(Value::as_u64)
            .or_else(|| {
                result
                    .get("people")
                    .and_then(Value::as_array)
                    .map(|people| people.len() as u64)
            });

        match count {
            Some(count) => {
                tracing::info!("Apollo: {} {:?} contacts at {}", count, role, domain);
                Ok(json!({ "count": count }))
            }
            None => Ok(json!({})),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for ApolloProvider {
    fn name(&self) -> &'static str {
        "apollo"
    }

    async fn fetch(&self, request: &EnrichmentRequest) -> Result<Value, ProviderError> {
        match request {
            EnrichmentRequest::OrganizationProfile { domain } => self.organization(domain).await,
            EnrichmentRequest::ContactDiscovery { domain, role } => {
                self.contacts(domain, *role).await
            }
            EnrichmentRequest::VacancyAnalysis { .. } => {
                Err(ProviderError::Unsupported(request.kind().to_string()))
            }
        }
    }
}
