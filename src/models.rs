use crate::errors::AppError;
use chrono::{DateTime, Utc};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

// ============ Submission ============

/// Accepted source keys per canonical field, in priority order.
/// Keys are matched case-insensitively against the incoming form fields.
pub const EMAIL_ALIASES: &[&str] = &["email", "email_address", "e-mail", "field_mnmhlbesixfh"];
pub const FULL_NAME_ALIASES: &[&str] = &["name", "full_name", "contact_name", "naam"];
pub const FIRST_NAME_ALIASES: &[&str] = &["first_name", "firstname", "voornaam", "field_rlwcm9qidvnn"];
pub const LAST_NAME_ALIASES: &[&str] = &["last_name", "lastname", "achternaam", "field_q9xgrm7jnbiy"];
pub const PHONE_ALIASES: &[&str] = &["phone", "phone_number", "telefoon", "telephone", "field_1izbbbmjqjeo"];
pub const COMPANY_ALIASES: &[&str] = &["company_name", "company", "bedrijf", "organization", "field_ock4xgomqr46"];
pub const JOB_TITLE_ALIASES: &[&str] = &["job_title", "functie", "position", "vacancy_title"];
pub const VACANCY_ALIASES: &[&str] = &["vacancy_text", "vacature", "vacaturetekst", "vacancy", "job_description", "description"];
pub const DOMAIN_ALIASES: &[&str] = &["company_domain", "domain", "website", "company_website"];
pub const SECTOR_ALIASES: &[&str] = &["sector", "industry", "branche", "field_mpi700tsog7e"];
pub const GOAL_ALIASES: &[&str] = &["goal", "doel", "field_btapxjrblf0k"];

/// Mail providers whose domain says nothing about the sender's employer.
pub const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "hotmail.com",
    "hotmail.nl",
    "outlook.com",
    "outlook.nl",
    "live.com",
    "live.nl",
    "msn.com",
    "yahoo.com",
    "icloud.com",
    "me.com",
    "ziggo.nl",
    "kpnmail.nl",
    "proton.me",
    "protonmail.com",
];

/// Immutable form submission, resolved once from whatever keys the form used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company_name: String,
    pub job_title: String,
    pub vacancy_text: String,
    pub company_domain: Option<String>,
    pub sector: String,
    pub goal: String,
    pub submission_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("static email regex")
    })
}

/// Validate email address format (local@domain.tld).
pub fn is_valid_email(email: &str) -> bool {
    email.len() >= 5 && email_regex().is_match(email)
}

/// Normalize a phone number to E.164, assuming the Netherlands when no
/// country code is given. Numbers that don't parse are kept as entered.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match phonenumber::parse(Some(CountryId::NL), trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Normalized phone: {} → {}", trimmed, formatted);
            formatted
        }
        Ok(_) | Err(_) => {
            tracing::debug!("Keeping unrecognized phone as entered: {}", trimmed);
            trimmed.to_string()
        }
    }
}

/// Reduce a domain or website value to a bare lowercase host.
///
/// Returns `None` when the value can't be read as a host name.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let parsed = url::Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return None;
    }
    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return None;
    }
    Some(host)
}

fn lookup(fields: &HashMap<String, String>, aliases: &[&str]) -> String {
    aliases
        .iter()
        .filter_map(|alias| fields.get(*alias))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

impl Submission {
    /// Build a submission from a flat field map.
    ///
    /// Every canonical field is resolved from its alias list here, so nothing
    /// downstream needs to know which form produced the lead.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let fields: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
            .collect();

        let name = {
            let full = lookup(&fields, FULL_NAME_ALIASES);
            if full.is_empty() {
                format!(
                    "{} {}",
                    lookup(&fields, FIRST_NAME_ALIASES),
                    lookup(&fields, LAST_NAME_ALIASES)
                )
                .trim()
                .to_string()
            } else {
                full
            }
        };

        let domain = lookup(&fields, DOMAIN_ALIASES);

        Self {
            name,
            email: lookup(&fields, EMAIL_ALIASES).to_lowercase(),
            phone: normalize_phone(&lookup(&fields, PHONE_ALIASES)),
            company_name: lookup(&fields, COMPANY_ALIASES),
            job_title: lookup(&fields, JOB_TITLE_ALIASES),
            vacancy_text: lookup(&fields, VACANCY_ALIASES),
            company_domain: if domain.is_empty() { None } else { Some(domain) },
            sector: lookup(&fields, SECTOR_ALIASES),
            goal: lookup(&fields, GOAL_ALIASES),
            submission_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_submission_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.submission_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }

    /// Email is the only field a lead cannot be processed without.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() {
            return Err(AppError::InvalidSubmission("email is required".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(AppError::InvalidSubmission(format!(
                "'{}' is not a valid email address",
                self.email
            )));
        }
        Ok(())
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    /// Company domain used for organization and contact lookups.
    ///
    /// An explicit domain wins; otherwise the email's domain is used unless it
    /// belongs to a free-mail provider. An explicit value that isn't a host
    /// name is an error rather than a silent fallback.
    pub fn resolve_company_domain(&self) -> Result<Option<String>, AppError> {
        if let Some(ref explicit) = self.company_domain {
            return normalize_domain(explicit).map(Some).ok_or_else(|| {
                AppError::OrchestrationError(format!(
                    "unresolvable company domain '{}'",
                    explicit
                ))
            });
        }

        let Some((_, email_domain)) = self.email.rsplit_once('@') else {
            return Ok(None);
        };
        let email_domain = email_domain.trim().to_lowercase();
        if email_domain.is_empty() || FREE_MAIL_DOMAINS.contains(&email_domain.as_str()) {
            return Ok(None);
        }
        Ok(normalize_domain(&email_domain))
    }
}

// ============ Enrichment requests ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    VacancyAnalysis,
    OrganizationProfile,
    ContactDiscovery,
}

impl EnrichmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentKind::VacancyAnalysis => "vacancy_analysis",
            EnrichmentKind::OrganizationProfile => "organization_profile",
            EnrichmentKind::ContactDiscovery => "contact_discovery",
        }
    }
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role filter for contact discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    /// HR, recruitment and talent-acquisition titles.
    Hr,
    /// C-suite, VP and director seniority.
    DecisionMaker,
}

/// One enrichment sub-query, carrying exactly the content sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentRequest {
    VacancyAnalysis {
        vacancy_text: String,
        company_name: String,
        job_title: String,
        sector: String,
        goal: String,
        company_domain: Option<String>,
    },
    OrganizationProfile {
        domain: String,
    },
    ContactDiscovery {
        domain: String,
        role: ContactRole,
    },
}

impl EnrichmentRequest {
    pub fn vacancy_analysis(submission: &Submission, company_domain: Option<&str>) -> Self {
        EnrichmentRequest::VacancyAnalysis {
            vacancy_text: submission.vacancy_text.clone(),
            company_name: submission.company_name.clone(),
            job_title: submission.job_title.clone(),
            sector: submission.sector.clone(),
            goal: submission.goal.clone(),
            company_domain: company_domain.map(str::to_string),
        }
    }

    pub fn kind(&self) -> EnrichmentKind {
        match self {
            EnrichmentRequest::VacancyAnalysis { .. } => EnrichmentKind::VacancyAnalysis,
            EnrichmentRequest::OrganizationProfile { .. } => EnrichmentKind::OrganizationProfile,
            EnrichmentRequest::ContactDiscovery { .. } => EnrichmentKind::ContactDiscovery,
        }
    }

    pub fn role(&self) -> Option<ContactRole> {
        match self {
            EnrichmentRequest::ContactDiscovery { role, .. } => Some(*role),
            _ => None,
        }
    }
}

// ============ Enrichment payloads ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacancyAnalysis {
    /// Quality of the vacancy text on a 0-10 scale.
    pub quality_score: f64,
    pub analysis: String,
    pub conversion_estimate: String,
    pub tokens_used: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub name: Option<String>,
    pub employees: Option<u64>,
    pub industry: String,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDiscovery {
    pub role: ContactRole,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnrichmentPayload {
    VacancyAnalysis(VacancyAnalysis),
    OrganizationProfile(OrganizationProfile),
    ContactDiscovery(ContactDiscovery),
}

pub const UNKNOWN_INDUSTRY: &str = "Unknown";

impl EnrichmentPayload {
    /// Read a provider-neutral reply into the payload for `request`.
    ///
    /// Returns `None` when the reply parsed but lacks the fields this kind
    /// needs; the caller turns that into a `Skipped` fragment.
    pub fn from_reply(request: &EnrichmentRequest, reply: &Value) -> Option<Self> {
        match request {
            EnrichmentRequest::VacancyAnalysis { .. } => {
                let analysis = reply.get("analysis")?.as_str()?.trim();
                let score = reply.get("score")?.as_f64()?;
                if analysis.is_empty() || !score.is_finite() {
                    return None;
                }
                Some(EnrichmentPayload::VacancyAnalysis(VacancyAnalysis {
                    quality_score: score.clamp(0.0, 10.0),
                    analysis: analysis.to_string(),
                    conversion_estimate: reply
                        .get("conversion_estimate")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    tokens_used: reply.get("tokens_used").and_then(Value::as_u64),
                }))
            }
            EnrichmentRequest::OrganizationProfile { .. } => {
                let org = reply.as_object()?;
                if !["employees", "industry", "name"]
                    .iter()
                    .any(|key| org.get(*key).is_some_and(|v| !v.is_null()))
                {
                    return None;
                }
                let employees = org.get("employees").and_then(|v| {
                    v.as_u64()
                        .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                });
                let industry = org
                    .get("industry")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(UNKNOWN_INDUSTRY)
                    .to_string();
                Some(EnrichmentPayload::OrganizationProfile(OrganizationProfile {
                    name: org.get("name").and_then(Value::as_str).map(str::to_string),
                    employees,
                    industry,
                    revenue: org.get("revenue").and_then(Value::as_f64),
                }))
            }
            EnrichmentRequest::ContactDiscovery { role, .. } => {
                let count = reply.get("count")?.as_u64()?;
                Some(EnrichmentPayload::ContactDiscovery(ContactDiscovery {
                    role: *role,
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                }))
            }
        }
    }
}

// ============ Fragments ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FragmentStatus {
    Success { payload: EnrichmentPayload },
    Failed { reason: String },
    Skipped { reason: String },
}

/// Result (or failure) of one enrichment sub-query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFragment {
    pub kind: EnrichmentKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<ContactRole>,
    /// Provider round-trips made; 0 when the call was never issued.
    pub attempts: u32,
    pub status: FragmentStatus,
}

impl EnrichmentFragment {
    pub fn new(
        kind: EnrichmentKind,
        role: Option<ContactRole>,
        attempts: u32,
        status: FragmentStatus,
    ) -> Self {
        Self {
            kind,
            role,
            attempts,
            status,
        }
    }

    pub fn success(request: &EnrichmentRequest, payload: EnrichmentPayload, attempts: u32) -> Self {
        Self::new(
            request.kind(),
            request.role(),
            attempts,
            FragmentStatus::Success { payload },
        )
    }

    pub fn failed(
        kind: EnrichmentKind,
        role: Option<ContactRole>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            kind,
            role,
            attempts,
            FragmentStatus::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn skipped(
        kind: EnrichmentKind,
        role: Option<ContactRole>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            kind,
            role,
            attempts,
            FragmentStatus::Skipped {
                reason: reason.into(),
            },
        )
    }

    pub fn payload(&self) -> Option<&EnrichmentPayload> {
        match &self.status {
            FragmentStatus::Success { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FragmentStatus::Success { .. })
    }

    pub fn was_issued(&self) -> bool {
        self.attempts > 0
    }

    /// Short name for logs, e.g. `contact_discovery/hr`.
    pub fn label(&self) -> String {
        match self.role {
            Some(ContactRole::Hr) => format!("{}/hr", self.kind),
            Some(ContactRole::DecisionMaker) => format!("{}/decision_maker", self.kind),
            None => self.kind.to_string(),
        }
    }
}

// ============ Lead record ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Low => f.write_str("LOW"),
            Tier::Medium => f.write_str("MEDIUM"),
            Tier::High => f.write_str("HIGH"),
        }
    }
}

/// Routing flags consumed by CRM and notification collaborators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFlags {
    pub auto_qualify: bool,
    pub immediate_callback: bool,
}

/// Points contributed by each scoring signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub vacancy_quality: u8,
    pub company_size: u8,
    pub industry_match: u8,
    pub contactability: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        u32::from(self.vacancy_quality)
            + u32::from(self.company_size)
            + u32::from(self.industry_match)
            + u32::from(self.contactability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub processed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub calls_issued: usize,
    pub calls_succeeded: usize,
    /// `calls_succeeded / calls_issued`, 0.0 when nothing was issued.
    pub success_rate: f64,
    /// Produced by the fallback path after an orchestration fault.
    pub degraded: bool,
}

/// Aggregate handed to the CRM writer and notifier. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub submission: Submission,
    pub fragments: Vec<EnrichmentFragment>,
    pub score: u8,
    pub tier: Tier,
    pub flags: LeadFlags,
    pub breakdown: ScoreBreakdown,
    pub meta: RecordMeta,
}

impl LeadRecord {
    pub fn vacancy_analysis(&self) -> Option<&VacancyAnalysis> {
        self.fragments.iter().find_map(|f| match f.payload() {
            Some(EnrichmentPayload::VacancyAnalysis(v)) => Some(v),
            _ => None,
        })
    }

    pub fn organization(&self) -> Option<&OrganizationProfile> {
        self.fragments.iter().find_map(|f| match f.payload() {
            Some(EnrichmentPayload::OrganizationProfile(o)) => Some(o),
            _ => None,
        })
    }
}

/// Lifecycle of a single submission through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeadStage {
    Received,
    Gathering,
    Scoring,
    Degraded,
    Complete,
}
