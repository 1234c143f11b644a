use crate::errors::{AppError, ResultExt};
use crate::models::LeadRecord;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Downstream consumer of completed lead records.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn push_lead(&self, record: &LeadRecord) -> Result<CrmResult, AppError>;
}

/// Identifiers created in the CRM for one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct CrmResult {
    pub organization_id: Option<i64>,
    pub person_id: Option<i64>,
    pub deal_id: i64,
}

/// Client for the Pipedrive REST API.
#[derive(Clone)]
pub struct PipedriveClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    pipeline_id: i64,
    stage_id: Option<i64>,
}

impl PipedriveClient {
    /// Creates a new `PipedriveClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the Pipedrive API (including `/v1`).
    /// * `token` - The API token, sent as `api_token` query parameter.
    /// * `pipeline_id` - Pipeline new deals are created in.
    pub fn new(base_url: String, token: String, pipeline_id: i64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token,
            pipeline_id,
            stage_id: None,
        })
    }

    /// Stage a deal is moved to once its analysis note is attached.
    pub fn with_stage(mut self, stage_id: Option<i64>) -> Self {
        self.stage_id = stage_id;
        self
    }

    /// Sends `body` to `endpoint` and returns `data.id` from the response.
    async fn send(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: &Value,
    ) -> Result<i64, AppError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .request(method, &url)
            .query(&[("api_token", self.token.as_str())])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Pipedrive {} returned {}: {}",
                endpoint, status, error_text
            )));
        }

        let data: Value = response.json().await?;

        data.get("data")
            .and_then(|d| d.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                tracing::warn!("Unexpected Pipedrive response format: {:?}", data);
                AppError::ExternalApiError(format!(
                    "Pipedrive {} response missing 'data.id'",
                    endpoint
                ))
            })
    }

    async fn create(&self, endpoint: &str, body: &Value) -> Result<i64, AppError> {
        self.send(reqwest::Method::POST, endpoint, body).await
    }

    pub async fn create_organization(
        &self,
        name: &str,
        domain: Option<&str>,
    ) -> Result<i64, AppError> {
        let mut body = json!({ "name": name });
        if let Some(domain) = domain {
            body["domain"] = json!(domain);
        }
        self.create("organizations", &body).await
    }

    pub async fn create_person(
        &self,
        name: &str,
        email: &str,
        phone: &str,
        org_id: Option<i64>,
    ) -> Result<i64, AppError> {
        let display_name = if name.is_empty() { email } else { name };
        let mut body = json!({
            "name": display_name,
            "email": email,
            "org_id": org_id,
        });
        if !phone.is_empty() {
            body["phone"] = json!(phone);
        }
        self.create("persons", &body).await
    }

    pub async fn create_deal(&self, title: &str, person_id: Option<i64>) -> Result<i64, AppError> {
        let body = json!({
            "title": title,
            "person_id": person_id,
            "pipeline_id": self.pipeline_id,
            "status": "open",
        });
        self.create("deals", &body).await
    }

    pub async fn add_note(&self, deal_id: i64, content: &str) -> Result<i64, AppError> {
        let body = json!({
            "deal_id": deal_id,
            "content": content,
        });
        self.create("notes", &body).await
    }

    pub async fn move_deal_to_stage(&self, deal_id: i64, stage_id: i64) -> Result<i64, AppError> {
        let body = json!({ "stage_id": stage_id });
        self.send(reqwest::Method::PUT, &format!("deals/{}", deal_id), &body)
            .await
    }
}

pub fn deal_title(record: &LeadRecord) -> String {
    let submission = &record.submission;
    let company = if submission.company_name.is_empty() {
        "Onbekend"
    } else {
        submission.company_name.as_str()
    };
    if submission.job_title.is_empty() {
        format!("Vacature Analyse - {}", company)
    } else {
        format!("Vacature Analyse - {} - {}", company, submission.job_title)
    }
}

pub fn deal_note(record: &LeadRecord) -> String {
    let mut note = format!(
        "📊 VACATURE ANALYSE\n\nLead Score: {}/100 ({})\nAuto-qualify: {}\nDirect terugbellen: {}\n",
        record.score,
        record.tier,
        if record.flags.auto_qualify { "ja" } else { "nee" },
        if record.flags.immediate_callback { "ja" } else { "nee" },
    );

    if let Some(org) = record.organization() {
        note.push_str(&format!(
            "Sector: {}\nMedewerkers: {}\n",
            org.industry,
            org.employees
                .map(|n| n.to_string())
                .unwrap_or_else(|| "Onbekend".to_string())
        ));
    }

    if record.meta.degraded {
        note.push_str("⚠️ Verrijking niet beschikbaar, standaard prioriteit toegepast\n");
    }

    match record.vacancy_analysis() {
        Some(analysis) => {
            note.push_str(&format!(
                "Vacature Score: {:.1}/10\n\n---\n\n{}",
                analysis.quality_score, analysis.analysis
            ));
        }
        None => note.push_str("\nAnalyse niet beschikbaar"),
    }

    note
}

#[async_trait]
impl LeadSink for PipedriveClient {
    async fn push_lead(&self, record: &LeadRecord) -> Result<CrmResult, AppError> {
        let submission = &record.submission;
        tracing::info!(lead_id = %record.id, "Pushing lead to Pipedrive");

        let organization_id = if submission.company_name.is_empty() {
            None
        } else {
            let domain = submission.resolve_company_domain().ok().flatten();
            match self
                .create_organization(&submission.company_name, domain.as_deref())
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!("Organization creation failed, continuing without: {}", e);
                    None
                }
            }
        };

        let person_id = match self
            .create_person(
                &submission.name,
                &submission.email,
                &submission.phone,
                organization_id,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Person creation failed, continuing without: {}", e);
                None
            }
        };

        let deal_id = self
            .create_deal(&deal_title(record), person_id)
            .await
            .context("creating Pipedrive deal")?;

        if let Err(e) = self.add_note(deal_id, &deal_note(record)).await {
            tracing::warn!("Failed to add analysis note to deal {}: {}", deal_id, e);
        }

        if let Some(stage_id) = self.stage_id {
            if let Err(e) = self.move_deal_to_stage(deal_id, stage_id).await {
                tracing::warn!("Failed to move deal {} to stage {}: {}", deal_id, stage_id, e);
            }
        }

        tracing::info!(lead_id = %record.id, deal_id, "✓ Pipedrive deal created");

        Ok(CrmResult {
            organization_id,
            person_id,
            deal_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = PipedriveClient::new(
            "https://example.com/v1".to_string(),
            "token".to_string(),
            4,
        );
        assert!(client.is_ok());
    }
}
