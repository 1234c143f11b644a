use crate::crm_client::LeadSink;
use crate::errors::AppError;
use crate::models::{LeadRecord, Submission};
use crate::pipeline::PipelineCoordinator;
use crate::webhook_models::TypeformWebhook;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gathers, scores and assembles lead records.
    pub coordinator: Arc<PipelineCoordinator>,
    /// CRM writer for completed records (optional).
    pub crm: Option<Arc<dyn LeadSink>>,
    /// Plain HTTP client for fetching uploaded vacancy documents.
    pub http: reqwest::Client,
}

/// Routes that process submissions. `/health` is mounted separately so it
/// bypasses rate limiting.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/leads", post(process_lead))
        .route("/api/v1/webhooks/typeform", post(typeform_webhook))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-qualifier",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Flatten a JSON object of form fields into strings; nested values are ignored.
fn fields_from_json(payload: &Value) -> Result<HashMap<String, String>, AppError> {
    let object = payload
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Expected a JSON object of form fields".to_string()))?;

    Ok(object
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect())
}

/// POST /api/v1/leads
///
/// Accepts a flat JSON object of form fields (any of the accepted aliases)
/// and returns the scored lead record.
pub async fn process_lead(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Result<Json<LeadRecord>, AppError> {
    tracing::info!("POST /api/v1/leads");

    let fields = fields_from_json(&payload)?;
    let submission = Submission::from_fields(&fields);

    let record = state.coordinator.process(submission).await?;
    spawn_crm_push(&state, &record);

    Ok(Json(record))
}

/// POST /api/v1/webhooks/typeform
///
/// Receives a Typeform submission. When the form carries an uploaded vacancy
/// document and no inline text, the document is downloaded first.
pub async fn typeform_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TypeformWebhook>,
) -> Result<Json<LeadRecord>, AppError> {
    tracing::info!(
        token = ?payload.form_response.token,
        answers = payload.form_response.answers.len(),
        "Received Typeform webhook"
    );

    let mut submission = payload.to_submission(&HashMap::new());
    if submission.vacancy_text.is_empty() {
        if let Some(url) = payload.form_response.vacancy_file_url() {
            if let Some(text) = download_vacancy_text(&state.http, url).await {
                let mut extra = HashMap::new();
                extra.insert("vacancy_text".to_string(), text);
                submission = payload.to_submission(&extra);
            }
        }
    }

    let record = state.coordinator.process(submission).await?;
    spawn_crm_push(&state, &record);

    Ok(Json(record))
}

/// Largest vacancy document accepted for download (1 MB).
pub const MAX_VACANCY_FILE_BYTES: usize = 1024 * 1024;

/// Download an uploaded vacancy document as text; failures and documents
/// larger than [`MAX_VACANCY_FILE_BYTES`] yield `None`.
pub async fn download_vacancy_text(client: &reqwest::Client, url: &str) -> Option<String> {
    let mut response = match client.get(url).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::warn!("Vacancy file download returned {}", r.status());
            return None;
        }
        Err(e) => {
            tracing::warn!("Vacancy file download failed: {}", e);
            return None;
        }
    };

    if let Some(length) = response.content_length() {
        if length > MAX_VACANCY_FILE_BYTES as u64 {
            tracing::warn!("Vacancy file too large: {} bytes", length);
            return None;
        }
    }

    let mut bytes = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if bytes.len() + chunk.len() > MAX_VACANCY_FILE_BYTES {
                    tracing::warn!(
                        "Vacancy file exceeds {} bytes, ignoring it",
                        MAX_VACANCY_FILE_BYTES
                    );
                    return None;
                }
                bytes.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read vacancy file body: {}", e);
                return None;
            }
        }
    }

    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    tracing::info!("✓ Vacancy file downloaded: {} chars", text.len());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Hand the record to the CRM writer in the background.
fn spawn_crm_push(state: &AppState, record: &LeadRecord) {
    let Some(crm) = state.crm.clone() else {
        return;
    };
    let record = record.clone();
    tokio::spawn(async move {
        if let Err(e) = crm.push_lead(&record).await {
            tracing::error!(lead_id = %record.id, "CRM push failed: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_from_json_flattens_scalars() {
        let fields = fields_from_json(&json!({
            "email": "jan@acme.nl",
            "employees": 40,
            "consent": true,
            "nested": {"a": 1},
            "empty": null
        }))
        .unwrap();

        assert_eq!(fields.get("email").map(String::as_str), Some("jan@acme.nl"));
        assert_eq!(fields.get("employees").map(String::as_str), Some("40"));
        assert_eq!(fields.get("consent").map(String::as_str), Some("true"));
        assert!(!fields.contains_key("nested"));
        assert!(!fields.contains_key("empty"));
    }

    #[test]
    fn test_fields_from_json_rejects_non_object() {
        assert!(matches!(
            fields_from_json(&json!(["email"])),
            Err(AppError::BadRequest(_))
        ));
    }
}
