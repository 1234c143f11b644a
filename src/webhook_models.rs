use crate::models::Submission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Typeform webhook delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypeformWebhook {
    #[serde(default)]
    pub event_id: Option<String>,

    pub form_response: FormResponse,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormResponse {
    /// Unique response token, used as submission id
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub submitted_at: Option<String>,

    #[serde(default)]
    pub answers: Vec<TypeformAnswer>,

    /// Hidden fields passed through the form URL
    #[serde(default)]
    pub hidden: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerField {
    pub id: String,

    #[serde(rename = "ref", default)]
    pub field_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerChoice {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerChoices {
    #[serde(default)]
    pub labels: Vec<String>,
}

/// One answer; exactly one of the typed value fields is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypeformAnswer {
    pub field: AnswerField,
    pub text: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub url: Option<String>,
    pub file_url: Option<String>,
    pub date: Option<String>,
    pub number: Option<f64>,
    pub boolean: Option<bool>,
    pub choice: Option<AnswerChoice>,
    pub choices: Option<AnswerChoices>,
}

impl TypeformAnswer {
    /// The answer's value as text, whatever its type.
    pub fn value(&self) -> Option<String> {
        self.text
            .clone()
            .or_else(|| self.email.clone())
            .or_else(|| self.phone_number.clone())
            .or_else(|| self.choice.as_ref().and_then(|c| c.label.clone()))
            .or_else(|| self.choices.as_ref().map(|c| c.labels.join(", ")))
            .or_else(|| self.url.clone())
            .or_else(|| self.file_url.clone())
            .or_else(|| self.date.clone())
            .or_else(|| self.number.map(|n| n.to_string()))
            .or_else(|| self.boolean.map(|b| b.to_string()))
    }
}

/// Field id of the vacancy upload on the production form.
pub const VACANCY_FILE_FIELD: &str = "field_4RwV7AZV5PIY";

impl FormResponse {
    /// Flatten answers into a field map keyed by both field id and field ref.
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();

        for (key, value) in &self.hidden {
            if let Some(s) = value.as_str() {
                fields.insert(key.clone(), s.to_string());
            }
        }

        for answer in &self.answers {
            let Some(value) = answer.value() else {
                continue;
            };
            if let Some(ref field_ref) = answer.field.field_ref {
                fields.insert(field_ref.clone(), value.clone());
            }
            fields.insert(answer.field.id.clone(), value);
        }

        fields
    }

    /// URL of an uploaded vacancy document, if the form had one.
    pub fn vacancy_file_url(&self) -> Option<&str> {
        self.answers
            .iter()
            .filter_map(|a| a.file_url.as_deref())
            .find(|url| !url.trim().is_empty())
            .or_else(|| {
                self.answers
                    .iter()
                    .find(|a| a.field.id == VACANCY_FILE_FIELD)
                    .and_then(|a| a.url.as_deref())
            })
    }
}

impl TypeformWebhook {
    pub fn to_submission(&self, extra: &HashMap<String, String>) -> Submission {
        let mut fields = self.form_response.to_fields();
        for (key, value) in extra {
            fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
        let mut submission = Submission::from_fields(&fields);
        if let Some(submitted_at) = self
            .form_response
            .submitted_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            submission.received_at = submitted_at.with_timezone(&Utc);
        }
        match self.form_response.token {
            Some(ref token) => submission.with_submission_id(token.clone()),
            None => submission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TypeformWebhook {
        serde_json::from_value(json!({
            "event_id": "01H",
            "form_response": {
                "token": "test123",
                "submitted_at": "2024-12-01T10:00:00Z",
                "answers": [
                    {"field": {"id": "field_rlWCM9qIDVnn"}, "text": "Test"},
                    {"field": {"id": "field_q9xgrm7jnBIy"}, "text": "User"},
                    {"field": {"id": "field_MnmHLBESIXfh"}, "email": "warts@recruitin.nl"},
                    {"field": {"id": "field_1iZBbbmjqjEO"}, "phone_number": "+31614314593"},
                    {"field": {"id": "field_oCk4xgomQr46", "ref": "company"}, "text": "Test BV"},
                    {"field": {"id": "field_MPI700TSOg7e"}, "choice": {"label": "High-tech & Elektronica"}},
                    {"field": {"id": "field_btapXJRBLF0k"}, "choice": {"label": "Meer sollicitanten"}},
                    {"field": {"id": "field_4RwV7AZV5PIY"}, "file_url": "https://files.example/vacature.txt"}
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_production_form_maps_to_submission() {
        let submission = sample().to_submission(&HashMap::new());

        assert_eq!(submission.name, "Test User");
        assert_eq!(submission.email, "warts@recruitin.nl");
        assert_eq!(submission.phone, "+31614314593");
        assert_eq!(submission.company_name, "Test BV");
        assert_eq!(submission.sector, "High-tech & Elektronica");
        assert_eq!(submission.goal, "Meer sollicitanten");
        assert_eq!(submission.submission_id.as_deref(), Some("test123"));
        assert_eq!(
            submission.received_at.to_rfc3339(),
            "2024-12-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_vacancy_file_url() {
        let webhook = sample();
        assert_eq!(
            webhook.form_response.vacancy_file_url(),
            Some("https://files.example/vacature.txt")
        );
    }

    #[test]
    fn test_extra_fields_do_not_override_answers() {
        let mut extra = HashMap::new();
        extra.insert("vacancy_text".to_string(), "Downloaded text".to_string());
        extra.insert("company".to_string(), "Other BV".to_string());

        let submission = sample().to_submission(&extra);
        assert_eq!(submission.vacancy_text, "Downloaded text");
        assert_eq!(submission.company_name, "Test BV");
    }
}
