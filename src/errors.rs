use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Submission cannot be processed at all (missing or invalid email).
    InvalidSubmission(String),
    /// Bad request error (unreadable payload).
    BadRequest(String),
    /// Error interacting with an external API.
    ExternalApiError(String),
    /// Enrichment orchestration failed before any fragment was produced.
    OrchestrationError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidSubmission(msg) => write!(f, "Invalid submission: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "External API error: {}", msg),
            AppError::OrchestrationError(msg) => write!(f, "Orchestration error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidSubmission(msg) => {
                tracing::warn!("Rejected submission: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ExternalApiError(msg) => {
                tracing::error!("External API error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            AppError::OrchestrationError(msg) => {
                tracing::error!("Orchestration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::InvalidSubmission(msg) => AppError::InvalidSubmission(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::ExternalApiError(msg) => AppError::ExternalApiError(msg.clone()),
            AppError::OrchestrationError(msg) => AppError::OrchestrationError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

/// Outcome of one failed round-trip to an enrichment provider.
///
/// Never escapes `EnrichmentClient`: it is folded into a `Failed` fragment
/// once the retry budget is spent.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Connection refused, reset, DNS failure and the like.
    Transport(String),
    /// The request did not complete within the client timeout.
    Timeout,
    /// Provider answered with a non-2xx status.
    Status { status: u16, body: String },
    /// Body could not be decoded as JSON at all.
    Decode(String),
    /// Provider was handed a request kind it does not serve.
    Unsupported(String),
}

impl ProviderError {
    /// Transient faults are worth another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout => true,
            ProviderError::Status { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Decode(_) | ProviderError::Unsupported(_) => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {}", msg),
            ProviderError::Timeout => write!(f, "timeout"),
            ProviderError::Status { status, body } => {
                write!(f, "provider returned status {}: {}", status, body)
            }
            ProviderError::Decode(msg) => write!(f, "malformed response: {}", msg),
            ProviderError::Unsupported(kind) => write!(f, "unsupported request kind: {}", kind),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(ProviderError::Status {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Status {
            status: 401,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let status = |e: AppError| e.into_response().status();
        assert_eq!(
            status(AppError::InvalidSubmission("email is required".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status(AppError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AppError::ExternalApiError("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(AppError::OrchestrationError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let wrapped: Result<(), AppError> = Err(AppError::BadRequest("x".into()));
        assert_eq!(
            status(wrapped.context("reading payload").unwrap_err()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_context_chain_display() {
        let err: Result<(), AppError> = Err(AppError::ExternalApiError("boom".into()));
        let err = err.context("creating deal").unwrap_err();
        assert_eq!(err.to_string(), "creating deal: External API error: boom");
    }
}
