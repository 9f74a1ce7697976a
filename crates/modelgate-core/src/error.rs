//! The gateway error taxonomy and its per-format client envelopes.
//!
//! Provider names and ids go to logs only; client-visible payloads carry
//! the upstream error excerpt at most, never a credential.

use axum::body::Body;
use axum::response::Response;
use http::StatusCode;
use serde_json::Value as JsonValue;

use modelgate_protocol::{claude, gemini_cli, openai, WireFormat};
use modelgate_provider::ProviderId;
use modelgate_transform::TranslateError;

/// Detail of the last failed upstream attempt, carried by
/// [`GatewayError::AllProvidersFailed`].
#[derive(Debug, Clone)]
pub struct UpstreamAttemptError {
    pub provider_id: ProviderId,
    pub provider_name: String,
    pub status: Option<u16>,
    /// Upstream response body, truncated to a bound.
    pub body_excerpt: String,
    pub class: UpstreamErrorClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorClass {
    Http,
    Network,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("blocked: {0}")]
    Blocked(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("no provider available for this request")]
    NoProviderAvailable,
    #[error("translation unsupported: {0}")]
    TranslationUnsupported(#[from] TranslateError),
    #[error("all providers failed")]
    AllProvidersFailed {
        last: Option<UpstreamAttemptError>,
    },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Blocked(_) => StatusCode::FORBIDDEN,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::TranslationUnsupported(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::AllProvidersFailed { last } => last
                .as_ref()
                .and_then(|error| error.status)
                .and_then(|status| StatusCode::from_u16(status).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::Unauthorized(_) => "authentication_error",
            GatewayError::Blocked(_) => "permission_error",
            GatewayError::RateLimited(_) => "rate_limit_error",
            GatewayError::NoProviderAvailable => "overloaded_error",
            GatewayError::TranslationUnsupported(_) => "api_error",
            GatewayError::AllProvidersFailed { .. } => "upstream_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            GatewayError::AllProvidersFailed { last: Some(last) } => {
                if let Some(message) = upstream_error_message(&last.body_excerpt) {
                    format!("upstream request failed: {message}")
                } else if !last.body_excerpt.is_empty() {
                    format!("upstream request failed: {}", last.body_excerpt)
                } else {
                    match last.class {
                        UpstreamErrorClass::Network => {
                            "upstream request failed: network error".to_string()
                        }
                        UpstreamErrorClass::Http => format!(
                            "upstream request failed with status {}",
                            last.status.unwrap_or(0)
                        ),
                    }
                }
            }
            GatewayError::AllProvidersFailed { last: None } => {
                "all providers failed".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Shape the error in the caller's wire format.
    pub fn into_response(self, format: WireFormat) -> Response {
        let status = self.status();
        let message = self.client_message();
        let body: JsonValue = match format {
            WireFormat::Claude => {
                serde_json::to_value(claude::ErrorEnvelope::new(self.kind(), message))
            }
            WireFormat::OpenAi | WireFormat::Codex => {
                serde_json::to_value(openai::ErrorEnvelope {
                    error: openai::ErrorBody {
                        message,
                        r#type: Some(self.kind().to_string()),
                        code: Some(status.as_u16().to_string()),
                    },
                })
            }
            WireFormat::GeminiCli => serde_json::to_value(gemini_cli::ErrorEnvelope {
                error: gemini_cli::ErrorBody {
                    code: Some(status.as_u16() as i64),
                    message,
                    status: Some(self.kind().to_string()),
                },
            }),
        }
        .unwrap_or_default();

        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_default()
    }
}

/// Pull the human message out of a known upstream error envelope shape.
fn upstream_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error").unwrap_or(&value);
    error
        .get("message")
        .and_then(|message| message.as_str())
        .filter(|message| !message.is_empty())
        .map(|message| message.to_string())
}
