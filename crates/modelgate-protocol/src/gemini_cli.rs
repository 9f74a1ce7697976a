//! Gemini CLI envelope.
//!
//! The CLI wraps an inner request under a `request` key; the envelope itself
//! is a pure structural wrapper, so the inner body is kept as raw JSON and
//! re-detected when a translation is needed.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt_id: Option<String>,
    pub request: JsonValue,
}

impl RequestEnvelope {
    pub fn wrap(model: Option<String>, inner: JsonValue) -> Self {
        Self {
            model,
            project: None,
            user_prompt_id: None,
            request: inner,
        }
    }

    pub fn into_inner(self) -> JsonValue {
        self.request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub response: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
