//! The per-request envelope: everything one logical client request carries
//! through the guard chain, the forwarder, and the dispatcher.

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde_json::Value as JsonValue;

use modelgate_protocol::{detect_format, WireFormat};
use modelgate_provider::{CircuitState, ProviderId};
use modelgate_transform::ChatRequest;

use crate::auth::AuthContext;
use crate::error::GatewayError;

/// One entry in the diagnostic decision chain.
#[derive(Debug, Clone)]
pub struct DecisionEntry {
    pub provider_id: ProviderId,
    pub reason: &'static str,
    pub circuit_state: CircuitState,
    pub attempt_no: u32,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ProxySession {
    pub trace_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub user_agent: Option<String>,
    pub original_format: WireFormat,
    /// Request model name; model redirection rewrites it in place.
    pub model: String,
    /// Raw parsed body, kept for same-format passthrough so unknown client
    /// fields survive untouched.
    pub body: JsonValue,
    /// Typed view of the same body, used by the translators.
    pub request: ChatRequest,
    pub is_stream: bool,
    pub principal: AuthContext,
    pub provider_id: Option<ProviderId>,
    pub session_id: Option<String>,
    pub decision_chain: Vec<DecisionEntry>,
}

impl ProxySession {
    #[allow(clippy::too_many_arguments)]
    pub fn from_request(
        trace_id: String,
        method: Method,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        raw_body: &Bytes,
    ) -> Result<Self, GatewayError> {
        let body: JsonValue = serde_json::from_slice(raw_body)
            .map_err(|err| GatewayError::InvalidRequest(format!("invalid json body: {err}")))?;
        let original_format = detect_format(&body);
        let request = ChatRequest::parse(original_format, &body)
            .map_err(|err| GatewayError::InvalidRequest(err.to_string()))?;
        let model = request
            .model()
            .filter(|model| !model.is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest("missing model".to_string()))?
            .to_string();

        let user_agent = header_value(&headers, "user-agent");
        let session_id = extract_session_id(&headers, &body);
        let is_stream = request.stream_requested() || path.contains(":streamGenerateContent");

        Ok(Self {
            trace_id,
            method,
            path,
            query,
            headers,
            user_agent,
            original_format,
            model,
            body,
            request,
            is_stream,
            principal: AuthContext::default(),
            provider_id: None,
            session_id,
            decision_chain: Vec::new(),
        })
    }

    /// Apply a model redirection to both views of the body.
    pub fn rewrite_model(&mut self, model: &str) {
        self.model = model.to_string();
        self.request.set_model(model);
        if let Some(value) = self.body.get_mut("model") {
            *value = JsonValue::String(model.to_string());
        }
    }

    pub fn push_decision(&mut self, entry: DecisionEntry) {
        self.decision_chain.push(entry);
    }

    /// Ordered `provider:reason` pairs, for logs.
    pub fn decision_summary(&self) -> String {
        let parts: Vec<String> = self
            .decision_chain
            .iter()
            .map(|entry| format!("{}#{}:{}", entry.provider_id, entry.attempt_no, entry.reason))
            .collect();
        parts.join(" -> ")
    }
}

/// The sticky-session key: an explicit header when present, otherwise the
/// Claude metadata user id.
fn extract_session_id(headers: &HeaderMap, body: &JsonValue) -> Option<String> {
    if let Some(value) = header_value(headers, "x-session-id") {
        return Some(value);
    }
    if let Some(value) = header_value(headers, "session-id") {
        return Some(value);
    }
    body.get("metadata")
        .and_then(|meta| meta.get("user_id"))
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}
