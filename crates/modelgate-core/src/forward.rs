//! The retry/failover loop. One logical client request tolerates up to
//! `MAX_RETRY_ATTEMPTS` provider failures; every attempt picks a provider,
//! rewrites the model, translates and sanitizes the body, rebuilds headers
//! and the upstream URL, and classifies the result.

use std::collections::HashSet;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method};
use tracing::{info, warn};

use modelgate_protocol::WireFormat;
use modelgate_provider::{
    pick, Admission, Provider, SelectionInput, SessionPermit,
};
use modelgate_transform::constants::{
    is_official_user_agent, CODEX_FORCED_USER_AGENT, CODEX_RESPONSES_PATH,
};
use modelgate_transform::sanitize::sanitize_codex_request;
use modelgate_transform::{translate_request, ChatRequest};

use crate::error::{GatewayError, UpstreamAttemptError, UpstreamErrorClass};
use crate::session::{DecisionEntry, ProxySession};
use crate::state::GatewayState;
use crate::upstream::{UpstreamBody, UpstreamHttpRequest, UpstreamHttpResponse};

/// Provider failures tolerated before the request is abandoned; the loop
/// runs at most one more attempt than this.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

const DECISION_ERROR_LIMIT: usize = 512;

#[derive(Debug)]
pub struct ForwardOutcome {
    pub response: UpstreamHttpResponse,
    pub provider: Provider,
    pub permit: SessionPermit,
    pub from_format: WireFormat,
    pub to_format: WireFormat,
}

pub async fn forward(
    state: &GatewayState,
    session: &mut ProxySession,
) -> Result<ForwardOutcome, GatewayError> {
    let providers = state.repo.list_enabled();
    let mut exclude: HashSet<i64> = HashSet::new();
    let mut last_error: Option<UpstreamAttemptError> = None;

    for attempt_no in 1..=MAX_RETRY_ATTEMPTS + 1 {
        let now = GatewayState::now_unix();
        // The thread-local RNG stays out of the future: scope it to the
        // pick so the handler future remains Send.
        let picked = {
            let selection = SelectionInput {
                model: &session.model,
                session_id: session.session_id.as_deref(),
                exclude: &exclude,
                now_unix: now,
            };
            let mut rng = rand::rng();
            pick(
                &providers,
                &state.circuit,
                &state.limits,
                &state.sticky,
                &selection,
                &mut rng,
            )
            .cloned()
        };
        let Some(provider) = picked else {
            if attempt_no == 1 {
                return Err(GatewayError::NoProviderAvailable);
            }
            break;
        };

        // Half-open circuits admit one serialized probe; a contended slot
        // just excludes the provider for this request.
        let probe_guard = match state.circuit.admit(provider.id, now) {
            Admission::Allowed => None,
            Admission::Probe(guard) => Some(guard),
            Admission::Denied { .. } => {
                session.push_decision(DecisionEntry {
                    provider_id: provider.id,
                    reason: "probe_in_flight",
                    circuit_state: state.circuit.state(provider.id, now),
                    attempt_no,
                    error: None,
                });
                exclude.insert(provider.id);
                continue;
            }
        };

        session.provider_id = Some(provider.id);
        session.push_decision(DecisionEntry {
            provider_id: provider.id,
            reason: "selected",
            circuit_state: state.circuit.state(provider.id, now),
            attempt_no,
            error: None,
        });
        if let Some(session_id) = session.session_id.clone() {
            state.sticky.bind(&session_id, provider.id, now);
        }
        let permit = state.ledger.acquire_session(provider.id);

        if let Some(target) = provider.redirect_model(&session.model) {
            let target = target.to_string();
            info!(
                event = "model_redirect",
                trace_id = %session.trace_id,
                from = %session.model,
                to = %target,
            );
            session.rewrite_model(&target);
        }

        let to_format = provider.kind.wire_format();
        let body = build_outbound_body(session, to_format);
        let upstream_request = build_upstream_request(session, &provider, to_format, body);

        info!(
            event = "upstream_attempt",
            trace_id = %session.trace_id,
            provider_id = provider.id,
            attempt_no,
            url = %upstream_request.url,
            from = %session.original_format,
            to = %to_format,
        );

        match state.client.send(upstream_request).await {
            Ok(response) if (200..300).contains(&response.status) => {
                state.circuit.record_success(provider.id);
                drop(probe_guard);
                return Ok(ForwardOutcome {
                    response,
                    provider,
                    permit,
                    from_format: session.original_format,
                    to_format,
                });
            }
            Ok(response) => {
                let excerpt = error_body_excerpt(&response.body);
                let snapshot = state.circuit.record_failure(provider.id, now);
                warn!(
                    event = "upstream_attempt_failed",
                    trace_id = %session.trace_id,
                    provider_id = provider.id,
                    provider_name = %provider.name,
                    attempt_no,
                    status = response.status,
                    circuit_state = snapshot.state.as_str(),
                    circuit_failures = snapshot.failure_count,
                    error_body = %excerpt,
                );
                session.push_decision(DecisionEntry {
                    provider_id: provider.id,
                    reason: "upstream_http_error",
                    circuit_state: snapshot.state,
                    attempt_no,
                    error: Some(format!("status {}", response.status)),
                });
                last_error = Some(UpstreamAttemptError {
                    provider_id: provider.id,
                    provider_name: provider.name.clone(),
                    status: Some(response.status),
                    body_excerpt: excerpt,
                    class: UpstreamErrorClass::Http,
                });
            }
            Err(transport) => {
                let snapshot = state.circuit.record_failure(provider.id, now);
                warn!(
                    event = "upstream_attempt_failed",
                    trace_id = %session.trace_id,
                    provider_id = provider.id,
                    provider_name = %provider.name,
                    attempt_no,
                    circuit_state = snapshot.state.as_str(),
                    circuit_failures = snapshot.failure_count,
                    error = %transport,
                );
                session.push_decision(DecisionEntry {
                    provider_id: provider.id,
                    reason: "upstream_network_error",
                    circuit_state: snapshot.state,
                    attempt_no,
                    error: Some(transport.message.clone()),
                });
                last_error = Some(UpstreamAttemptError {
                    provider_id: provider.id,
                    provider_name: provider.name.clone(),
                    status: None,
                    body_excerpt: transport.message,
                    class: UpstreamErrorClass::Network,
                });
            }
        }

        drop(permit);
        drop(probe_guard);
        exclude.insert(provider.id);
    }

    warn!(
        event = "all_providers_failed",
        trace_id = %session.trace_id,
        decisions = %session.decision_summary(),
    );
    Err(GatewayError::AllProvidersFailed { last: last_error })
}

/// Serialize the attempt's outbound body. Same-format requests pass the raw
/// body through so unknown client fields survive; codex-bound bodies from
/// non-official clients go through the typed sanitizer either way.
fn build_outbound_body(session: &ProxySession, to_format: WireFormat) -> Bytes {
    let from = session.original_format;

    if from == to_format {
        if to_format == WireFormat::Codex
            && !is_official_user_agent(session.user_agent.as_deref())
            && let ChatRequest::Codex(request) = &session.request
        {
            // Typed round-trip doubles as the forbidden-parameter strip.
            let mut request = request.clone();
            sanitize_codex_request(&mut request, session.user_agent.as_deref());
            return Bytes::from(serde_json::to_vec(&request).unwrap_or_default());
        }
        // Official clients and non-codex targets pass through untouched.
        return Bytes::from(serde_json::to_vec(&session.body).unwrap_or_default());
    }

    match translate_request(session.request.clone(), to_format) {
        Ok(mut translated) => {
            if let ChatRequest::Codex(request) = &mut translated {
                sanitize_codex_request(request, session.user_agent.as_deref());
            }
            translated.to_bytes()
        }
        Err(err) => {
            // Degraded mode: log and forward the original body untouched.
            warn!(
                event = "translation_failed",
                trace_id = %session.trace_id,
                from = %from,
                to = %to_format,
                error = %err,
            );
            Bytes::from(serde_json::to_vec(&session.body).unwrap_or_default())
        }
    }
}

fn build_upstream_request(
    session: &ProxySession,
    provider: &Provider,
    to_format: WireFormat,
    body: Bytes,
) -> UpstreamHttpRequest {
    let path = if to_format == WireFormat::Codex {
        CODEX_RESPONSES_PATH
    } else {
        session.path.as_str()
    };
    let base = provider.base_url.trim_end_matches('/');
    let mut url = format!("{base}{path}");
    if let Some(query) = &session.query
        && !query.is_empty()
    {
        url.push('?');
        url.push_str(query);
    }

    let headers = build_upstream_headers(session, provider, to_format);
    let body = if session.method == Method::GET || session.method == Method::HEAD {
        None
    } else {
        Some(body)
    };

    UpstreamHttpRequest {
        method: session.method.clone(),
        url,
        headers,
        body,
    }
}

fn build_upstream_headers(
    session: &ProxySession,
    provider: &Provider,
    to_format: WireFormat,
) -> HeaderMap {
    let mut headers = session.headers.clone();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::HOST);
    if let Some(host) = url_host(&provider.base_url)
        && let Ok(value) = HeaderValue::from_str(&host)
    {
        headers.insert(header::HOST, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", provider.api_key)) {
        headers.insert(header::AUTHORIZATION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&provider.api_key) {
        headers.insert("x-api-key", value);
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    // The proxy relays raw bytes; upstream compression would force it to
    // re-frame the stream.
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("identity"),
    );
    if to_format == WireFormat::Codex {
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(CODEX_FORCED_USER_AGENT),
        );
    }
    headers
}

fn url_host(base_url: &str) -> Option<String> {
    let rest = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))?;
    let host = rest.split('/').next()?;
    (!host.is_empty()).then(|| host.to_string())
}

fn error_body_excerpt(body: &UpstreamBody) -> String {
    match body {
        UpstreamBody::Bytes(bytes) => {
            let excerpt = String::from_utf8_lossy(bytes);
            let mut excerpt = excerpt.trim().to_string();
            if excerpt.len() > DECISION_ERROR_LIMIT {
                excerpt.truncate(DECISION_ERROR_LIMIT);
            }
            excerpt
        }
        UpstreamBody::Stream(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_host_strips_scheme_and_path() {
        assert_eq!(
            url_host("https://api.example.com/v1"),
            Some("api.example.com".to_string())
        );
        assert_eq!(
            url_host("http://127.0.0.1:8080"),
            Some("127.0.0.1:8080".to_string())
        );
        assert_eq!(url_host("ftp://x"), None);
    }
}
