//! The format-dispatching HTTP surface. Every endpoint funnels into the
//! same pipeline: detect → auth → sensitive-word → rate-limit → select →
//! forward → dispatch, with errors shaped in the caller's format.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use axum::routing::{any, post};
use axum::Router;
use bytes::Bytes;
use http::StatusCode;
use tracing::info;
use uuid::Uuid;

use modelgate_protocol::WireFormat;
use modelgate_provider::route_family;

use crate::dispatch::dispatch;
use crate::error::GatewayError;
use crate::forward::forward;
use crate::session::ProxySession;
use crate::state::GatewayState;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(proxy_handler))
        .route("/v1/responses", post(proxy_handler))
        .route("/v1/messages", post(proxy_handler))
        .route("/v1beta/models/{*rest}", any(proxy_handler))
        .route("/healthz", axum::routing::get(|| async { StatusCode::NO_CONTENT }))
        .fallback(fallback)
        .with_state(state)
}

async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    let path = uri.path().to_string();
    let query = uri.query().map(|query| query.to_string());

    let mut session =
        match ProxySession::from_request(trace_id.clone(), method, path, query, headers, &body) {
            Ok(session) => session,
            // The body never parsed, so the caller's format is unknown;
            // default to Claude, matching detection's fallback.
            Err(error) => return error.into_response(WireFormat::Claude),
        };

    info!(
        event = "request_received",
        trace_id = %trace_id,
        path = %session.path,
        format = %session.original_format,
        model = %session.model,
        is_stream = session.is_stream,
    );

    if let Err(error) = run_guards(&state, &mut session) {
        return error.into_response(session.original_format);
    }

    match forward(&state, &mut session).await {
        Ok(outcome) => {
            let response = dispatch(&state, &session, outcome, started);
            info!(
                event = "request_completed",
                trace_id = %trace_id,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                decisions = %session.decision_summary(),
            );
            response
        }
        Err(error) => {
            info!(
                event = "request_failed",
                trace_id = %trace_id,
                error = %error,
                elapsed_ms = started.elapsed().as_millis() as u64,
                decisions = %session.decision_summary(),
            );
            error.into_response(session.original_format)
        }
    }
}

/// The fixed pre-forward guard chain.
fn run_guards(state: &GatewayState, session: &mut ProxySession) -> Result<(), GatewayError> {
    session.principal = state
        .auth
        .authenticate(&session.headers)
        .map_err(GatewayError::Unauthorized)?;

    state
        .sensitive
        .check(&session.body)
        .map_err(GatewayError::Blocked)?;

    // Distinguish "nothing can ever serve this" (503) from "everything is
    // saturated right now" (429) before entering the failover loop.
    let family = route_family(&session.model);
    let candidates: Vec<_> = state
        .repo
        .list_enabled()
        .into_iter()
        .filter(|provider| family.contains(&provider.kind))
        .collect();
    if candidates.is_empty() {
        return Err(GatewayError::NoProviderAvailable);
    }
    let now = GatewayState::now_unix();
    let mut last_limit = None;
    let all_limited = candidates.iter().all(|provider| {
        match state.limits.check(provider, now) {
            Ok(()) => false,
            Err(limit) => {
                last_limit = Some(limit);
                true
            }
        }
    });
    if all_limited && let Some(limit) = last_limit {
        return Err(GatewayError::RateLimited(limit.to_string()));
    }

    Ok(())
}

/// Minimal response for paths the router does not serve.
async fn fallback() -> Response {
    let mut response = Response::new(Body::from("not found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}
