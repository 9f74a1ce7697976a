//! The response dispatcher: stream upstream bytes back to the client,
//! translating formats on the fly when they differ, and publish token
//! usage once the terminal event arrives.
//!
//! Nothing here buffers a streaming body. Same-format streams relay
//! verbatim (a scanner tees usage out of the bytes); cross-format streams
//! go through the incremental translator event by event. The concurrent
//! session permit travels into the relay task so every exit path —
//! completion, upstream error, client disconnect — releases it.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use modelgate_provider::{ProviderId, UsageLedger, UsageSample};
use modelgate_transform::response::translate_response_body;
use modelgate_transform::stream::{StreamTranslator, TokenUsage, UsageScanner};

use crate::collaborators::{RequestOutcome, StatisticsRecord};
use crate::forward::ForwardOutcome;
use crate::session::ProxySession;
use crate::state::GatewayState;
use crate::upstream::UpstreamBody;

struct UsagePublisher {
    ledger: Arc<UsageLedger>,
    stats: Arc<dyn crate::collaborators::StatisticsSink>,
    provider_id: ProviderId,
    user_id: Option<String>,
    model: String,
    cost_per_mtok: Option<f64>,
    started: Instant,
}

impl UsagePublisher {
    fn publish(&self, usage: Option<TokenUsage>, outcome: RequestOutcome) {
        let usage = usage.unwrap_or_default();
        let tokens = usage.input_tokens + usage.output_tokens;
        let usd = self
            .cost_per_mtok
            .map(|rate| tokens as f64 / 1_000_000.0 * rate)
            .unwrap_or(0.0);
        self.ledger.record(
            self.provider_id,
            UsageSample {
                at_unix: GatewayState::now_unix(),
                tokens,
                usd,
            },
        );
        self.stats.record(StatisticsRecord {
            user_id: self.user_id.clone(),
            provider_id: self.provider_id,
            model: self.model.clone(),
            tokens_in: usage.input_tokens,
            tokens_out: usage.output_tokens,
            latency_ms: self.started.elapsed().as_millis(),
            outcome,
        });
    }
}

/// Turn a successful upstream response into the client-facing response.
pub fn dispatch(
    state: &GatewayState,
    session: &ProxySession,
    outcome: ForwardOutcome,
    started: Instant,
) -> Response {
    let ForwardOutcome {
        response,
        provider,
        permit,
        from_format,
        to_format,
    } = outcome;

    let publisher = UsagePublisher {
        ledger: state.ledger.clone(),
        stats: state.stats.clone(),
        provider_id: provider.id,
        user_id: session.principal.user_id.clone(),
        model: session.model.clone(),
        cost_per_mtok: provider
            .cost_per_mtok
            .or_else(|| state.price_book.lookup(&session.model)),
        started,
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let upstream_content_type = response
        .headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let is_event_stream = upstream_content_type
        .to_str()
        .is_ok_and(|value| value.starts_with("text/event-stream"));

    info!(
        event = "dispatch",
        trace_id = %session.trace_id,
        provider_id = provider.id,
        status = response.status,
        is_stream = is_event_stream,
        from = %from_format,
        to = %to_format,
    );

    match response.body {
        UpstreamBody::Bytes(bytes) => {
            // Track which format the outgoing body actually ends up in:
            // the usage field names differ between schemas, and a failed
            // translation leaves the body in the upstream's format.
            let (body, body_format) = if from_format == to_format {
                (bytes, to_format)
            } else {
                match translate_response_body(&bytes, to_format, from_format) {
                    Ok(translated) => (Bytes::from(translated), from_format),
                    Err(err) => {
                        warn!(
                            event = "response_translation_failed",
                            trace_id = %session.trace_id,
                            error = %err,
                        );
                        (bytes, to_format)
                    }
                }
            };
            publisher.publish(usage_from_json(&body, body_format), RequestOutcome::Success);
            drop(permit);
            response_with(status, upstream_content_type, Body::from(body))
        }
        UpstreamBody::Stream(mut upstream) => {
            let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(16);
            let trace_id = session.trace_id.clone();

            if from_format == to_format {
                let mut scanner = UsageScanner::for_format(to_format);
                tokio::spawn(async move {
                    let _permit = permit;
                    let mut cancelled = false;
                    while let Some(chunk) = upstream.recv().await {
                        if let Some(scanner) = scanner.as_mut() {
                            scanner.observe(&chunk);
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            cancelled = true;
                            break;
                        }
                    }
                    let outcome = if cancelled {
                        RequestOutcome::Cancelled
                    } else {
                        RequestOutcome::Success
                    };
                    publisher.publish(scanner.and_then(|s| s.usage()), outcome);
                    info!(event = "stream_end", trace_id = %trace_id, cancelled);
                });
            } else {
                match StreamTranslator::new(to_format, from_format) {
                    Ok(mut translator) => {
                        tokio::spawn(async move {
                            let _permit = permit;
                            let mut cancelled = false;
                            while let Some(chunk) = upstream.recv().await {
                                let translated = translator.push(&chunk);
                                if !translated.is_empty()
                                    && tx.send(Ok(translated)).await.is_err()
                                {
                                    cancelled = true;
                                    break;
                                }
                            }
                            if !cancelled {
                                let tail = translator.finish();
                                if !tail.is_empty() {
                                    let _ = tx.send(Ok(tail)).await;
                                }
                            }
                            let outcome = if cancelled {
                                RequestOutcome::Cancelled
                            } else {
                                RequestOutcome::Success
                            };
                            publisher.publish(translator.usage(), outcome);
                            info!(event = "stream_end", trace_id = %trace_id, cancelled);
                        });
                    }
                    Err(err) => {
                        // Unsupported streaming pair degrades to verbatim
                        // relay of the upstream bytes.
                        warn!(
                            event = "stream_translation_unsupported",
                            trace_id = %session.trace_id,
                            error = %err,
                        );
                        tokio::spawn(async move {
                            let _permit = permit;
                            while let Some(chunk) = upstream.recv().await {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    break;
                                }
                            }
                            publisher.publish(None, RequestOutcome::Success);
                        });
                    }
                }
            }

            // Same-format relays keep the upstream framing and content
            // type; translated streams are always SSE.
            let content_type = if from_format == to_format {
                upstream_content_type
            } else {
                HeaderValue::from_static("text/event-stream")
            };
            let mut response = response_with(
                status,
                content_type,
                Body::from_stream(ReceiverStream::new(rx)),
            );
            response.headers_mut().insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache"),
            );
            response
        }
    }
}

fn response_with(status: StatusCode, content_type: HeaderValue, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
}

/// Pull token counts out of a non-streamed upstream body.
fn usage_from_json(body: &[u8], format: modelgate_protocol::WireFormat) -> Option<TokenUsage> {
    use modelgate_protocol::WireFormat;

    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let usage = value.get("usage")?;
    match format {
        WireFormat::Claude => Some(TokenUsage {
            input_tokens: usage.get("input_tokens")?.as_u64()?,
            output_tokens: usage.get("output_tokens").and_then(|v| v.as_u64())?,
        }),
        WireFormat::OpenAi => Some(TokenUsage {
            input_tokens: usage.get("prompt_tokens")?.as_u64()?,
            output_tokens: usage.get("completion_tokens").and_then(|v| v.as_u64())?,
        }),
        WireFormat::Codex => Some(TokenUsage {
            input_tokens: usage.get("input_tokens")?.as_u64()?,
            output_tokens: usage.get("output_tokens").and_then(|v| v.as_u64())?,
        }),
        WireFormat::GeminiCli => None,
    }
}
