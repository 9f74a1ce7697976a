//! Cross-format request/response translation.
//!
//! Requests are parsed into the typed schema of their detected format and
//! translated pairwise in the same pattern-matching style throughout:
//! OpenAI↔Codex and Claude↔OpenAI are written directly, Claude↔Codex is
//! composed through the OpenAI shape, and the Gemini CLI envelope is a
//! structural wrap/unwrap around an inner request. Identity translations
//! return the input untouched.

pub mod constants;
pub mod request;
pub mod response;
pub mod sanitize;
pub mod stream;

use bytes::Bytes;
use serde_json::Value as JsonValue;

use modelgate_protocol::{claude, codex, detect_format, gemini_cli, openai, WireFormat};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslateError {
    #[error("unsupported translation pair: {from} -> {to}")]
    Unsupported { from: WireFormat, to: WireFormat },
    #[error("malformed {format} body: {message}")]
    Malformed {
        format: WireFormat,
        message: String,
    },
}

/// A chat request in one of the four wire formats.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatRequest {
    Claude(claude::MessagesRequest),
    OpenAi(openai::ChatCompletionRequest),
    Codex(codex::ResponseRequest),
    GeminiCli(gemini_cli::RequestEnvelope),
}

impl ChatRequest {
    pub fn parse(format: WireFormat, body: &JsonValue) -> Result<Self, TranslateError> {
        let malformed = |err: serde_json::Error| TranslateError::Malformed {
            format,
            message: err.to_string(),
        };
        match format {
            WireFormat::Claude => serde_json::from_value(body.clone())
                .map(ChatRequest::Claude)
                .map_err(malformed),
            WireFormat::OpenAi => serde_json::from_value(body.clone())
                .map(ChatRequest::OpenAi)
                .map_err(malformed),
            WireFormat::Codex => serde_json::from_value(body.clone())
                .map(ChatRequest::Codex)
                .map_err(malformed),
            WireFormat::GeminiCli => serde_json::from_value(body.clone())
                .map(ChatRequest::GeminiCli)
                .map_err(malformed),
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            ChatRequest::Claude(_) => WireFormat::Claude,
            ChatRequest::OpenAi(_) => WireFormat::OpenAi,
            ChatRequest::Codex(_) => WireFormat::Codex,
            ChatRequest::GeminiCli(_) => WireFormat::GeminiCli,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            ChatRequest::Claude(request) => Some(request.model.as_str()),
            ChatRequest::OpenAi(request) => Some(request.model.as_str()),
            ChatRequest::Codex(request) => Some(request.model.as_str()),
            ChatRequest::GeminiCli(envelope) => envelope
                .model
                .as_deref()
                .or_else(|| envelope.request.get("model").and_then(|v| v.as_str())),
        }
    }

    pub fn set_model(&mut self, model: &str) {
        match self {
            ChatRequest::Claude(request) => request.model = model.to_string(),
            ChatRequest::OpenAi(request) => request.model = model.to_string(),
            ChatRequest::Codex(request) => request.model = model.to_string(),
            ChatRequest::GeminiCli(envelope) => {
                envelope.model = Some(model.to_string());
                if let Some(inner_model) = envelope.request.get_mut("model") {
                    *inner_model = JsonValue::String(model.to_string());
                }
            }
        }
    }

    pub fn stream_requested(&self) -> bool {
        match self {
            ChatRequest::Claude(request) => request.stream.unwrap_or(false),
            ChatRequest::OpenAi(request) => request.stream.unwrap_or(false),
            ChatRequest::Codex(request) => request.stream,
            // The CLI envelope endpoints are stream/non-stream by path, not
            // body; the handler decides from the URL.
            ChatRequest::GeminiCli(_) => false,
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let serialized = match self {
            ChatRequest::Claude(request) => serde_json::to_vec(request),
            ChatRequest::OpenAi(request) => serde_json::to_vec(request),
            ChatRequest::Codex(request) => serde_json::to_vec(request),
            ChatRequest::GeminiCli(envelope) => serde_json::to_vec(envelope),
        };
        Bytes::from(serialized.unwrap_or_default())
    }
}

/// Translate a request into the target format. Identity when the formats
/// already match.
pub fn translate_request(
    request: ChatRequest,
    to: WireFormat,
) -> Result<ChatRequest, TranslateError> {
    let from = request.format();
    if from == to {
        return Ok(request);
    }

    match (request, to) {
        (ChatRequest::OpenAi(req), WireFormat::Codex) => {
            Ok(ChatRequest::Codex(request::openai2codex::transform_request(req)))
        }
        (ChatRequest::Codex(req), WireFormat::OpenAi) => {
            Ok(ChatRequest::OpenAi(request::codex2openai::transform_request(req)))
        }
        (ChatRequest::Claude(req), WireFormat::OpenAi) => {
            Ok(ChatRequest::OpenAi(request::claude2openai::transform_request(req)))
        }
        (ChatRequest::OpenAi(req), WireFormat::Claude) => {
            Ok(ChatRequest::Claude(request::openai2claude::transform_request(req)))
        }
        (ChatRequest::Claude(req), WireFormat::Codex) => {
            let via = request::claude2openai::transform_request(req);
            Ok(ChatRequest::Codex(request::openai2codex::transform_request(via)))
        }
        (ChatRequest::Codex(req), WireFormat::Claude) => {
            let via = request::codex2openai::transform_request(req);
            Ok(ChatRequest::Claude(request::openai2claude::transform_request(via)))
        }
        (ChatRequest::GeminiCli(envelope), to) => {
            let inner = envelope.request;
            let inner_format = detect_format(&inner);
            if inner_format == WireFormat::GeminiCli {
                return Err(TranslateError::Unsupported {
                    from: WireFormat::GeminiCli,
                    to,
                });
            }
            let mut inner = ChatRequest::parse(inner_format, &inner)?;
            if let Some(model) = &envelope.model {
                let model = model.clone();
                inner.set_model(&model);
            }
            translate_request(inner, to)
        }
        (request, WireFormat::GeminiCli) => {
            let model = request.model().map(|m| m.to_string());
            let inner = match &request {
                ChatRequest::Claude(req) => serde_json::to_value(req),
                ChatRequest::OpenAi(req) => serde_json::to_value(req),
                ChatRequest::Codex(req) => serde_json::to_value(req),
                ChatRequest::GeminiCli(envelope) => serde_json::to_value(envelope),
            }
            .map_err(|err| TranslateError::Malformed {
                format: from,
                message: err.to_string(),
            })?;
            Ok(ChatRequest::GeminiCli(gemini_cli::RequestEnvelope::wrap(
                model, inner,
            )))
        }
        (request, to) => Err(TranslateError::Unsupported {
            from: request.format(),
            to,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_translation_returns_input() {
        let body = json!({"model": "gpt-4o", "messages": [
            {"role": "user", "content": "hi"}
        ]});
        let request = ChatRequest::parse(WireFormat::OpenAi, &body).unwrap();
        let out = translate_request(request.clone(), WireFormat::OpenAi).unwrap();
        assert_eq!(out, request);
    }

    #[test]
    fn gemini_envelope_unwraps_to_inner_format() {
        let body = json!({
            "model": "gpt-4o",
            "request": {"model": "gpt-4o", "messages": [
                {"role": "user", "content": "hi"}
            ]}
        });
        let request = ChatRequest::parse(WireFormat::GeminiCli, &body).unwrap();
        let out = translate_request(request, WireFormat::OpenAi).unwrap();
        assert_eq!(out.format(), WireFormat::OpenAi);
        assert_eq!(out.model(), Some("gpt-4o"));
    }

    #[test]
    fn model_rewrite_reaches_envelope_inner_body() {
        let body = json!({
            "request": {"model": "a", "messages": []}
        });
        let mut request = ChatRequest::parse(WireFormat::GeminiCli, &body).unwrap();
        request.set_model("b");
        match request {
            ChatRequest::GeminiCli(envelope) => {
                assert_eq!(envelope.model.as_deref(), Some("b"));
                assert_eq!(envelope.request["model"], json!("b"));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }
}
