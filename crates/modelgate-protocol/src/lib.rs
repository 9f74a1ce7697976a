//! Typed wire schemas for the four chat formats the proxy speaks, plus the
//! incremental SSE parser shared by the streaming pipeline.
//!
//! This crate deliberately models only the request path the proxy forwards:
//! message creation (streaming and non-streaming). Forbidden upstream
//! parameters simply do not exist on the target types, so a translation can
//! never reintroduce them.

pub mod claude;
pub mod codex;
pub mod gemini_cli;
pub mod openai;
pub mod sse;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A wire schema family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireFormat {
    Claude,
    OpenAi,
    Codex,
    GeminiCli,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireFormat::Claude => "claude",
            WireFormat::OpenAi => "openai",
            WireFormat::Codex => "codex",
            WireFormat::GeminiCli => "gemini-cli",
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the wire format of a parsed request body.
///
/// Order matters: the Gemini CLI envelope and the Codex `input` array are
/// unambiguous, a `system` array distinguishes Claude from OpenAI, and
/// anything unrecognized defaults to Claude.
pub fn detect_format(body: &JsonValue) -> WireFormat {
    if body.get("request").is_some_and(|v| v.is_object()) {
        return WireFormat::GeminiCli;
    }
    if body.get("input").is_some_and(|v| v.is_array()) {
        return WireFormat::Codex;
    }
    if body.get("messages").is_some_and(|v| v.is_array()) {
        if body.get("system").is_some_and(|v| v.is_array()) {
            return WireFormat::Claude;
        }
        return WireFormat::OpenAi;
    }
    WireFormat::Claude
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detect_format_table() {
        assert_eq!(
            detect_format(&json!({"request": {"messages": []}})),
            WireFormat::GeminiCli
        );
        assert_eq!(detect_format(&json!({"input": []})), WireFormat::Codex);
        assert_eq!(
            detect_format(&json!({"messages": [], "system": []})),
            WireFormat::Claude
        );
        assert_eq!(detect_format(&json!({"messages": []})), WireFormat::OpenAi);
        assert_eq!(detect_format(&json!({"prompt": "hi"})), WireFormat::Claude);
    }

    #[test]
    fn detect_format_ignores_non_array_shapes() {
        // `request` must be an object and `input` an array for detection.
        assert_eq!(
            detect_format(&json!({"request": "x", "messages": []})),
            WireFormat::OpenAi
        );
        assert_eq!(
            detect_format(&json!({"input": "text"})),
            WireFormat::Claude
        );
    }
}
