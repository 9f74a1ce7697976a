//! Non-streaming response translation between upstream and client formats.
//!
//! The same pairs as the request direction: OpenAI↔Codex and Claude↔OpenAI
//! written directly, Claude↔Codex composed through the OpenAI shape.

use modelgate_protocol::claude;
use modelgate_protocol::codex;
use modelgate_protocol::openai;
use modelgate_protocol::WireFormat;
use serde_json::Value as JsonValue;

use crate::TranslateError;

/// Translate a serialized upstream response body from one format to
/// another. Identity when the formats already match.
pub fn translate_response_body(
    body: &[u8],
    from: WireFormat,
    to: WireFormat,
) -> Result<Vec<u8>, TranslateError> {
    if from == to {
        return Ok(body.to_vec());
    }
    let malformed = |format: WireFormat| {
        move |err: serde_json::Error| TranslateError::Malformed {
            format,
            message: err.to_string(),
        }
    };

    match (from, to) {
        (WireFormat::Codex, WireFormat::OpenAi) => {
            let response: codex::ResponseObject =
                serde_json::from_slice(body).map_err(malformed(from))?;
            serde_json::to_vec(&codex_to_openai(response)).map_err(malformed(to))
        }
        (WireFormat::OpenAi, WireFormat::Codex) => {
            let response: openai::ChatCompletionResponse =
                serde_json::from_slice(body).map_err(malformed(from))?;
            serde_json::to_vec(&openai_to_codex(response)).map_err(malformed(to))
        }
        (WireFormat::Claude, WireFormat::OpenAi) => {
            let response: claude::MessageResponse =
                serde_json::from_slice(body).map_err(malformed(from))?;
            serde_json::to_vec(&claude_to_openai(response)).map_err(malformed(to))
        }
        (WireFormat::OpenAi, WireFormat::Claude) => {
            let response: openai::ChatCompletionResponse =
                serde_json::from_slice(body).map_err(malformed(from))?;
            serde_json::to_vec(&openai_to_claude(response)).map_err(malformed(to))
        }
        (WireFormat::Codex, WireFormat::Claude) => {
            let response: codex::ResponseObject =
                serde_json::from_slice(body).map_err(malformed(from))?;
            let via = codex_to_openai(response);
            serde_json::to_vec(&openai_to_claude(via)).map_err(malformed(to))
        }
        (WireFormat::Claude, WireFormat::Codex) => {
            let response: claude::MessageResponse =
                serde_json::from_slice(body).map_err(malformed(from))?;
            let via = claude_to_openai(response);
            serde_json::to_vec(&openai_to_codex(via)).map_err(malformed(to))
        }
        _ => Err(TranslateError::Unsupported { from, to }),
    }
}

pub fn codex_to_openai(response: codex::ResponseObject) -> openai::ChatCompletionResponse {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for item in response.output {
        match item {
            codex::OutputItem::Message(message) => {
                for content in message.content {
                    if let codex::OutputContent::OutputText { text } = content {
                        texts.push(text);
                    }
                }
            }
            codex::OutputItem::FunctionCall(call) => {
                tool_calls.push(openai::ToolCall {
                    id: call.call_id,
                    r#type: openai::ToolCallKind::Function,
                    function: openai::FunctionCall {
                        name: call.name,
                        arguments: call.arguments,
                    },
                });
            }
            codex::OutputItem::Other(_) => {}
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        "stop"
    } else {
        "tool_calls"
    };

    openai::ChatCompletionResponse {
        id: response.id,
        object: "chat.completion".to_string(),
        created: response.created_at.unwrap_or_default(),
        model: response.model.unwrap_or_default(),
        choices: vec![openai::ChatChoice {
            index: 0,
            message: openai::AssistantReply {
                role: "assistant".to_string(),
                content: (!texts.is_empty()).then(|| texts.join("")),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: response.usage.map(|usage| openai::CompletionUsage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.input_tokens + usage.output_tokens),
        }),
    }
}

pub fn openai_to_codex(response: openai::ChatCompletionResponse) -> codex::ResponseObject {
    let mut output = Vec::new();
    let created = response.created;
    let mut finish_usage = None;

    if let Some(usage) = response.usage {
        finish_usage = Some(codex::ResponseUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: Some(usage.total_tokens),
        });
    }

    for choice in response.choices {
        if let Some(text) = choice.message.content {
            output.push(codex::OutputItem::Message(codex::OutputMessage {
                id: None,
                role: "assistant".to_string(),
                content: vec![codex::OutputContent::OutputText { text }],
                status: Some("completed".to_string()),
            }));
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            output.push(codex::OutputItem::FunctionCall(codex::FunctionCallItem {
                call_id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
                id: None,
            }));
        }
    }

    codex::ResponseObject {
        id: response.id,
        object: "response".to_string(),
        created_at: Some(created),
        model: Some(response.model),
        status: Some("completed".to_string()),
        output,
        usage: finish_usage,
    }
}

pub fn claude_to_openai(response: claude::MessageResponse) -> openai::ChatCompletionResponse {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            claude::ContentBlock::Text { text } => texts.push(text),
            claude::ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(openai::ToolCall {
                    id,
                    r#type: openai::ToolCallKind::Function,
                    function: openai::FunctionCall {
                        name,
                        arguments: input,
                    },
                });
            }
            _ => {}
        }
    }

    openai::ChatCompletionResponse {
        id: response.id,
        object: "chat.completion".to_string(),
        created: 0,
        model: response.model,
        choices: vec![openai::ChatChoice {
            index: 0,
            message: openai::AssistantReply {
                role: "assistant".to_string(),
                content: (!texts.is_empty()).then(|| texts.join("")),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: response.stop_reason.as_deref().map(stop_reason_to_finish),
        }],
        usage: Some(openai::CompletionUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    }
}

pub fn openai_to_claude(response: openai::ChatCompletionResponse) -> claude::MessageResponse {
    let mut content = Vec::new();
    let mut stop_reason = None;
    for choice in response.choices {
        if let Some(text) = choice.message.content {
            content.push(claude::ContentBlock::Text { text });
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            content.push(claude::ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input: string_arguments_to_value(call.function.arguments),
            });
        }
        if stop_reason.is_none() {
            stop_reason = choice.finish_reason.as_deref().map(finish_to_stop_reason);
        }
    }

    claude::MessageResponse {
        id: response.id,
        r#type: "message".to_string(),
        role: "assistant".to_string(),
        model: response.model,
        content,
        stop_reason: stop_reason.map(|reason| reason.to_string()),
        stop_sequence: None,
        usage: response
            .usage
            .map(|usage| claude::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default(),
    }
}

fn stop_reason_to_finish(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop",
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        other => other,
    }
    .to_string()
}

fn finish_to_stop_reason(reason: &str) -> &'static str {
    match reason {
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        _ => "end_turn",
    }
}

fn string_arguments_to_value(arguments: JsonValue) -> JsonValue {
    match arguments {
        JsonValue::String(raw) => serde_json::from_str(&raw)
            .unwrap_or_else(|_| serde_json::json!({"raw": raw})),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codex_response_maps_to_chat_completion() {
        let body = json!({
            "id": "resp_1",
            "object": "response",
            "created_at": 1700000000,
            "model": "gpt-5-codex",
            "status": "completed",
            "output": [
                {"type": "message", "role": "assistant",
                 "content": [{"type": "output_text", "text": "hello"}]},
                {"type": "function_call", "call_id": "c1", "name": "f",
                 "arguments": "{}"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4}
        });
        let out = translate_response_body(
            body.to_string().as_bytes(),
            WireFormat::Codex,
            WireFormat::OpenAi,
        )
        .unwrap();
        let parsed: openai::ChatCompletionResponse = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.id, "resp_1");
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(
            parsed.choices[0].finish_reason.as_deref(),
            Some("tool_calls")
        );
        assert_eq!(parsed.usage.as_ref().unwrap().prompt_tokens, 10);
    }

    #[test]
    fn claude_stop_reasons_map_both_ways() {
        let response = claude::MessageResponse {
            id: "msg_1".to_string(),
            r#type: "message".to_string(),
            role: "assistant".to_string(),
            model: "claude-sonnet-4".to_string(),
            content: vec![claude::ContentBlock::Text {
                text: "hi".to_string(),
            }],
            stop_reason: Some("tool_use".to_string()),
            stop_sequence: None,
            usage: claude::Usage {
                input_tokens: 3,
                output_tokens: 2,
            },
        };
        let chat = claude_to_openai(response);
        assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("tool_calls"));
        let back = openai_to_claude(chat);
        assert_eq!(back.stop_reason.as_deref(), Some("tool_use"));
    }
}
