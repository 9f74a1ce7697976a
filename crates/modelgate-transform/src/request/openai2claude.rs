use modelgate_protocol::claude::{
    ContentBlock, ImageSource, Message, MessageContent, MessageRole, MessagesRequest,
    SystemPrompt, Tool,
};
use modelgate_protocol::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, TextOrParts, ToolChoice,
};
use serde_json::{json, Value as JsonValue};

/// Convert an OpenAI chat-completions request into a Claude messages
/// request. System messages fold into the top-level `system` prompt;
/// assistant `tool_calls` become `tool_use` blocks and tool messages become
/// user-side `tool_result` blocks.
pub fn transform_request(request: ChatCompletionRequest) -> MessagesRequest {
    let mut system_texts = Vec::new();
    let mut messages = Vec::new();

    for message in request.messages {
        match message {
            ChatMessage::System { content } => {
                let text = content.joined_text();
                if !text.is_empty() {
                    system_texts.push(text);
                }
            }
            ChatMessage::User { content } => {
                messages.push(Message {
                    role: MessageRole::User,
                    content: map_user_content(content),
                });
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if let Some(content) = content {
                    let text = content.joined_text();
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text { text });
                    }
                }
                for call in tool_calls.unwrap_or_default() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id,
                        name: call.function.name,
                        input: arguments_to_input(call.function.arguments),
                    });
                }
                if blocks.is_empty() {
                    continue;
                }
                messages.push(Message {
                    role: MessageRole::Assistant,
                    content: MessageContent::Blocks(blocks),
                });
            }
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                messages.push(Message {
                    role: MessageRole::User,
                    content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: tool_call_id,
                        content: Some(JsonValue::String(content.joined_text())),
                        is_error: None,
                    }]),
                });
            }
        }
    }

    let system = (!system_texts.is_empty())
        .then(|| SystemPrompt::Text(system_texts.join("\n\n")));

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| Tool {
                name: tool.function.name,
                description: tool.function.description,
                input_schema: tool.function.parameters.unwrap_or_else(|| json!({})),
            })
            .collect()
    });

    let tool_choice = request.tool_choice.and_then(|choice| match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "auto" => Some(json!({"type": "auto"})),
            "required" => Some(json!({"type": "any"})),
            "none" => Some(json!({"type": "none"})),
            _ => None,
        },
        ToolChoice::Named(named) => {
            Some(json!({"type": "tool", "name": named.function.name}))
        }
    });

    MessagesRequest {
        model: request.model,
        max_tokens: request
            .max_tokens
            .or(request.max_completion_tokens)
            .or(request.max_output_tokens)
            .map(|v| v.max(1) as u32),
        system,
        messages,
        tools,
        tool_choice,
        stream: request.stream,
        temperature: request.temperature,
        top_p: request.top_p,
        metadata: None,
    }
}

fn map_user_content(content: TextOrParts) -> MessageContent {
    match content {
        TextOrParts::Text(text) => MessageContent::Text(text),
        TextOrParts::Parts(parts) => {
            let blocks: Vec<ContentBlock> = parts
                .into_iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(ContentBlock::Text { text }),
                    ContentPart::ImageUrl { image_url } => {
                        Some(ContentBlock::Image {
                            source: image_source_from_url(&image_url.url),
                        })
                    }
                    ContentPart::Other(_) => None,
                })
                .collect();
            MessageContent::Blocks(blocks)
        }
    }
}

fn image_source_from_url(url: &str) -> ImageSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(";base64,")
    {
        return ImageSource {
            r#type: "base64".to_string(),
            media_type: Some(meta.to_string()),
            data: Some(data.to_string()),
            url: None,
        };
    }
    ImageSource {
        r#type: "url".to_string(),
        media_type: None,
        data: None,
        url: Some(url.to_string()),
    }
}

/// Claude `tool_use.input` must be a JSON object; string-encoded arguments
/// are parsed, and anything unparsable is carried under a raw key.
fn arguments_to_input(arguments: JsonValue) -> JsonValue {
    match arguments {
        JsonValue::String(raw) => {
            serde_json::from_str(&raw).unwrap_or_else(|_| json!({"raw": raw}))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn system_messages_fold_into_system_prompt() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "system", "content": "two"},
                {"role": "user", "content": "hi"}
            ],
            "max_tokens": 256
        })));
        match out.system {
            Some(SystemPrompt::Text(text)) => assert_eq!(text, "one\n\ntwo"),
            other => panic!("unexpected system: {other:?}"),
        }
        assert_eq!(out.max_tokens, Some(256));
        assert_eq!(out.messages.len(), 1);
    }

    #[test]
    fn string_arguments_parse_into_tool_use_input() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "f", "arguments": "{\"x\":1}"}}
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "ok"}
            ]
        })));
        match &out.messages[0].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolUse { id, input, .. } => {
                    assert_eq!(id, "c1");
                    assert_eq!(input, &json!({"x": 1}));
                }
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected content: {other:?}"),
        }
        match &out.messages[1].content {
            MessageContent::Blocks(blocks) => assert!(matches!(
                &blocks[0],
                ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "c1"
            )),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn data_uri_image_becomes_base64_source() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": [
                    {"type": "image_url",
                     "image_url": {"url": "data:image/png;base64,aGk="}}
                ]}
            ]
        })));
        match &out.messages[0].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::Image { source } => {
                    assert_eq!(source.r#type, "base64");
                    assert_eq!(source.media_type.as_deref(), Some("image/png"));
                    assert_eq!(source.data.as_deref(), Some("aGk="));
                }
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
