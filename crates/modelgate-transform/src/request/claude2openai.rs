use modelgate_protocol::claude::{
    ContentBlock, MessageContent, MessageRole, MessagesRequest,
};
use modelgate_protocol::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, FunctionCall, FunctionDefinition, ImageUrl,
    NamedToolChoice, TextOrParts, ToolCall, ToolCallKind, ToolChoice, ToolChoiceFunction,
    ToolDefinition,
};
use serde_json::Value as JsonValue;

/// Convert a Claude messages request into an OpenAI chat-completions
/// request. The top-level `system` prompt becomes a leading system message;
/// content blocks map 1:1 onto content parts, except `tool_result` blocks,
/// which surface as top-level tool messages because that is where the chat
/// schema keeps them.
pub fn transform_request(request: MessagesRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        let text = system.joined_text();
        if !text.is_empty() {
            messages.push(ChatMessage::System {
                content: TextOrParts::Text(text),
            });
        }
    }

    for message in request.messages {
        match (message.role, message.content) {
            (MessageRole::User, MessageContent::Text(text)) => {
                messages.push(ChatMessage::User {
                    content: TextOrParts::Text(text),
                });
            }
            (MessageRole::User, MessageContent::Blocks(blocks)) => {
                map_user_blocks(blocks, &mut messages);
            }
            (MessageRole::Assistant, MessageContent::Text(text)) => {
                messages.push(ChatMessage::Assistant {
                    content: Some(TextOrParts::Text(text)),
                    tool_calls: None,
                });
            }
            (MessageRole::Assistant, MessageContent::Blocks(blocks)) => {
                map_assistant_blocks(blocks, &mut messages);
            }
        }
    }

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| ToolDefinition {
                r#type: ToolCallKind::Function,
                function: FunctionDefinition {
                    name: tool.name,
                    description: tool.description,
                    parameters: Some(tool.input_schema),
                },
            })
            .collect()
    });

    let tool_choice = request.tool_choice.as_ref().and_then(map_tool_choice);

    ChatCompletionRequest {
        model: request.model,
        messages,
        tools,
        tool_choice,
        stream: request.stream,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens.map(|v| v as i64),
        max_completion_tokens: None,
        max_output_tokens: None,
        user: request.metadata.and_then(|meta| meta.user_id),
    }
}

fn map_user_blocks(blocks: Vec<ContentBlock>, messages: &mut Vec<ChatMessage>) {
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            ContentBlock::Image { source } => {
                let url = source.url.clone().or_else(|| {
                    // Base64 sources carry over as data URIs.
                    let media_type = source.media_type.as_deref().unwrap_or("image/png");
                    source
                        .data
                        .as_ref()
                        .map(|data| format!("data:{media_type};base64,{data}"))
                });
                if let Some(url) = url {
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl { url, detail: None },
                    });
                }
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                messages.push(ChatMessage::Tool {
                    content: TextOrParts::Text(tool_result_text(content)),
                    tool_call_id: tool_use_id,
                });
            }
            ContentBlock::ToolUse { .. } | ContentBlock::Other(_) => {}
        }
    }
    if !parts.is_empty() {
        messages.push(ChatMessage::User {
            content: TextOrParts::Parts(parts),
        });
    }
}

fn map_assistant_blocks(blocks: Vec<ContentBlock>, messages: &mut Vec<ChatMessage>) {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                id,
                r#type: ToolCallKind::Function,
                function: FunctionCall {
                    name,
                    arguments: input,
                },
            }),
            _ => {}
        }
    }
    if texts.is_empty() && calls.is_empty() {
        return;
    }
    messages.push(ChatMessage::Assistant {
        content: (!texts.is_empty()).then(|| TextOrParts::Text(texts.join("\n"))),
        tool_calls: (!calls.is_empty()).then_some(calls),
    });
}

fn tool_result_text(content: Option<JsonValue>) -> String {
    match content {
        None => String::new(),
        Some(JsonValue::String(text)) => text,
        Some(JsonValue::Array(blocks)) => {
            let texts: Vec<String> = blocks
                .into_iter()
                .filter_map(|block| {
                    block
                        .get("text")
                        .and_then(|text| text.as_str())
                        .map(|text| text.to_string())
                })
                .collect();
            texts.join("\n")
        }
        Some(other) => other.to_string(),
    }
}

fn map_tool_choice(choice: &JsonValue) -> Option<ToolChoice> {
    match choice.get("type").and_then(|kind| kind.as_str())? {
        "auto" => Some(ToolChoice::Mode("auto".to_string())),
        "any" => Some(ToolChoice::Mode("required".to_string())),
        "none" => Some(ToolChoice::Mode("none".to_string())),
        "tool" => {
            let name = choice.get("name").and_then(|name| name.as_str())?;
            Some(ToolChoice::Named(NamedToolChoice {
                r#type: ToolCallKind::Function,
                function: ToolChoiceFunction {
                    name: name.to_string(),
                },
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: serde_json::Value) -> MessagesRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn system_array_becomes_leading_system_message() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "system": [
                {"type": "text", "text": "one"},
                {"type": "text", "text": "two"}
            ],
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 512
        })));
        assert!(matches!(
            &out.messages[0],
            ChatMessage::System { content: TextOrParts::Text(text) } if text == "one\n\ntwo"
        ));
        assert_eq!(out.max_tokens, Some(512));
    }

    #[test]
    fn tool_use_and_tool_result_blocks_map_to_chat_shapes() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "assistant", "content": [
                    {"type": "text", "text": "checking"},
                    {"type": "tool_use", "id": "t1", "name": "f", "input": {"x": 1}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "t1", "content": "ok"}
                ]}
            ]
        })));
        match &out.messages[0] {
            ChatMessage::Assistant {
                content: Some(TextOrParts::Text(text)),
                tool_calls: Some(calls),
            } => {
                assert_eq!(text, "checking");
                assert_eq!(calls[0].id, "t1");
                assert_eq!(calls[0].function.arguments, json!({"x": 1}));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            &out.messages[1],
            ChatMessage::Tool { tool_call_id, .. } if tool_call_id == "t1"
        ));
    }

    #[test]
    fn claude_tool_choice_maps_to_openai_modes() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [],
            "tool_choice": {"type": "any"}
        })));
        assert_eq!(out.tool_choice, Some(ToolChoice::Mode("required".to_string())));

        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [],
            "tool_choice": {"type": "tool", "name": "f"}
        })));
        match out.tool_choice {
            Some(ToolChoice::Named(named)) => assert_eq!(named.function.name, "f"),
            other => panic!("unexpected choice: {other:?}"),
        }
    }

    #[test]
    fn base64_image_becomes_data_uri() {
        let out = transform_request(parse(json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": [
                    {"type": "image", "source": {
                        "type": "base64", "media_type": "image/jpeg", "data": "aGk="
                    }}
                ]}
            ]
        })));
        match &out.messages[0] {
            ChatMessage::User {
                content: TextOrParts::Parts(parts),
            } => match &parts[0] {
                ContentPart::ImageUrl { image_url } => {
                    assert_eq!(image_url.url, "data:image/jpeg;base64,aGk=");
                }
                other => panic!("unexpected part: {other:?}"),
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
