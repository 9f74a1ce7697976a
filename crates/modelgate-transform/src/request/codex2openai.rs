use modelgate_protocol::codex::{
    InputContent, InputItem, ResponseRequest, ToolChoice as CodexToolChoice,
};
use modelgate_protocol::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, FunctionCall, FunctionDefinition, ImageUrl,
    NamedToolChoice, TextOrParts, ToolCall, ToolCallKind, ToolChoice, ToolChoiceFunction,
    ToolDefinition,
};

/// Convert a Codex responses request back into an OpenAI chat-completions
/// request. `instructions` becomes a leading system message; function call
/// items fold back into assistant `tool_calls`, with consecutive calls
/// merged into one assistant turn so a prior chat-to-codex conversion
/// round-trips.
pub fn transform_request(request: ResponseRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(instructions) = &request.instructions
        && !instructions.is_empty()
    {
        messages.push(ChatMessage::System {
            content: TextOrParts::Text(instructions.clone()),
        });
    }

    let mut pending_calls: Vec<ToolCall> = Vec::new();
    for item in request.input {
        match item {
            InputItem::FunctionCall(call) => {
                pending_calls.push(ToolCall {
                    id: call.call_id,
                    r#type: ToolCallKind::Function,
                    function: FunctionCall {
                        name: call.name,
                        arguments: call.arguments,
                    },
                });
                continue;
            }
            other => flush_calls(&mut pending_calls, &mut messages, other_to_message(other)),
        }
    }
    flush_calls(&mut pending_calls, &mut messages, None);

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| ToolDefinition {
                r#type: ToolCallKind::Function,
                function: FunctionDefinition {
                    name: tool.name,
                    description: tool.description,
                    parameters: Some(tool.parameters),
                },
            })
            .collect()
    });

    let tool_choice = request.tool_choice.map(|choice| match choice {
        CodexToolChoice::Mode(mode) => ToolChoice::Mode(mode),
        CodexToolChoice::Named(named) => ToolChoice::Named(NamedToolChoice {
            r#type: ToolCallKind::Function,
            function: ToolChoiceFunction {
                name: named.function.name,
            },
        }),
    });

    ChatCompletionRequest {
        model: request.model,
        messages,
        tools,
        tool_choice,
        stream: Some(request.stream),
        temperature: None,
        top_p: None,
        max_tokens: None,
        max_completion_tokens: None,
        max_output_tokens: None,
        user: None,
    }
}

fn flush_calls(
    pending: &mut Vec<ToolCall>,
    messages: &mut Vec<ChatMessage>,
    next: Option<ChatMessage>,
) {
    if !pending.is_empty() {
        messages.push(ChatMessage::Assistant {
            content: None,
            tool_calls: Some(std::mem::take(pending)),
        });
    }
    if let Some(message) = next {
        messages.push(message);
    }
}

fn other_to_message(item: InputItem) -> Option<ChatMessage> {
    match item {
        InputItem::Message(message) => {
            let parts = map_parts(message.content);
            let content = collapse_parts(parts)?;
            Some(match message.role.as_str() {
                "assistant" => ChatMessage::Assistant {
                    content: Some(content),
                    tool_calls: None,
                },
                "system" => ChatMessage::System { content },
                _ => ChatMessage::User { content },
            })
        }
        InputItem::FunctionCallOutput(output) => Some(ChatMessage::Tool {
            content: TextOrParts::Text(output.output),
            tool_call_id: output.call_id,
        }),
        // Reasoning and other opaque items have no chat-completions shape.
        InputItem::FunctionCall(_) | InputItem::Other(_) => None,
    }
}

fn map_parts(content: Vec<InputContent>) -> Vec<ContentPart> {
    content
        .into_iter()
        .filter_map(|part| match part {
            InputContent::InputText { text } | InputContent::OutputText { text } => {
                Some(ContentPart::Text { text })
            }
            InputContent::InputImage { image_url } => Some(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_url,
                    detail: None,
                },
            }),
            InputContent::Other(_) => None,
        })
        .collect()
}

/// A parts list that is pure text collapses to a plain string, which is the
/// shape the original chat request most likely had.
fn collapse_parts(parts: Vec<ContentPart>) -> Option<TextOrParts> {
    if parts.is_empty() {
        return None;
    }
    let all_text = parts
        .iter()
        .all(|part| matches!(part, ContentPart::Text { .. }));
    if all_text {
        let texts: Vec<String> = parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text { text } => text,
                _ => unreachable!(),
            })
            .collect();
        Some(TextOrParts::Text(texts.join("\n")))
    } else {
        Some(TextOrParts::Parts(parts))
    }
}
