use modelgate_protocol::codex::{
    FunctionCallItem, FunctionCallOutputItem, InputContent, InputItem, InputMessage,
    NamedToolChoice, ResponseRequest, ResponseTool, ResponseToolKind, ToolChoice,
    ToolChoiceFunction,
};
use modelgate_protocol::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, TextOrParts, ToolChoice as OpenAiToolChoice,
};

use crate::constants::{
    default_instructions, is_official_instructions, INJECTION_MARKER, REASONING_INCLUDE,
};

/// Convert an OpenAI chat-completions request into a Codex responses request.
///
/// `stream`, `store`, `parallel_tool_calls`, and `include` are forced;
/// whatever the client sent for them is discarded. Sampling and token-limit
/// parameters do not exist on the target type, so they are dropped here by
/// construction.
pub fn transform_request(request: ChatCompletionRequest) -> ResponseRequest {
    let mut system_texts = Vec::new();
    for message in &request.messages {
        if let ChatMessage::System { content } = message {
            let text = content.joined_text();
            if !text.is_empty() {
                system_texts.push(text);
            }
        }
    }
    let extracted_instructions = system_texts.join("\n\n");
    let is_official = is_official_instructions(&extracted_instructions);

    let mut input = Vec::new();
    let mut injected = false;
    for message in request.messages {
        match message {
            ChatMessage::System { .. } => {}
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                input.push(InputItem::FunctionCallOutput(FunctionCallOutputItem {
                    call_id: tool_call_id,
                    output: content.joined_text(),
                    id: None,
                }));
            }
            ChatMessage::Assistant {
                content,
                tool_calls: Some(calls),
            } => {
                // An assistant turn carrying tool calls maps to bare
                // function_call items; any accompanying text is dropped.
                let _ = content;
                for call in calls {
                    input.push(InputItem::FunctionCall(FunctionCallItem {
                        call_id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                        id: None,
                    }));
                }
            }
            ChatMessage::Assistant {
                content: Some(content),
                tool_calls: None,
            } => {
                let parts = map_content(&content, true);
                if !parts.is_empty() {
                    input.push(InputItem::Message(InputMessage {
                        role: "assistant".to_string(),
                        content: parts,
                    }));
                }
            }
            ChatMessage::Assistant {
                content: None,
                tool_calls: None,
            } => {}
            ChatMessage::User { content } => {
                let mut parts = map_content(&content, false);
                if !injected && !extracted_instructions.is_empty() && !is_official {
                    let mut prefixed = vec![
                        InputContent::InputText {
                            text: INJECTION_MARKER.to_string(),
                        },
                        InputContent::InputText {
                            text: extracted_instructions.clone(),
                        },
                    ];
                    prefixed.append(&mut parts);
                    parts = prefixed;
                    injected = true;
                }
                if !parts.is_empty() {
                    input.push(InputItem::Message(InputMessage {
                        role: "user".to_string(),
                        content: parts,
                    }));
                }
            }
        }
    }

    let instructions = if is_official {
        extracted_instructions
    } else {
        default_instructions(&request.model).to_string()
    };

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .map(|tool| ResponseTool {
                r#type: ResponseToolKind::Function,
                name: tool.function.name,
                description: tool.function.description,
                parameters: tool
                    .function
                    .parameters
                    .unwrap_or_else(|| serde_json::json!({})),
            })
            .collect()
    });

    let tool_choice = request.tool_choice.map(|choice| match choice {
        OpenAiToolChoice::Mode(mode) => ToolChoice::Mode(mode),
        OpenAiToolChoice::Named(named) => ToolChoice::Named(NamedToolChoice {
            r#type: ResponseToolKind::Function,
            function: ToolChoiceFunction {
                name: named.function.name,
            },
        }),
    });

    ResponseRequest {
        model: request.model,
        instructions: Some(instructions),
        input,
        tools,
        tool_choice,
        stream: true,
        store: false,
        parallel_tool_calls: true,
        include: vec![REASONING_INCLUDE.to_string()],
    }
}

fn map_content(content: &TextOrParts, assistant: bool) -> Vec<InputContent> {
    let text_part = |text: String| {
        if assistant {
            InputContent::OutputText { text }
        } else {
            InputContent::InputText { text }
        }
    };

    match content {
        TextOrParts::Text(text) => vec![text_part(text.clone())],
        TextOrParts::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text_part(text.clone())),
                ContentPart::ImageUrl { image_url } => Some(InputContent::InputImage {
                    image_url: image_url.url.clone(),
                }),
                ContentPart::Other(_) => None,
            })
            .collect(),
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
    fn forces_codex_fields_and_drops_sampling_parameters() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [{"role": "user", "content": "Hi"}],
            "temperature": 0.7,
            "top_p": 0.9,
            "max_tokens": 100,
            "stream": false
        }));
        let out = transform_request(request);
        assert!(out.stream);
        assert!(!out.store);
        assert!(out.parallel_tool_calls);
        assert_eq!(out.include, vec![REASONING_INCLUDE.to_string()]);

        let raw = serde_json::to_value(&out).unwrap();
        for key in ["temperature", "top_p", "max_tokens", "max_output_tokens",
                    "max_completion_tokens"] {
            assert!(raw.get(key).is_none(), "{key} must not appear");
        }
    }

    #[test]
    fn injects_marker_before_non_official_instructions() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"}
            ],
            "temperature": 0.7
        }));
        let out = transform_request(request);

        let InputItem::Message(message) = &out.input[0] else {
            panic!("expected a message item");
        };
        assert_eq!(message.role, "user");
        assert_eq!(
            message.content,
            vec![
                InputContent::InputText {
                    text: INJECTION_MARKER.to_string()
                },
                InputContent::InputText {
                    text: "You are helpful.".to_string()
                },
                InputContent::InputText {
                    text: "Hi".to_string()
                },
            ]
        );
        // Non-official instructions are replaced with the model default.
        assert_eq!(
            out.instructions.as_deref(),
            Some(default_instructions("gpt-5-codex"))
        );
    }

    #[test]
    fn official_instructions_pass_through_without_injection() {
        let official = "You are Codex, based on GPT-5. Extra detail.";
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [
                {"role": "system", "content": official},
                {"role": "user", "content": "Hi"}
            ]
        }));
        let out = transform_request(request);
        assert_eq!(out.instructions.as_deref(), Some(official));
        let InputItem::Message(message) = &out.input[0] else {
            panic!("expected a message item");
        };
        assert_eq!(
            message.content,
            vec![InputContent::InputText {
                text: "Hi".to_string()
            }]
        );
    }

    #[test]
    fn tool_calls_and_outputs_preserve_call_id() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "c1", "type": "function",
                     "function": {"name": "f", "arguments": "{\"x\":1}"}}
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "ok"}
            ]
        }));
        let out = transform_request(request);
        match &out.input[0] {
            InputItem::FunctionCall(call) => {
                assert_eq!(call.call_id, "c1");
                assert_eq!(call.name, "f");
                assert_eq!(call.arguments, json!("{\"x\":1}"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
        match &out.input[1] {
            InputItem::FunctionCallOutput(output) => {
                assert_eq!(output.call_id, "c1");
                assert_eq!(output.output, "ok");
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn object_arguments_stay_objects() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "c2", "type": "function",
                     "function": {"name": "g", "arguments": {"x": 1}}}
                ]}
            ]
        }));
        let out = transform_request(request);
        match &out.input[0] {
            InputItem::FunctionCall(call) => assert_eq!(call.arguments, json!({"x": 1})),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn image_parts_map_and_unknown_parts_drop() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [
                {"role": "user", "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image_url", "image_url": {"url": "https://x/y.png"}},
                    {"type": "input_audio", "input_audio": {"data": "zz"}}
                ]}
            ]
        }));
        let out = transform_request(request);
        let InputItem::Message(message) = &out.input[0] else {
            panic!("expected a message item");
        };
        assert_eq!(message.content.len(), 2);
        assert_eq!(
            message.content[1],
            InputContent::InputImage {
                image_url: "https://x/y.png".to_string()
            }
        );
    }

    #[test]
    fn tools_translate_with_empty_parameter_fallback() {
        let request = parse(json!({
            "model": "gpt-5-codex",
            "messages": [{"role": "user", "content": "Hi"}],
            "tools": [{"type": "function", "function": {"name": "f"}}],
            "tool_choice": "auto"
        }));
        let out = transform_request(request);
        let tools = out.tools.unwrap();
        assert_eq!(tools[0].name, "f");
        assert_eq!(tools[0].parameters, json!({}));
        assert_eq!(out.tool_choice, Some(ToolChoice::Mode("auto".to_string())));
    }
}
