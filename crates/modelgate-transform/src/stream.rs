//! Streaming response translation.
//!
//! Upstream SSE bytes are pull-parsed into logical units (text deltas,
//! tool-call fragments, completion), then re-encoded as the client format's
//! events and flushed immediately. Nothing buffers the full body; the only
//! state is per-stream bookkeeping (open blocks, tool-call ordinals).

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use serde_json::json;

use modelgate_protocol::claude;
use modelgate_protocol::codex;
use modelgate_protocol::openai;
use modelgate_protocol::sse::{SseEvent, SseParser};
use modelgate_protocol::WireFormat;

use crate::TranslateError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A format-independent streaming event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUnit {
    Start {
        id: String,
        model: String,
    },
    TextDelta(String),
    ToolCallBegin {
        index: u32,
        id: String,
        name: String,
    },
    ToolCallDelta {
        index: u32,
        arguments: String,
    },
    Finish {
        reason: Option<&'static str>,
        usage: Option<TokenUsage>,
    },
}

/// Translates one upstream SSE stream into the client's format.
pub struct StreamTranslator {
    parser: SseParser,
    decoder: StreamDecoder,
    encoder: StreamEncoder,
    usage: Option<TokenUsage>,
}

impl StreamTranslator {
    pub fn new(from: WireFormat, to: WireFormat) -> Result<Self, TranslateError> {
        let decoder =
            StreamDecoder::for_format(from).ok_or(TranslateError::Unsupported { from, to })?;
        let encoder =
            StreamEncoder::for_format(to).ok_or(TranslateError::Unsupported { from, to })?;
        Ok(Self {
            parser: SseParser::new(),
            decoder,
            encoder,
            usage: None,
        })
    }

    /// Feed one upstream chunk; returns re-framed client bytes, possibly
    /// empty when no event completed yet.
    pub fn push(&mut self, chunk: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        for event in self.parser.push_bytes(chunk) {
            for unit in self.decoder.push(&event) {
                self.observe(&unit);
                for frame in self.encoder.encode(unit) {
                    out.extend_from_slice(&frame.to_frame());
                }
            }
        }
        out.freeze()
    }

    /// Flush trailing parser state and closing frames at end-of-stream.
    pub fn finish(&mut self) -> Bytes {
        let mut out = BytesMut::new();
        for event in self.parser.finish() {
            for unit in self.decoder.push(&event) {
                self.observe(&unit);
                for frame in self.encoder.encode(unit) {
                    out.extend_from_slice(&frame.to_frame());
                }
            }
        }
        for unit in self.decoder.finish() {
            self.observe(&unit);
            for frame in self.encoder.encode(unit) {
                out.extend_from_slice(&frame.to_frame());
            }
        }
        for frame in self.encoder.finish() {
            out.extend_from_slice(&frame.to_frame());
        }
        out.freeze()
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    fn observe(&mut self, unit: &StreamUnit) {
        if let StreamUnit::Finish {
            usage: Some(usage), ..
        } = unit
        {
            self.usage = Some(*usage);
        }
    }
}

/// Passthrough tee: decodes a same-format stream only to harvest terminal
/// token counts, without touching the forwarded bytes.
pub struct UsageScanner {
    parser: SseParser,
    decoder: StreamDecoder,
    usage: Option<TokenUsage>,
}

impl UsageScanner {
    pub fn for_format(format: WireFormat) -> Option<Self> {
        StreamDecoder::for_format(format).map(|decoder| Self {
            parser: SseParser::new(),
            decoder,
            usage: None,
        })
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        for event in self.parser.push_bytes(chunk) {
            for unit in self.decoder.push(&event) {
                if let StreamUnit::Finish {
                    usage: Some(usage), ..
                } = unit
                {
                    self.usage = Some(usage);
                }
            }
        }
    }

    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }
}

// ---------------------------------------------------------------- decoders

enum StreamDecoder {
    Claude(ClaudeDecoder),
    OpenAi(OpenAiDecoder),
    Codex(CodexDecoder),
}

impl StreamDecoder {
    fn for_format(format: WireFormat) -> Option<Self> {
        match format {
            WireFormat::Claude => Some(StreamDecoder::Claude(ClaudeDecoder::default())),
            WireFormat::OpenAi => Some(StreamDecoder::OpenAi(OpenAiDecoder::default())),
            WireFormat::Codex => Some(StreamDecoder::Codex(CodexDecoder::default())),
            WireFormat::GeminiCli => None,
        }
    }

    fn push(&mut self, event: &SseEvent) -> Vec<StreamUnit> {
        match self {
            StreamDecoder::Claude(decoder) => decoder.push(event),
            StreamDecoder::OpenAi(decoder) => decoder.push(event),
            StreamDecoder::Codex(decoder) => decoder.push(event),
        }
    }

    fn finish(&mut self) -> Vec<StreamUnit> {
        match self {
            StreamDecoder::Claude(decoder) => decoder.finish(),
            StreamDecoder::OpenAi(decoder) => decoder.finish(),
            StreamDecoder::Codex(decoder) => decoder.finish(),
        }
    }
}

#[derive(Default)]
struct ClaudeDecoder {
    input_tokens: Option<u64>,
    tool_blocks: HashMap<u32, u32>,
    tool_count: u32,
    finished: bool,
}

impl ClaudeDecoder {
    fn push(&mut self, event: &SseEvent) -> Vec<StreamUnit> {
        let Ok(parsed) = serde_json::from_str::<claude::StreamEvent>(&event.data) else {
            return Vec::new();
        };
        match parsed {
            claude::StreamEvent::MessageStart { message } => {
                self.input_tokens = Some(message.usage.input_tokens);
                vec![StreamUnit::Start {
                    id: message.id,
                    model: message.model,
                }]
            }
            claude::StreamEvent::ContentBlockStart {
                index,
                content_block: claude::ContentBlock::ToolUse { id, name, .. },
            } => {
                let ordinal = self.tool_count;
                self.tool_blocks.insert(index, ordinal);
                self.tool_count += 1;
                vec![StreamUnit::ToolCallBegin {
                    index: ordinal,
                    id,
                    name,
                }]
            }
            claude::StreamEvent::ContentBlockDelta { index, delta } => match delta {
                claude::ContentDelta::TextDelta { text } => vec![StreamUnit::TextDelta(text)],
                claude::ContentDelta::InputJsonDelta { partial_json } => self
                    .tool_blocks
                    .get(&index)
                    .map(|ordinal| {
                        vec![StreamUnit::ToolCallDelta {
                            index: *ordinal,
                            arguments: partial_json,
                        }]
                    })
                    .unwrap_or_default(),
                claude::ContentDelta::Other(_) => Vec::new(),
            },
            claude::StreamEvent::MessageDelta { delta, usage } => {
                self.finished = true;
                let usage = usage.map(|usage| TokenUsage {
                    input_tokens: usage.input_tokens.or(self.input_tokens).unwrap_or(0),
                    output_tokens: usage.output_tokens.unwrap_or(0),
                });
                vec![StreamUnit::Finish {
                    reason: delta.stop_reason.as_deref().map(normalize_claude_stop),
                    usage,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<StreamUnit> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamUnit::Finish {
            reason: None,
            usage: None,
        }]
    }
}

#[derive(Default)]
struct OpenAiDecoder {
    started: bool,
    finish_reason: Option<&'static str>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl OpenAiDecoder {
    fn push(&mut self, event: &SseEvent) -> Vec<StreamUnit> {
        if event.data.trim() == "[DONE]" {
            return self.finish();
        }
        let Ok(chunk) = serde_json::from_str::<openai::ChatCompletionChunk>(&event.data) else {
            return Vec::new();
        };

        let mut units = Vec::new();
        if !self.started {
            self.started = true;
            units.push(StreamUnit::Start {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
            });
        }
        if let Some(usage) = &chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                units.push(StreamUnit::TextDelta(text));
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let name = call
                    .function
                    .as_ref()
                    .and_then(|function| function.name.clone());
                if let (Some(id), Some(name)) = (call.id.clone(), name) {
                    units.push(StreamUnit::ToolCallBegin {
                        index: call.index,
                        id,
                        name,
                    });
                }
                if let Some(arguments) = call
                    .function
                    .and_then(|function| function.arguments)
                    && !arguments.is_empty()
                {
                    units.push(StreamUnit::ToolCallDelta {
                        index: call.index,
                        arguments,
                    });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(normalize_openai_finish(&reason));
            }
        }
        units
    }

    fn finish(&mut self) -> Vec<StreamUnit> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamUnit::Finish {
            reason: self.finish_reason,
            usage: self.usage,
        }]
    }
}

#[derive(Default)]
struct CodexDecoder {
    tool_ordinals: HashMap<u32, u32>,
    tool_count: u32,
    finished: bool,
}

impl CodexDecoder {
    fn push(&mut self, event: &SseEvent) -> Vec<StreamUnit> {
        let Ok(parsed) = serde_json::from_str::<codex::ResponseStreamEvent>(&event.data) else {
            return Vec::new();
        };
        match parsed {
            codex::ResponseStreamEvent::Created { response } => vec![StreamUnit::Start {
                id: response.id,
                model: response.model.unwrap_or_default(),
            }],
            codex::ResponseStreamEvent::OutputItemAdded { output_index, item } => {
                if let codex::OutputItem::FunctionCall(call) = item {
                    let ordinal = self.tool_count;
                    self.tool_ordinals.insert(output_index, ordinal);
                    self.tool_count += 1;
                    vec![StreamUnit::ToolCallBegin {
                        index: ordinal,
                        id: call.call_id,
                        name: call.name,
                    }]
                } else {
                    Vec::new()
                }
            }
            codex::ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                vec![StreamUnit::TextDelta(delta)]
            }
            codex::ResponseStreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
                ..
            } => self
                .tool_ordinals
                .get(&output_index)
                .map(|ordinal| {
                    vec![StreamUnit::ToolCallDelta {
                        index: *ordinal,
                        arguments: delta,
                    }]
                })
                .unwrap_or_default(),
            codex::ResponseStreamEvent::Completed { response }
            | codex::ResponseStreamEvent::Failed { response } => {
                self.finished = true;
                let reason = if self.tool_count > 0 {
                    Some("tool_calls")
                } else {
                    Some("stop")
                };
                vec![StreamUnit::Finish {
                    reason,
                    usage: response.usage.map(|usage| TokenUsage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                    }),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<StreamUnit> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![StreamUnit::Finish {
            reason: None,
            usage: None,
        }]
    }
}

fn normalize_claude_stop(reason: &str) -> &'static str {
    match reason {
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        _ => "stop",
    }
}

fn normalize_openai_finish(reason: &str) -> &'static str {
    match reason {
        "tool_calls" => "tool_calls",
        "length" => "length",
        _ => "stop",
    }
}

// ---------------------------------------------------------------- encoders

enum StreamEncoder {
    Claude(ClaudeEncoder),
    OpenAi(OpenAiEncoder),
    Codex(CodexEncoder),
}

impl StreamEncoder {
    fn for_format(format: WireFormat) -> Option<Self> {
        match format {
            WireFormat::Claude => Some(StreamEncoder::Claude(ClaudeEncoder::default())),
            WireFormat::OpenAi => Some(StreamEncoder::OpenAi(OpenAiEncoder::new())),
            WireFormat::Codex => Some(StreamEncoder::Codex(CodexEncoder::default())),
            WireFormat::GeminiCli => None,
        }
    }

    fn encode(&mut self, unit: StreamUnit) -> Vec<SseEvent> {
        match self {
            StreamEncoder::Claude(encoder) => encoder.encode(unit),
            StreamEncoder::OpenAi(encoder) => encoder.encode(unit),
            StreamEncoder::Codex(encoder) => encoder.encode(unit),
        }
    }

    fn finish(&mut self) -> Vec<SseEvent> {
        match self {
            StreamEncoder::Claude(encoder) => encoder.finish(),
            StreamEncoder::OpenAi(encoder) => encoder.finish(),
            StreamEncoder::Codex(encoder) => encoder.finish(),
        }
    }
}

struct OpenAiEncoder {
    id: String,
    model: String,
    created: i64,
    finished: bool,
}

impl OpenAiEncoder {
    fn new() -> Self {
        Self {
            id: "chatcmpl-gateway".to_string(),
            model: String::new(),
            created: time::OffsetDateTime::now_utc().unix_timestamp(),
            finished: false,
        }
    }

    fn chunk(&self, delta: serde_json::Value, finish_reason: Option<&str>) -> SseEvent {
        SseEvent::data_only(
            json!({
                "id": self.id,
                "object": "chat.completion.chunk",
                "created": self.created,
                "model": self.model,
                "choices": [{
                    "index": 0,
                    "delta": delta,
                    "finish_reason": finish_reason,
                }],
            })
            .to_string(),
        )
    }

    fn encode(&mut self, unit: StreamUnit) -> Vec<SseEvent> {
        match unit {
            StreamUnit::Start { id, model } => {
                self.id = id;
                self.model = model;
                vec![self.chunk(json!({"role": "assistant", "content": ""}), None)]
            }
            StreamUnit::TextDelta(text) => {
                vec![self.chunk(json!({"content": text}), None)]
            }
            StreamUnit::ToolCallBegin { index, id, name } => {
                vec![self.chunk(
                    json!({"tool_calls": [{
                        "index": index,
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": ""},
                    }]}),
                    None,
                )]
            }
            StreamUnit::ToolCallDelta { index, arguments } => {
                vec![self.chunk(
                    json!({"tool_calls": [{
                        "index": index,
                        "function": {"arguments": arguments},
                    }]}),
                    None,
                )]
            }
            StreamUnit::Finish { reason, usage } => {
                self.finished = true;
                let mut events =
                    vec![self.chunk(json!({}), Some(reason.unwrap_or("stop")))];
                if let Some(usage) = usage {
                    events.push(SseEvent::data_only(
                        json!({
                            "id": self.id,
                            "object": "chat.completion.chunk",
                            "created": self.created,
                            "model": self.model,
                            "choices": [],
                            "usage": {
                                "prompt_tokens": usage.input_tokens,
                                "completion_tokens": usage.output_tokens,
                                "total_tokens": usage.input_tokens + usage.output_tokens,
                            },
                        })
                        .to_string(),
                    ));
                }
                events.push(SseEvent::data_only("[DONE]"));
                events
            }
        }
    }

    fn finish(&mut self) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![
            self.chunk(json!({}), Some("stop")),
            SseEvent::data_only("[DONE]"),
        ]
    }
}

#[derive(Default, PartialEq)]
enum OpenBlock {
    #[default]
    None,
    Text,
    Tool,
}

#[derive(Default)]
struct ClaudeEncoder {
    id: String,
    model: String,
    input_tokens: u64,
    block: OpenBlock,
    block_index: u32,
    next_index: u32,
    finished: bool,
}

impl ClaudeEncoder {
    fn named(event: &str, data: serde_json::Value) -> SseEvent {
        SseEvent::named(event, data.to_string())
    }

    fn close_block(&mut self, events: &mut Vec<SseEvent>) {
        if self.block != OpenBlock::None {
            events.push(Self::named(
                "content_block_stop",
                json!({"type": "content_block_stop", "index": self.block_index}),
            ));
            self.block = OpenBlock::None;
        }
    }

    fn encode(&mut self, unit: StreamUnit) -> Vec<SseEvent> {
        let mut events = Vec::new();
        match unit {
            StreamUnit::Start { id, model } => {
                self.id = id;
                self.model = model;
                events.push(Self::named(
                    "message_start",
                    json!({
                        "type": "message_start",
                        "message": {
                            "id": self.id,
                            "type": "message",
                            "role": "assistant",
                            "model": self.model,
                            "content": [],
                            "stop_reason": null,
                            "stop_sequence": null,
                            "usage": {"input_tokens": 0, "output_tokens": 0},
                        },
                    }),
                ));
            }
            StreamUnit::TextDelta(text) => {
                if self.block != OpenBlock::Text {
                    self.close_block(&mut events);
                    self.block = OpenBlock::Text;
                    self.block_index = self.next_index;
                    self.next_index += 1;
                    events.push(Self::named(
                        "content_block_start",
                        json!({
                            "type": "content_block_start",
                            "index": self.block_index,
                            "content_block": {"type": "text", "text": ""},
                        }),
                    ));
                }
                events.push(Self::named(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "text_delta", "text": text},
                    }),
                ));
            }
            StreamUnit::ToolCallBegin { id, name, .. } => {
                self.close_block(&mut events);
                self.block = OpenBlock::Tool;
                self.block_index = self.next_index;
                self.next_index += 1;
                events.push(Self::named(
                    "content_block_start",
                    json!({
                        "type": "content_block_start",
                        "index": self.block_index,
                        "content_block": {
                            "type": "tool_use", "id": id, "name": name, "input": {},
                        },
                    }),
                ));
            }
            StreamUnit::ToolCallDelta { arguments, .. } => {
                events.push(Self::named(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "input_json_delta", "partial_json": arguments},
                    }),
                ));
            }
            StreamUnit::Finish { reason, usage } => {
                self.finished = true;
                self.close_block(&mut events);
                let stop_reason = match reason {
                    Some("tool_calls") => "tool_use",
                    Some("length") => "max_tokens",
                    _ => "end_turn",
                };
                let usage = usage.unwrap_or(TokenUsage {
                    input_tokens: self.input_tokens,
                    output_tokens: 0,
                });
                events.push(Self::named(
                    "message_delta",
                    json!({
                        "type": "message_delta",
                        "delta": {"stop_reason": stop_reason, "stop_sequence": null},
                        "usage": {
                            "input_tokens": usage.input_tokens,
                            "output_tokens": usage.output_tokens,
                        },
                    }),
                ));
                events.push(Self::named(
                    "message_stop",
                    json!({"type": "message_stop"}),
                ));
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.encode(StreamUnit::Finish {
            reason: None,
            usage: None,
        })
    }
}

#[derive(Default)]
struct CodexEncoder {
    id: String,
    model: String,
    text_item_open: bool,
    next_output_index: u32,
    text_output_index: u32,
    tool_outputs: HashMap<u32, u32>,
    finished: bool,
}

impl CodexEncoder {
    fn named(event: &str, data: serde_json::Value) -> SseEvent {
        SseEvent::named(event, data.to_string())
    }

    fn skeleton(&self, status: &str, usage: Option<TokenUsage>) -> serde_json::Value {
        json!({
            "id": self.id,
            "object": "response",
            "model": self.model,
            "status": status,
            "output": [],
            "usage": usage.map(|usage| json!({
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
                "total_tokens": usage.input_tokens + usage.output_tokens,
            })),
        })
    }

    fn encode(&mut self, unit: StreamUnit) -> Vec<SseEvent> {
        match unit {
            StreamUnit::Start { id, model } => {
                self.id = id;
                self.model = model;
                vec![Self::named(
                    "response.created",
                    json!({
                        "type": "response.created",
                        "response": self.skeleton("in_progress", None),
                    }),
                )]
            }
            StreamUnit::TextDelta(text) => {
                let mut events = Vec::new();
                if !self.text_item_open {
                    self.text_item_open = true;
                    self.text_output_index = self.next_output_index;
                    self.next_output_index += 1;
                    events.push(Self::named(
                        "response.output_item.added",
                        json!({
                            "type": "response.output_item.added",
                            "output_index": self.text_output_index,
                            "item": {
                                "type": "message", "role": "assistant", "content": [],
                            },
                        }),
                    ));
                }
                events.push(Self::named(
                    "response.output_text.delta",
                    json!({
                        "type": "response.output_text.delta",
                        "output_index": self.text_output_index,
                        "delta": text,
                    }),
                ));
                events
            }
            StreamUnit::ToolCallBegin { index, id, name } => {
                let output_index = self.next_output_index;
                self.next_output_index += 1;
                self.tool_outputs.insert(index, output_index);
                vec![Self::named(
                    "response.output_item.added",
                    json!({
                        "type": "response.output_item.added",
                        "output_index": output_index,
                        "item": {
                            "type": "function_call",
                            "call_id": id,
                            "name": name,
                            "arguments": "",
                        },
                    }),
                )]
            }
            StreamUnit::ToolCallDelta { index, arguments } => {
                let output_index = self
                    .tool_outputs
                    .get(&index)
                    .copied()
                    .unwrap_or(self.next_output_index);
                vec![Self::named(
                    "response.function_call_arguments.delta",
                    json!({
                        "type": "response.function_call_arguments.delta",
                        "output_index": output_index,
                        "delta": arguments,
                    }),
                )]
            }
            StreamUnit::Finish { usage, .. } => {
                self.finished = true;
                vec![Self::named(
                    "response.completed",
                    json!({
                        "type": "response.completed",
                        "response": self.skeleton("completed", usage),
                    }),
                )]
            }
        }
    }

    fn finish(&mut self) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.encode(StreamUnit::Finish {
            reason: None,
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_events(bytes: &[u8]) -> Vec<SseEvent> {
        let mut parser = SseParser::new();
        let mut events = parser.push_bytes(bytes);
        events.extend(parser.finish());
        events
    }

    #[test]
    fn codex_stream_translates_to_openai_chunks() {
        let mut translator =
            StreamTranslator::new(WireFormat::Codex, WireFormat::OpenAi).unwrap();

        let mut out = BytesMut::new();
        for frame in [
            SseEvent::named(
                "response.created",
                r#"{"type":"response.created","response":{"id":"resp_1","object":"response","model":"gpt-5-codex","output":[]}}"#,
            ),
            SseEvent::named(
                "response.output_text.delta",
                r#"{"type":"response.output_text.delta","output_index":0,"delta":"hel"}"#,
            ),
            SseEvent::named(
                "response.output_text.delta",
                r#"{"type":"response.output_text.delta","output_index":0,"delta":"lo"}"#,
            ),
            SseEvent::named(
                "response.completed",
                r#"{"type":"response.completed","response":{"id":"resp_1","object":"response","output":[],"usage":{"input_tokens":7,"output_tokens":2}}}"#,
            ),
        ] {
            out.extend_from_slice(&translator.push(&frame.to_frame()));
        }
        out.extend_from_slice(&translator.finish());

        let events = collect_events(&out);
        // role chunk, two text chunks, finish chunk, usage chunk, [DONE]
        assert_eq!(events.len(), 6);
        assert_eq!(events.last().unwrap().data, "[DONE]");
        let text_chunk: openai::ChatCompletionChunk =
            serde_json::from_str(&events[1].data).unwrap();
        assert_eq!(text_chunk.id, "resp_1");
        assert_eq!(text_chunk.choices[0].delta.content.as_deref(), Some("hel"));
        assert_eq!(
            translator.usage(),
            Some(TokenUsage {
                input_tokens: 7,
                output_tokens: 2
            })
        );
    }

    #[test]
    fn openai_stream_translates_to_claude_events() {
        let mut translator =
            StreamTranslator::new(WireFormat::OpenAi, WireFormat::Claude).unwrap();

        let chunks = [
            r#"{"id":"c1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"hi"}}]}"#,
            r#"{"id":"c1","object":"chat.completion.chunk","created":0,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        ];
        let mut out = BytesMut::new();
        for chunk in chunks {
            out.extend_from_slice(
                &translator.push(&SseEvent::data_only(chunk).to_frame()),
            );
        }
        out.extend_from_slice(&translator.push(b"data: [DONE]\n\n"));
        out.extend_from_slice(&translator.finish());

        let events = collect_events(&out);
        let names: Vec<&str> = events
            .iter()
            .filter_map(|event| event.event.as_deref())
            .collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        let delta: claude::StreamEvent = serde_json::from_str(&events[4].data).unwrap();
        match delta {
            claude::StreamEvent::MessageDelta { usage, .. } => {
                let usage = usage.unwrap();
                assert_eq!(usage.output_tokens, Some(1));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn claude_tool_stream_translates_to_openai_tool_chunks() {
        let mut translator =
            StreamTranslator::new(WireFormat::Claude, WireFormat::OpenAi).unwrap();

        let frames = [
            SseEvent::named(
                "message_start",
                r#"{"type":"message_start","message":{"id":"m1","type":"message","role":"assistant","model":"claude-sonnet-4","content":[],"usage":{"input_tokens":11,"output_tokens":0}}}"#,
            ),
            SseEvent::named(
                "content_block_start",
                r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"f","input":{}}}"#,
            ),
            SseEvent::named(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"x\":"}}"#,
            ),
            SseEvent::named(
                "content_block_delta",
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"1}"}}"#,
            ),
            SseEvent::named("content_block_stop", r#"{"type":"content_block_stop","index":0}"#),
            SseEvent::named(
                "message_delta",
                r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":5}}"#,
            ),
            SseEvent::named("message_stop", r#"{"type":"message_stop"}"#),
        ];
        let mut out = BytesMut::new();
        for frame in frames {
            out.extend_from_slice(&translator.push(&frame.to_frame()));
        }
        out.extend_from_slice(&translator.finish());

        let events = collect_events(&out);
        let begin: openai::ChatCompletionChunk =
            serde_json::from_str(&events[1].data).unwrap();
        let calls = begin.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("t1"));
        let finish: openai::ChatCompletionChunk =
            serde_json::from_str(&events[4].data).unwrap();
        assert_eq!(
            finish.choices[0].finish_reason.as_deref(),
            Some("tool_calls")
        );
        assert_eq!(
            translator.usage(),
            Some(TokenUsage {
                input_tokens: 11,
                output_tokens: 5
            })
        );
    }

    #[test]
    fn gemini_cross_format_stream_is_unsupported() {
        assert!(matches!(
            StreamTranslator::new(WireFormat::GeminiCli, WireFormat::OpenAi),
            Err(TranslateError::Unsupported { .. })
        ));
    }

    #[test]
    fn usage_scanner_reads_passthrough_codex_usage() {
        let mut scanner = UsageScanner::for_format(WireFormat::Codex).unwrap();
        let frame = SseEvent::named(
            "response.completed",
            r#"{"type":"response.completed","response":{"id":"r","object":"response","output":[],"usage":{"input_tokens":4,"output_tokens":9}}}"#,
        );
        scanner.observe(&frame.to_frame());
        assert_eq!(
            scanner.usage(),
            Some(TokenUsage {
                input_tokens: 4,
                output_tokens: 9
            })
        );
    }
}
