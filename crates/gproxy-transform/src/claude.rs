//! Canonical IR <-> Anthropic Messages wire shape.

use gproxy_protocol::claude::messages::{
    ContentBlock, ContentDelta, CreateMessageRequestBody, CreateMessageResponseBody, InputMessage,
    MessageContent, MessageStreamEvent, Role as WireRole, SystemPrompt, ToolDefinition, Usage as WireUsage,
};
use gproxy_protocol::sse::SseEvent;
use serde_json::Value;

use crate::canonical::{ChunkEvent, ChunkUsage, Message, Part, Request, Response, Role, Tool, Usage};

fn block_to_part(block: &ContentBlock) -> Part {
    match block {
        ContentBlock::Text { text } => Part::Text(text.clone()),
        ContentBlock::Image { source } => Part::Image {
            url: format!("data:{};base64,{}", source.media_type, source.data),
        },
        ContentBlock::ToolUse { id, name, input } => Part::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Part::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone().unwrap_or(Value::Null),
            is_error: is_error.unwrap_or(false),
        },
    }
}

fn part_to_block(part: &Part) -> ContentBlock {
    match part {
        Part::Text(text) => ContentBlock::Text { text: text.clone() },
        Part::Image { url } => ContentBlock::Image {
            source: gproxy_protocol::claude::messages::ImageSource {
                kind: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: url.clone(),
            },
        },
        Part::ToolUse { id, name, input } => ContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        Part::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => ContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: Some(content.clone()),
            is_error: Some(*is_error),
        },
    }
}

pub fn request_to_canonical(body: &CreateMessageRequestBody) -> Request {
    let system = body.system.as_ref().map(|system| match system {
        SystemPrompt::Text(text) => text.clone(),
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    });

    let messages = body
        .messages
        .iter()
        .map(|message| {
            let role = match message.role {
                WireRole::User => Role::User,
                WireRole::Assistant => Role::Assistant,
            };
            let parts = match &message.content {
                MessageContent::Text(text) => vec![Part::Text(text.clone())],
                MessageContent::Blocks(blocks) => blocks.iter().map(block_to_part).collect(),
            };
            Message { role, parts }
        })
        .collect();

    let tools = body
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .map(|t| Tool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Request {
        system,
        messages,
        max_tokens: Some(body.max_tokens),
        temperature: body.temperature,
        top_p: body.top_p,
        tools,
        stop: body.stop_sequences.clone().unwrap_or_default(),
        stream: body.stream.unwrap_or(false),
    }
}

pub fn request_from_canonical(request: &Request, model: &str) -> CreateMessageRequestBody {
    let messages = request
        .messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System))
        .map(|message| InputMessage {
            role: match message.role {
                Role::Assistant => WireRole::Assistant,
                _ => WireRole::User,
            },
            content: MessageContent::Blocks(message.parts.iter().map(part_to_block).collect()),
        })
        .collect();

    CreateMessageRequestBody {
        model: model.to_string(),
        max_tokens: request.max_tokens.unwrap_or(4096),
        messages,
        system: request.system.clone().map(SystemPrompt::Text),
        stream: Some(request.stream),
        temperature: request.temperature,
        top_p: request.top_p,
        tools: if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| ToolDefinition {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                    })
                    .collect(),
            )
        },
        stop_sequences: if request.stop.is_empty() { None } else { Some(request.stop.clone()) },
        extra: Default::default(),
    }
}

pub fn response_to_canonical(body: &CreateMessageResponseBody) -> Response {
    Response {
        model: body.model.clone(),
        parts: body.content.iter().map(block_to_part).collect(),
        finish_reason: body.stop_reason.clone(),
        usage: Usage {
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
        },
    }
}

pub fn response_from_canonical(response: &Response, id: &str) -> CreateMessageResponseBody {
    CreateMessageResponseBody {
        id: id.to_string(),
        kind: "message".to_string(),
        role: WireRole::Assistant,
        content: response.parts.iter().map(part_to_block).collect(),
        model: response.model.clone(),
        stop_reason: response.finish_reason.clone(),
        stop_sequence: None,
        usage: WireUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        },
    }
}

/// Decode one typed Anthropic SSE event (`event: content_block_delta`, …)
/// into a canonical chunk event.
pub fn decode_stream_event(event: &SseEvent) -> Option<ChunkEvent> {
    let parsed: MessageStreamEvent = serde_json::from_str(&event.data).ok()?;
    match parsed {
        MessageStreamEvent::ContentBlockStart { index, content_block } => match content_block {
            ContentBlock::ToolUse { id, name, .. } => Some(ChunkEvent::ToolUseStart { index, id, name }),
            ContentBlock::Text { text } if !text.is_empty() => Some(ChunkEvent::TextDelta(text)),
            _ => None,
        },
        MessageStreamEvent::ContentBlockDelta { index, delta } => match delta {
            ContentDelta::TextDelta { text } => Some(ChunkEvent::TextDelta(text)),
            ContentDelta::InputJsonDelta { partial_json } => Some(ChunkEvent::ToolUseDelta { index, partial_json }),
        },
        MessageStreamEvent::MessageDelta { delta, usage } => Some(ChunkEvent::Done {
            finish_reason: delta.stop_reason,
            usage: Some(ChunkUsage {
                input_tokens: 0,
                output_tokens: usage.output_tokens,
            }),
        }),
        MessageStreamEvent::ContentBlockStop { .. }
        | MessageStreamEvent::MessageStart { .. }
        | MessageStreamEvent::MessageStop
        | MessageStreamEvent::Ping => None,
    }
}

/// Render a canonical chunk event as a typed Anthropic SSE event for the
/// caller (used when the caller's own `apiShape` is `messages`).
pub fn encode_chunk_event(event: &ChunkEvent, index: u32) -> SseEvent {
    let wire = match event {
        ChunkEvent::TextDelta(text) => MessageStreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta { text: text.clone() },
        },
        ChunkEvent::ToolUseStart { index, id, name } => MessageStreamEvent::ContentBlockStart {
            index: *index,
            content_block: ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: Value::Object(Default::default()),
            },
        },
        ChunkEvent::ToolUseDelta { index, partial_json } => MessageStreamEvent::ContentBlockDelta {
            index: *index,
            delta: ContentDelta::InputJsonDelta {
                partial_json: partial_json.clone(),
            },
        },
        ChunkEvent::Done { finish_reason, usage } => MessageStreamEvent::MessageDelta {
            delta: gproxy_protocol::claude::messages::MessageDeltaFields {
                stop_reason: finish_reason.clone(),
                stop_sequence: None,
            },
            usage: WireUsage {
                input_tokens: usage.map(|u| u.input_tokens).unwrap_or(0),
                output_tokens: usage.map(|u| u.output_tokens).unwrap_or(0),
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        },
    };

    let event_name = match &wire {
        MessageStreamEvent::MessageStart { .. } => "message_start",
        MessageStreamEvent::ContentBlockStart { .. } => "content_block_start",
        MessageStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        MessageStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        MessageStreamEvent::MessageDelta { .. } => "message_delta",
        MessageStreamEvent::MessageStop => "message_stop",
        MessageStreamEvent::Ping => "ping",
    };

    SseEvent {
        event: Some(event_name.to_string()),
        data: serde_json::to_string(&wire).unwrap_or_default(),
    }
}

/// Anthropic's normal-termination marker is `message_stop` followed by a
/// closed stream, not a literal sentinel string — this event is emitted by
/// the bridge, not computed here.
pub const MESSAGE_STOP_EVENT: &str = "message_stop";

#[cfg(test)]
mod tests {
    use gproxy_protocol::claude::messages::ImageSource;

    use super::*;

    #[test]
    fn request_to_canonical_joins_block_system_prompt_and_keeps_user_messages() {
        let body = CreateMessageRequestBody {
            model: "claude-3-5-sonnet".to_string(),
            max_tokens: 512,
            messages: vec![InputMessage {
                role: WireRole::User,
                content: MessageContent::Text("hi there".to_string()),
            }],
            system: Some(SystemPrompt::Blocks(vec![
                ContentBlock::Text { text: "be helpful".to_string() },
                ContentBlock::Text { text: "be terse".to_string() },
            ])),
            stream: Some(false),
            temperature: Some(0.3),
            top_p: None,
            tools: None,
            stop_sequences: Some(vec!["STOP".to_string()]),
            extra: Default::default(),
        };

        let canonical = request_to_canonical(&body);
        assert_eq!(canonical.system.as_deref(), Some("be helpful\nbe terse"));
        assert_eq!(canonical.messages.len(), 1);
        assert_eq!(canonical.messages[0].role, Role::User);
        assert_eq!(canonical.messages[0].text_only(), "hi there");
        assert_eq!(canonical.max_tokens, Some(512));
        assert_eq!(canonical.stop, vec!["STOP".to_string()]);
    }

    #[test]
    fn tool_use_and_tool_result_blocks_roundtrip_through_canonical_parts() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "search".to_string(),
            input: serde_json::json!({"q": "rust"}),
        };
        let part = block_to_part(&block);
        assert!(matches!(&part, Part::ToolUse { id, name, .. } if id == "toolu_1" && name == "search"));
        let back = part_to_block(&part);
        assert!(matches!(back, ContentBlock::ToolUse { id, .. } if id == "toolu_1"));

        let result_block = ContentBlock::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: Some(serde_json::json!("42")),
            is_error: Some(true),
        };
        let part = block_to_part(&result_block);
        assert!(matches!(&part, Part::ToolResult { tool_use_id, is_error, .. } if tool_use_id == "toolu_1" && *is_error));
    }

    #[test]
    fn image_block_round_trips_as_a_data_url() {
        let block = ContentBlock::Image {
            source: ImageSource {
                kind: "base64".to_string(),
                media_type: "image/png".to_string(),
                data: "Zm9v".to_string(),
            },
        };
        let part = block_to_part(&block);
        assert!(matches!(&part, Part::Image { url } if url == "data:image/png;base64,Zm9v"));
    }

    #[test]
    fn request_from_canonical_drops_a_canonical_system_role_message_and_carries_max_tokens() {
        let request = Request {
            system: Some("be nice".to_string()),
            messages: vec![Message::text(Role::User, "hi")],
            max_tokens: Some(128),
            temperature: None,
            top_p: None,
            tools: Vec::new(),
            stop: Vec::new(),
            stream: true,
        };
        let wire = request_from_canonical(&request, "claude-3-5-sonnet");
        assert_eq!(wire.max_tokens, 128);
        assert_eq!(wire.messages.len(), 1);
        assert!(matches!(wire.system, Some(SystemPrompt::Text(ref s)) if s == "be nice"));
    }

    #[test]
    fn request_from_canonical_defaults_max_tokens_when_canonical_omits_it() {
        let request = Request {
            system: None,
            messages: Vec::new(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            tools: Vec::new(),
            stop: Vec::new(),
            stream: false,
        };
        let wire = request_from_canonical(&request, "claude-3-5-sonnet");
        assert_eq!(wire.max_tokens, 4096, "falls back to Anthropic's required-field default");
    }

    #[test]
    fn decode_stream_event_reads_text_and_tool_deltas() {
        let text_event = SseEvent {
            event: Some("content_block_delta".to_string()),
            data: serde_json::to_string(&MessageStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text: "hi".to_string() },
            })
            .unwrap(),
        };
        assert!(matches!(decode_stream_event(&text_event), Some(ChunkEvent::TextDelta(text)) if text == "hi"));

        let tool_start = SseEvent {
            event: Some("content_block_start".to_string()),
            data: serde_json::to_string(&MessageStreamEvent::ContentBlockStart {
                index: 1,
                content_block: ContentBlock::ToolUse {
                    id: "toolu_2".to_string(),
                    name: "search".to_string(),
                    input: serde_json::json!({}),
                },
            })
            .unwrap(),
        };
        assert!(matches!(
            decode_stream_event(&tool_start),
            Some(ChunkEvent::ToolUseStart { index: 1, id, name }) if id == "toolu_2" && name == "search"
        ));

        let stop_event = SseEvent { event: Some("ping".to_string()), data: serde_json::to_string(&MessageStreamEvent::Ping).unwrap() };
        assert!(decode_stream_event(&stop_event).is_none());
    }

    #[test]
    fn encode_chunk_event_uses_the_right_event_name_per_variant() {
        let delta = encode_chunk_event(&ChunkEvent::TextDelta("hi".to_string()), 0);
        assert_eq!(delta.event.as_deref(), Some("content_block_delta"));

        let done = encode_chunk_event(
            &ChunkEvent::Done {
                finish_reason: Some("end_turn".to_string()),
                usage: Some(ChunkUsage { input_tokens: 1, output_tokens: 2 }),
            },
            0,
        );
        assert_eq!(done.event.as_deref(), Some("message_delta"));
        assert!(done.data.contains("end_turn"));
    }
}
