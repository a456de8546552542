//! Canonical IR <-> OpenAI Chat Completions wire shape.

use gproxy_protocol::openai::chat::{
    ChatContent, ChatContentPart, ChatMessage, Choice, ChunkChoice, CreateChatCompletionChunk,
    CreateChatCompletionRequestBody, CreateChatCompletionResponseBody, Delta, ImageUrl, Role as WireRole,
    Tool as WireTool, ToolCall, ToolCallFunction, ToolFunction, Usage as WireUsage,
};
use gproxy_protocol::sse::SseEvent;
use serde_json::Value;

use crate::canonical::{ChunkEvent, ChunkUsage, Message, Part, Request, Response, Role, Tool, Usage};

pub fn request_to_canonical(body: &CreateChatCompletionRequestBody) -> Request {
    let mut system = None;
    let mut messages = Vec::with_capacity(body.messages.len());

    for message in &body.messages {
        let role = match message.role {
            WireRole::System => {
                if let Some(content) = &message.content {
                    system = Some(content.as_text());
                }
                continue;
            }
            WireRole::User => Role::User,
            WireRole::Assistant => Role::Assistant,
            WireRole::Tool => Role::Tool,
        };

        let mut parts = Vec::new();
        if let Some(content) = &message.content {
            match content {
                ChatContent::Text(text) => parts.push(Part::Text(text.clone())),
                ChatContent::Parts(items) => {
                    for item in items {
                        match item {
                            ChatContentPart::Text { text } => parts.push(Part::Text(text.clone())),
                            ChatContentPart::ImageUrl { image_url } => parts.push(Part::Image {
                                url: image_url.url.clone(),
                            }),
                        }
                    }
                }
            }
        }
        if let Some(tool_call_id) = &message.tool_call_id {
            parts.push(Part::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: message
                    .content
                    .as_ref()
                    .map(|c| Value::String(c.as_text()))
                    .unwrap_or(Value::Null),
                is_error: false,
            });
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                let input: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                parts.push(Part::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input,
                });
            }
        }

        messages.push(Message { role, parts });
    }

    let tools = body
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .map(|t| Tool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t.function.parameters.clone().unwrap_or(Value::Null),
                })
                .collect()
        })
        .unwrap_or_default();

    let stop = match &body.stop {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };

    Request {
        system,
        messages,
        max_tokens: body.max_tokens,
        temperature: body.temperature,
        top_p: body.top_p,
        tools,
        stop,
        stream: body.stream.unwrap_or(false),
    }
}

pub fn request_from_canonical(request: &Request, model: &str) -> CreateChatCompletionRequestBody {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: WireRole::System,
            content: Some(ChatContent::Text(system.clone())),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        });
    }

    for message in &request.messages {
        let role = match message.role {
            Role::System => WireRole::System,
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::Tool => WireRole::Tool,
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_call_id = None;
        for part in &message.parts {
            match part {
                Part::Text(text) => text_parts.push(ChatContentPart::Text { text: text.clone() }),
                Part::Image { url } => text_parts.push(ChatContentPart::ImageUrl {
                    image_url: ImageUrl { url: url.clone() },
                }),
                Part::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                Part::ToolResult { tool_use_id, content, .. } => {
                    tool_call_id = Some(tool_use_id.clone());
                    text_parts.push(ChatContentPart::Text {
                        text: content.as_str().map(String::from).unwrap_or_else(|| content.to_string()),
                    });
                }
            }
        }

        messages.push(ChatMessage {
            role,
            content: if text_parts.is_empty() {
                None
            } else {
                Some(ChatContent::Parts(text_parts))
            },
            name: None,
            tool_call_id,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        });
    }

    CreateChatCompletionRequestBody {
        model: model.to_string(),
        messages,
        stream: Some(request.stream),
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        tools: if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| WireTool {
                        kind: "function".to_string(),
                        function: ToolFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.input_schema.clone()),
                        },
                    })
                    .collect(),
            )
        },
        stop: if request.stop.is_empty() {
            None
        } else {
            Some(Value::Array(request.stop.iter().cloned().map(Value::String).collect()))
        },
        extra: Default::default(),
    }
}

pub fn response_to_canonical(body: &CreateChatCompletionResponseBody) -> Response {
    let choice = body.choices.first();
    let mut parts = Vec::new();
    if let Some(choice) = choice {
        if let Some(content) = &choice.message.content {
            parts.push(Part::Text(content.as_text()));
        }
        if let Some(tool_calls) = &choice.message.tool_calls {
            for call in tool_calls {
                let input = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                parts.push(Part::ToolUse {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    input,
                });
            }
        }
    }

    Response {
        model: body.model.clone(),
        parts,
        finish_reason: choice.and_then(|c| c.finish_reason.clone()),
        usage: body
            .usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default(),
    }
}

pub fn response_from_canonical(response: &Response, id: &str, created: i64) -> CreateChatCompletionResponseBody {
    let text = response
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text(text) => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    let tool_calls: Vec<ToolCall> = response
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolUse { id, name, input } => Some(ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: name.clone(),
                    arguments: input.to_string(),
                },
            }),
            _ => None,
        })
        .collect();

    CreateChatCompletionResponseBody {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: response.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: WireRole::Assistant,
                content: if text.is_empty() { None } else { Some(ChatContent::Text(text)) },
                name: None,
                tool_call_id: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason: response.finish_reason.clone(),
        }],
        usage: Some(WireUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    }
}

/// Decode one raw OpenAI SSE event (`data: {...}` / `data: [DONE]`) into a
/// canonical chunk event (§4.6 step 4 "streaming translation").
pub fn decode_stream_event(event: &SseEvent) -> Option<ChunkEvent> {
    if event.data.trim() == "[DONE]" {
        return None;
    }
    let chunk: CreateChatCompletionChunk = serde_json::from_str(&event.data).ok()?;
    let choice = chunk.choices.first()?;
    if let Some(finish_reason) = &choice.finish_reason {
        return Some(ChunkEvent::Done {
            finish_reason: Some(finish_reason.clone()),
            usage: chunk.usage.map(|u| ChunkUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        });
    }
    if let Some(tool_calls) = &choice.delta.tool_calls {
        if let Some(call) = tool_calls.first() {
            if !call.function.arguments.is_empty() {
                return Some(ChunkEvent::ToolUseDelta {
                    index: choice.index,
                    partial_json: call.function.arguments.clone(),
                });
            }
            return Some(ChunkEvent::ToolUseStart {
                index: choice.index,
                id: call.id.clone(),
                name: call.function.name.clone(),
            });
        }
    }
    let text = choice.delta.content.clone().unwrap_or_default();
    Some(ChunkEvent::TextDelta(text))
}

/// Render a canonical chunk event into an OpenAI-shaped SSE event for the
/// caller (used when the caller's own `apiShape` is `chat` regardless of
/// which vendor served the attempt).
pub fn encode_chunk_event(event: &ChunkEvent, id: &str, created: i64, model: &str) -> SseEvent {
    let (delta, finish_reason, usage) = match event {
        ChunkEvent::TextDelta(text) => (
            Delta {
                role: None,
                content: Some(text.clone()),
                tool_calls: None,
            },
            None,
            None,
        ),
        ChunkEvent::ToolUseStart { id, name, .. } => (
            Delta {
                role: None,
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: name.clone(),
                        arguments: String::new(),
                    },
                }]),
            },
            None,
            None,
        ),
        ChunkEvent::ToolUseDelta { partial_json, .. } => (
            Delta {
                role: None,
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: String::new(),
                    kind: "function".to_string(),
                    function: ToolCallFunction {
                        name: String::new(),
                        arguments: partial_json.clone(),
                    },
                }]),
            },
            None,
            None,
        ),
        ChunkEvent::Done { finish_reason, usage } => (
            Delta {
                role: None,
                content: None,
                tool_calls: None,
            },
            finish_reason.clone(),
            usage.map(|u| WireUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        ),
    };

    let chunk = CreateChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    };

    SseEvent {
        event: None,
        data: serde_json::to_string(&chunk).unwrap_or_default(),
    }
}

/// The sentinel OpenAI (and Anthropic, per §4.7) streams expect on normal
/// termination.
pub const DONE_SENTINEL: &str = "[DONE]";

#[cfg(test)]
mod tests {
    use gproxy_protocol::openai::chat::ToolCallFunction;

    use super::*;

    fn request_body(extra_message: ChatMessage) -> CreateChatCompletionRequestBody {
        CreateChatCompletionRequestBody {
            model: "gpt-4o-mini".to_string(),
            messages: vec![
                ChatMessage {
                    role: WireRole::System,
                    content: Some(ChatContent::Text("be terse".to_string())),
                    name: None,
                    tool_call_id: None,
                    tool_calls: None,
                },
                extra_message,
            ],
            stream: Some(true),
            temperature: Some(0.5),
            top_p: None,
            max_tokens: Some(256),
            tools: None,
            stop: Some(Value::String("\n\n".to_string())),
            extra: Default::default(),
        }
    }

    #[test]
    fn request_to_canonical_lifts_the_system_message_out_of_the_message_list() {
        let body = request_body(ChatMessage {
            role: WireRole::User,
            content: Some(ChatContent::Text("hello".to_string())),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        });

        let canonical = request_to_canonical(&body);
        assert_eq!(canonical.system.as_deref(), Some("be terse"));
        assert_eq!(canonical.messages.len(), 1, "the system message is not duplicated into messages");
        assert_eq!(canonical.messages[0].role, Role::User);
        assert_eq!(canonical.messages[0].text_only(), "hello");
        assert_eq!(canonical.stop, vec!["\n\n".to_string()]);
        assert!(canonical.stream);
        assert_eq!(canonical.max_tokens, Some(256));
    }

    #[test]
    fn request_to_canonical_carries_tool_calls_and_multipart_image_content() {
        let body = request_body(ChatMessage {
            role: WireRole::Assistant,
            content: Some(ChatContent::Parts(vec![
                ChatContentPart::Text { text: "see this:".to_string() },
                ChatContentPart::ImageUrl {
                    image_url: ImageUrl { url: "https://example.com/a.png".to_string() },
                },
            ])),
            name: None,
            tool_call_id: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".to_string(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: "lookup".to_string(),
                    arguments: r#"{"q":"rust"}"#.to_string(),
                },
            }]),
        });

        let canonical = request_to_canonical(&body);
        let message = &canonical.messages[0];
        assert!(matches!(message.parts[0], Part::Text(ref t) if t == "see this:"));
        assert!(matches!(&message.parts[1], Part::Image { url } if url == "https://example.com/a.png"));
        assert!(matches!(
            &message.parts[2],
            Part::ToolUse { id, name, input } if id == "call_1" && name == "lookup" && input["q"] == "rust"
        ));
    }

    #[test]
    fn request_roundtrips_through_canonical_with_stop_and_tools() {
        let original = Request {
            system: Some("be brief".to_string()),
            messages: vec![Message::text(Role::User, "ping")],
            max_tokens: Some(64),
            temperature: Some(0.2),
            top_p: Some(0.9),
            tools: vec![Tool {
                name: "search".to_string(),
                description: Some("web search".to_string()),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            stop: vec!["END".to_string()],
            stream: false,
        };

        let wire = request_from_canonical(&original, "gpt-4o-mini");
        assert_eq!(wire.model, "gpt-4o-mini");
        // A system message is re-inserted at the front of the wire message list.
        assert!(matches!(wire.messages[0].role, WireRole::System));

        let roundtripped = request_to_canonical(&wire);
        assert_eq!(roundtripped.system, original.system);
        assert_eq!(roundtripped.messages.len(), original.messages.len());
        assert_eq!(roundtripped.messages[0].text_only(), "ping");
        assert_eq!(roundtripped.stop, original.stop);
        assert_eq!(roundtripped.tools.len(), 1);
        assert_eq!(roundtripped.tools[0].name, "search");
    }

    #[test]
    fn response_from_canonical_joins_text_parts_and_carries_tool_calls() {
        let response = Response {
            model: "gpt-4o-mini".to_string(),
            parts: vec![
                Part::Text("Hel".to_string()),
                Part::Text("lo".to_string()),
                Part::ToolUse {
                    id: "call_2".to_string(),
                    name: "search".to_string(),
                    input: serde_json::json!({"q": "x"}),
                },
            ],
            finish_reason: Some("tool_calls".to_string()),
            usage: Usage { input_tokens: 10, output_tokens: 4 },
        };

        let wire = response_from_canonical(&response, "resp_1", 1_700_000_000);
        assert_eq!(wire.id, "resp_1");
        assert_eq!(wire.choices.len(), 1);
        let message = &wire.choices[0].message;
        assert!(matches!(&message.content, Some(ChatContent::Text(text)) if text == "Hello"));
        assert_eq!(message.tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(wire.usage.as_ref().unwrap().total_tokens, 14);

        let back = response_to_canonical(&wire);
        assert_eq!(back.parts.len(), 2, "joined text part plus the one tool-use part");
        assert_eq!(back.usage.input_tokens, 10);
        assert_eq!(back.usage.output_tokens, 4);
    }

    #[test]
    fn decode_stream_event_returns_none_for_the_done_sentinel() {
        let event = SseEvent { event: None, data: "[DONE]".to_string() };
        assert!(decode_stream_event(&event).is_none());
    }

    #[test]
    fn decode_stream_event_reads_text_deltas_and_terminal_usage() {
        let delta_chunk = CreateChatCompletionChunk {
            id: "c1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "gpt-4o-mini".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { role: None, content: Some("hi".to_string()), tool_calls: None },
                finish_reason: None,
            }],
            usage: None,
        };
        let event = SseEvent { event: None, data: serde_json::to_string(&delta_chunk).unwrap() };
        assert!(matches!(decode_stream_event(&event), Some(ChunkEvent::TextDelta(text)) if text == "hi"));

        let done_chunk = CreateChatCompletionChunk {
            id: "c1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "gpt-4o-mini".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { role: None, content: None, tool_calls: None },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(WireUsage { prompt_tokens: 3, completion_tokens: 2, total_tokens: 5 }),
        };
        let event = SseEvent { event: None, data: serde_json::to_string(&done_chunk).unwrap() };
        match decode_stream_event(&event) {
            Some(ChunkEvent::Done { finish_reason, usage }) => {
                assert_eq!(finish_reason.as_deref(), Some("stop"));
                assert_eq!(usage.unwrap().input_tokens, 3);
            }
            other => panic!("expected a Done event, got {other:?}"),
        }
    }

    #[test]
    fn encode_chunk_event_renders_a_text_delta_as_openai_chunk_json() {
        let event = ChunkEvent::TextDelta("hi".to_string());
        let sse = encode_chunk_event(&event, "c1", 0, "gpt-4o-mini");
        assert!(sse.data.contains("\"content\":\"hi\""));
        assert!(sse.event.is_none(), "openai chunk events are unnamed `data:` events");
    }
}
