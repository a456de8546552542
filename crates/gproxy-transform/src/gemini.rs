//! Canonical IR <-> Gemini generateContent wire shape.

use gproxy_protocol::gemini::generate_content::{
    Candidate as WireCandidate, Content, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateContentRequestBody, GenerateContentResponseBody, GenerationConfig, Part as WirePart,
    Tool as WireTool, UsageMetadata,
};
use gproxy_protocol::sse::SseEvent;
use serde_json::Value;

use crate::canonical::{ChunkEvent, ChunkUsage, Message, Part, Request, Response, Role, Tool, Usage};

fn wire_part_to_part(part: &WirePart) -> Part {
    match part {
        WirePart::Text { text } => Part::Text(text.clone()),
        WirePart::InlineData { inline_data } => Part::Image {
            url: format!("data:{};base64,{}", inline_data.mime_type, inline_data.data),
        },
        WirePart::FunctionCall { function_call } => Part::ToolUse {
            id: function_call.name.clone(),
            name: function_call.name.clone(),
            input: function_call.args.clone(),
        },
        WirePart::FunctionResponse { function_response } => Part::ToolResult {
            tool_use_id: function_response.name.clone(),
            content: function_response.response.clone(),
            is_error: false,
        },
    }
}

fn part_to_wire_part(part: &Part) -> WirePart {
    match part {
        Part::Text(text) => WirePart::Text { text: text.clone() },
        Part::Image { url } => WirePart::InlineData {
            inline_data: gproxy_protocol::gemini::generate_content::InlineData {
                mime_type: "image/png".to_string(),
                data: url.clone(),
            },
        },
        Part::ToolUse { name, input, .. } => WirePart::FunctionCall {
            function_call: FunctionCall {
                name: name.clone(),
                args: input.clone(),
            },
        },
        Part::ToolResult { tool_use_id, content, .. } => WirePart::FunctionResponse {
            function_response: FunctionResponse {
                name: tool_use_id.clone(),
                response: content.clone(),
            },
        },
    }
}

pub fn request_to_canonical(body: &GenerateContentRequestBody) -> Request {
    let system = body.system_instruction.as_ref().map(|c| c.as_text());

    let messages = body
        .contents
        .iter()
        .map(|content| {
            let role = match content.role.as_deref() {
                Some("model") => Role::Assistant,
                _ => Role::User,
            };
            Message {
                role,
                parts: content.parts.iter().map(wire_part_to_part).collect(),
            }
        })
        .collect();

    let tools = body
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .flat_map(|t| t.function_declarations.clone().unwrap_or_default())
                .map(|f| Tool {
                    name: f.name,
                    description: f.description,
                    input_schema: f.parameters.unwrap_or(Value::Null),
                })
                .collect()
        })
        .unwrap_or_default();

    let config = body.generation_config.clone().unwrap_or_default();

    Request {
        system,
        messages,
        max_tokens: config.max_output_tokens,
        temperature: config.temperature,
        top_p: config.top_p,
        tools,
        stop: config.stop_sequences.unwrap_or_default(),
        stream: false,
    }
}

pub fn request_from_canonical(request: &Request) -> GenerateContentRequestBody {
    let contents = request
        .messages
        .iter()
        .map(|message| Content {
            role: Some(
                match message.role {
                    Role::Assistant => "model",
                    _ => "user",
                }
                .to_string(),
            ),
            parts: message.parts.iter().map(part_to_wire_part).collect(),
        })
        .collect();

    let function_declarations: Vec<FunctionDeclaration> = request
        .tools
        .iter()
        .map(|t| FunctionDeclaration {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: Some(t.input_schema.clone()),
        })
        .collect();

    GenerateContentRequestBody {
        contents,
        system_instruction: request.system.as_ref().map(|text| Content {
            role: None,
            parts: vec![WirePart::Text { text: text.clone() }],
        }),
        generation_config: Some(GenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_tokens,
            stop_sequences: if request.stop.is_empty() { None } else { Some(request.stop.clone()) },
        }),
        tools: if function_declarations.is_empty() {
            None
        } else {
            Some(vec![WireTool {
                function_declarations: Some(function_declarations),
            }])
        },
    }
}

pub fn response_to_canonical(body: &GenerateContentResponseBody) -> Response {
    let candidate = body.candidates.first();
    Response {
        model: body.model_version.clone(),
        parts: candidate
            .map(|c| c.content.parts.iter().map(wire_part_to_part).collect())
            .unwrap_or_default(),
        finish_reason: candidate.and_then(|c| c.finish_reason.clone()),
        usage: body
            .usage_metadata
            .as_ref()
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default(),
    }
}

pub fn response_from_canonical(response: &Response) -> GenerateContentResponseBody {
    GenerateContentResponseBody {
        candidates: vec![WireCandidate {
            content: Content {
                role: Some("model".to_string()),
                parts: response.parts.iter().map(part_to_wire_part).collect(),
            },
            finish_reason: response.finish_reason.clone(),
            index: 0,
        }],
        usage_metadata: Some(UsageMetadata {
            prompt_token_count: response.usage.input_tokens,
            candidates_token_count: response.usage.output_tokens,
            total_token_count: response.usage.input_tokens + response.usage.output_tokens,
        }),
        model_version: response.model.clone(),
    }
}

/// Gemini streams chunked JSON objects (an array of partial
/// `GenerateContentResponseBody` values), not SSE with `event:` framing.
/// The HTTP layer still wraps each chunk in `data:` framing over the wire
/// for our own caller-facing stream, but decoding an upstream Gemini chunk
/// parses the JSON object directly.
pub fn decode_stream_event(event: &SseEvent) -> Option<ChunkEvent> {
    let body: GenerateContentResponseBody = serde_json::from_str(&event.data).ok()?;
    let candidate = body.candidates.first()?;
    if let Some(finish_reason) = &candidate.finish_reason {
        return Some(ChunkEvent::Done {
            finish_reason: Some(finish_reason.clone()),
            usage: body.usage_metadata.map(|u| ChunkUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        });
    }
    let text = candidate.content.as_text();
    if !text.is_empty() {
        return Some(ChunkEvent::TextDelta(text));
    }
    for part in &candidate.content.parts {
        if let WirePart::FunctionCall { function_call } = part {
            return Some(ChunkEvent::ToolUseStart {
                index: 0,
                id: function_call.name.clone(),
                name: function_call.name.clone(),
            });
        }
    }
    None
}

/// Render a canonical chunk event as a Gemini-shaped streaming chunk (a
/// full partial `GenerateContentResponseBody`, Gemini has no incremental
/// delta framing the way OpenAI/Anthropic do).
pub fn encode_chunk_event(event: &ChunkEvent, model: &str) -> SseEvent {
    let (parts, finish_reason, usage) = match event {
        ChunkEvent::TextDelta(text) => (vec![WirePart::Text { text: text.clone() }], None, None),
        ChunkEvent::ToolUseStart { name, .. } => (
            vec![WirePart::FunctionCall {
                function_call: FunctionCall {
                    name: name.clone(),
                    args: Value::Object(Default::default()),
                },
            }],
            None,
            None,
        ),
        ChunkEvent::ToolUseDelta { .. } => (Vec::new(), None, None),
        ChunkEvent::Done { finish_reason, usage } => (Vec::new(), finish_reason.clone(), *usage),
    };

    let body = GenerateContentResponseBody {
        candidates: vec![WireCandidate {
            content: Content {
                role: Some("model".to_string()),
                parts,
            },
            finish_reason,
            index: 0,
        }],
        usage_metadata: usage.map(|u| UsageMetadata {
            prompt_token_count: u.input_tokens,
            candidates_token_count: u.output_tokens,
            total_token_count: u.input_tokens + u.output_tokens,
        }),
        model_version: model.to_string(),
    };

    SseEvent {
        event: None,
        data: serde_json::to_string(&body).unwrap_or_default(),
    }
}
