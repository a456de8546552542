//! Canonical IR <-> OpenAI Responses wire shape.
//!
//! The Responses API's own wire framing (`input`/`instructions`/`output`)
//! differs from Chat Completions, but both are served by the same
//! `OpenAiProvider` over the same upstream endpoint (§4.6: adapters are
//! vendor-scoped, not `apiShape`-scoped) — only the caller-facing decode and
//! the final render back to the caller need this module at all.

use gproxy_protocol::openai::responses::{
    CreateResponseRequestBody, CreateResponseResponseBody, OutputMessage, OutputTextContent, ResponseInput, ResponseUsage,
};

use crate::canonical::{Message, Part, Request, Response, Role};

pub fn request_to_canonical(body: &CreateResponseRequestBody) -> Request {
    let mut messages = Vec::new();
    messages.push(Message::text(Role::User, body.input.as_text()));

    Request {
        system: body.instructions.clone(),
        messages,
        max_tokens: body.max_output_tokens,
        temperature: body.temperature,
        top_p: None,
        tools: Vec::new(),
        stop: Vec::new(),
        stream: body.stream.unwrap_or(false),
    }
}

pub fn request_from_canonical(request: &Request) -> CreateResponseRequestBody {
    let input_text = request
        .messages
        .iter()
        .map(Message::text_only)
        .collect::<Vec<_>>()
        .join("\n");

    CreateResponseRequestBody {
        model: String::new(),
        input: ResponseInput::Text(input_text),
        stream: Some(request.stream),
        instructions: request.system.clone(),
        max_output_tokens: request.max_tokens,
        temperature: request.temperature,
        extra: Default::default(),
    }
}

pub fn response_from_canonical(response: &Response, id: &str, created_at: i64) -> CreateResponseResponseBody {
    let text = response
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text(text) => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    CreateResponseResponseBody {
        id: id.to_string(),
        object: "response".to_string(),
        created_at,
        model: response.model.clone(),
        status: "completed".to_string(),
        output: vec![OutputMessage {
            kind: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![OutputTextContent {
                kind: "output_text".to_string(),
                text,
            }],
        }],
        usage: Some(ResponseUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        }),
    }
}
