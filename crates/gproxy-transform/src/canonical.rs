//! Canonical intermediate representation the three "generate content" wire
//! shapes (OpenAI chat, Anthropic messages, Gemini generateContent) convert
//! through, per SPEC_FULL.md's "Streaming transform coverage" supplement:
//! a hub-and-spoke transform instead of a pairwise N×N module tree. Each
//! vendor module (`openai`, `claude`, `gemini`) only has to know how to
//! convert to and from this shape, not to and from every other vendor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use gproxy_provider_core::{ChunkUsage, StreamChunk as ChunkEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tagged content fragment, deliberately named after the spec's GLOSSARY
/// "Part" even though this is request/response content rather than an A2A
/// message part — the shape the fields take is the same kind of thing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    Image { url: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: Value, is_error: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn text_only(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// The canonical form of a "generate content" request. The Dispatcher
/// decodes the caller's own wire shape into this form once (via the inbound
/// `apiShape`'s `request_to_canonical`), then re-renders it into whichever
/// vendor shape the selected Candidate needs (§4.6 step 2 "Request
/// translation") — so it never has to know every `(callerShape,
/// vendorShape)` pair directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub tools: Vec<Tool>,
    pub stop: Vec<String>,
    pub stream: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The canonical form of a vendor's response. A `Provider::execute`
/// implementation serializes one of these as `NormalizedResponse::content`
/// (§4.6 step 3 "Response normalization"); the Dispatcher/handler then
/// renders it into the caller's own `apiShape` with
/// `<callerShape>::response_from_canonical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub model: String,
    pub parts: Vec<Part>,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl From<Usage> for ChunkUsage {
    fn from(usage: Usage) -> Self {
        ChunkUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

impl From<ChunkUsage> for Usage {
    fn from(usage: ChunkUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}
