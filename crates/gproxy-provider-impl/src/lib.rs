//! Built-in upstream Provider Adapters: OpenAI, Anthropic, and Gemini, each
//! implementing `gproxy_provider_core::Provider` over `reqwest` (§4.6). This
//! crate performs the only network IO in the gateway.

mod claude;
mod gemini;
mod http_support;
mod openai;
mod registry;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use openai::{OpenAiProvider, TRANSCRIPTION_FILE_BASE64_KEY, TRANSCRIPTION_FILE_CONTENT_TYPE_KEY, TRANSCRIPTION_FILE_NAME_KEY};
pub use registry::{ProviderConfig, ProviderKind, ProviderRegistry};
