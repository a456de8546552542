/// A vendor-agnostic streaming delta, the currency between a Provider
/// Adapter's `executeStreaming` (§4.6 step 4) and the Streaming Bridge
/// (§4.7), which renders it into whichever `apiShape` the *caller*
/// requested — independent of which vendor actually served the attempt.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    TextDelta(String),
    ToolUseStart {
        index: u32,
        id: String,
        name: String,
    },
    ToolUseDelta {
        index: u32,
        partial_json: String,
    },
    Done {
        finish_reason: Option<String>,
        usage: Option<ChunkUsage>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
