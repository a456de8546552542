use serde::{Deserialize, Serialize};

/// Transcription requests arrive as `multipart/form-data`; the Decoder
/// extracts the fields it needs into this shape before dispatch. The raw
/// audio bytes travel alongside as part of the decoder's normalized request,
/// not through this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTranscriptionRequestBody {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTranscriptionResponseBody {
    pub text: String,
}
