use serde::{Deserialize, Serialize};

/// The downstream wire format family a request belongs to (§3 `apiShape`).
///
/// A tagged-variant sum, not runtime reflection — `match`es over `ApiShape`
/// are exhaustive and compile-checkable, per §9's polymorphism note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiShape {
    Chat,
    Responses,
    Messages,
    Embeddings,
    Images,
    Transcriptions,
    Gemini,
}

impl ApiShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiShape::Chat => "chat",
            ApiShape::Responses => "responses",
            ApiShape::Messages => "messages",
            ApiShape::Embeddings => "embeddings",
            ApiShape::Images => "images",
            ApiShape::Transcriptions => "transcriptions",
            ApiShape::Gemini => "gemini",
        }
    }

    /// Whether this shape has a streaming variant at all (§4.1: "`stream` is
    /// honored only where the shape supports it").
    pub fn supports_streaming(&self) -> bool {
        matches!(
            self,
            ApiShape::Chat | ApiShape::Responses | ApiShape::Messages | ApiShape::Gemini
        )
    }
}

impl std::fmt::Display for ApiShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
