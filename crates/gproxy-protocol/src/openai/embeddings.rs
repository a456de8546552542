use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmbeddingsRequestBody {
    pub model: String,
    pub input: EmbeddingsInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct CreateEmbeddingsRequest {
    pub body: CreateEmbeddingsRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingObject {
    pub object: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsUsage {
    pub prompt_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmbeddingsResponseBody {
    pub object: String,
    pub model: String,
    pub data: Vec<EmbeddingObject>,
    pub usage: EmbeddingsUsage,
}

impl EmbeddingsInput {
    pub fn len(&self) -> usize {
        match self {
            EmbeddingsInput::One(_) => 1,
            EmbeddingsInput::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
