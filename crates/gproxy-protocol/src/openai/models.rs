use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListModelsResponseBody {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone)]
pub struct GetModelRequest {
    pub model: String,
}
