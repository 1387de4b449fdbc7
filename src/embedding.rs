use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Embedding = Vec<f32>;

#[derive(Serialize, Debug)]
pub(crate) struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
}

#[derive(Deserialize, Debug)]
pub(crate) struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Embedding,
}

impl EmbeddingResponse {
    pub fn into_first(self) -> Result<Embedding> {
        self.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| Error::Other("response contained no embeddings".to_string()))
    }
}
