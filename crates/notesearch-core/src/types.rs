//! Domain types shared by the chunker, the vector index and the service layer.

use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// A chunk of a source document that is independently embedded.
///
/// - `id`: `<source>#chunk<n>`, where `n` counts chunks within one file only
/// - `source`: path of the file the chunk was read from
/// - `text`: the (overlap-widened) chunk payload, never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
}

impl Chunk {
    pub fn new(source: &str, index: usize, text: String) -> Self {
        Self { id: chunk_id(source, index), source: source.to_string(), text }
    }
}

pub fn chunk_id(source: &str, index: usize) -> ChunkId {
    format!("{source}#chunk{index}")
}

/// Metadata stored next to each vector; position `i` in the vector store
/// belongs to entry `i` here. Same shape as [`Chunk`].
pub type ChunkMeta = Chunk;

/// One search hit. `score` is the inner product between the query and the
/// stored vector; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub position: usize,
    pub meta: ChunkMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_uses_source_and_local_index() {
        let c = Chunk::new("notes/a.md", 3, "body".to_string());
        assert_eq!(c.id, "notes/a.md#chunk3");
        assert_eq!(c.source, "notes/a.md");
    }

    #[test]
    fn chunk_serializes_as_flat_record() {
        let c = Chunk::new("a.txt", 0, "hello".to_string());
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v, serde_json::json!({"id": "a.txt#chunk0", "source": "a.txt", "text": "hello"}));
    }
}
