//! Embedding generation.
//!
//! Embeddings come from a remote `/embeddings` endpoint. Callers treat every
//! embedder failure as "no vector": items are still saved and recall falls
//! back to lexical search.

mod http;

pub use http::HttpEmbedder;

use crate::Result;
use crate::cancel::CancelToken;
use crate::models::MemoryItem;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Identifier stored alongside each vector.
    fn model_id(&self) -> &str;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or yields an empty vector.
    fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>>;
}

/// Text embedded for an item: title and content.
#[must_use]
pub fn item_text(item: &MemoryItem) -> String {
    format!("{}\n{}", item.title, item.content)
}
