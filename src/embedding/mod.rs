//! Embedding generation.
//!
//! Maps text to fixed-dimensional vectors. The model is loaded once per
//! embedder and reused for every call; failures are returned, never replaced
//! by a default vector.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]
// Allow cast possible truncation for hash index calculations on 32-bit platforms.
#![allow(clippy::cast_possible_truncation)]

mod fastembed;
mod models;

pub use fastembed::{FastEmbedEmbedder, cosine_similarity};
pub use models::EmbeddingModelId;

use crate::Result;

/// Embedding dimensions of the default model (all-MiniLM-L6-v2).
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty or the model fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
