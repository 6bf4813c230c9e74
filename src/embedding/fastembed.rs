//! FastEmbed-based embedder.
//!
//! When the `fastembed-embeddings` feature is enabled, this uses real
//! ONNX-based sentence embeddings. Otherwise it falls back to deterministic
//! hash-based pseudo-embeddings with the same dimensionality.

use super::{Embedder, EmbeddingModelId};
use crate::{Error, Result};

// ============================================================================
// Native FastEmbed Implementation (with feature)
// ============================================================================

#[cfg(feature = "fastembed-embeddings")]
mod native {
    use super::{Embedder, EmbeddingModelId, Error, Result};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    /// `FastEmbed` embedder.
    ///
    /// The ONNX model is loaded on the first embed call and kept for the
    /// lifetime of the embedder.
    pub struct FastEmbedEmbedder {
        model: EmbeddingModelId,
        cache_dir: Option<PathBuf>,
        loaded: OnceLock<Mutex<fastembed::TextEmbedding>>,
    }

    impl FastEmbedEmbedder {
        /// Creates an embedder for the given model.
        #[must_use]
        pub const fn new(model: EmbeddingModelId) -> Self {
            Self {
                model,
                cache_dir: None,
                loaded: OnceLock::new(),
            }
        }

        /// Sets the directory downloaded models are cached in.
        #[must_use]
        pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
            self.cache_dir = Some(dir.into());
            self
        }

        /// Returns the model identifier.
        #[must_use]
        pub const fn model(&self) -> EmbeddingModelId {
            self.model
        }

        const fn fastembed_model(model: EmbeddingModelId) -> fastembed::EmbeddingModel {
            match model {
                EmbeddingModelId::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
                EmbeddingModelId::AllMpnetBaseV2 => fastembed::EmbeddingModel::AllMpnetBaseV2,
                EmbeddingModelId::BgeSmallEnV15 => fastembed::EmbeddingModel::BGESmallENV15,
                EmbeddingModelId::BgeBaseEnV15 => fastembed::EmbeddingModel::BGEBaseENV15,
            }
        }

        /// Gets or loads the model.
        ///
        /// The first call blocks while the ONNX model is downloaded (if not
        /// cached) and loaded. Subsequent calls return the loaded instance.
        fn get_model(&self) -> Result<&Mutex<fastembed::TextEmbedding>> {
            if let Some(model) = self.loaded.get() {
                return Ok(model);
            }

            tracing::info!(model = %self.model, "Loading embedding model (first use)...");
            let start = Instant::now();

            let mut options = fastembed::InitOptions::new(Self::fastembed_model(self.model))
                .with_show_download_progress(false);
            if let Some(dir) = &self.cache_dir {
                options = options.with_cache_dir(dir.clone());
            }

            let model =
                fastembed::TextEmbedding::try_new(options).map_err(|e| Error::OperationFailed {
                    operation: "load_embedding_model".to_string(),
                    cause: e.to_string(),
                })?;

            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                model = %self.model,
                "Embedding model loaded successfully"
            );

            // Another thread may have won the race; either instance is fine.
            let _ = self.loaded.set(Mutex::new(model));
            self.loaded.get().ok_or_else(|| Error::OperationFailed {
                operation: "get_embedding_model".to_string(),
                cause: "Model initialization race condition".to_string(),
            })
        }

        fn run(&self, operation: &str, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let model = self.get_model()?;
            let mut guard = model.lock().map_err(|e| Error::OperationFailed {
                operation: "lock_embedding_model".to_string(),
                cause: e.to_string(),
            })?;
            let batch_size = texts.len();

            // ONNX runtime can panic on malformed inputs or internal errors.
            let result = catch_unwind(AssertUnwindSafe(|| guard.embed(texts, None)));

            result
                .map_err(|panic_info| {
                    let panic_msg = panic_info
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic_info.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        panic_message = %panic_msg,
                        batch_size,
                        "ONNX runtime panicked during embedding"
                    );
                    Error::OperationFailed {
                        operation: operation.to_string(),
                        cause: format!("ONNX runtime panic: {panic_msg}"),
                    }
                })?
                .map_err(|e| Error::OperationFailed {
                    operation: operation.to_string(),
                    cause: e.to_string(),
                })
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new(EmbeddingModelId::default())
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            self.model.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.is_empty() {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }

            self.run("embed", vec![text.to_string()])?
                .into_iter()
                .next()
                .ok_or_else(|| Error::OperationFailed {
                    operation: "embed".to_string(),
                    cause: "No embedding returned from model".to_string(),
                })
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            if texts.iter().any(|t| t.is_empty()) {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }

            let owned: Vec<String> = texts.iter().map(|s| (*s).to_string()).collect();
            self.run("embed_batch", owned)
        }
    }
}

// ============================================================================
// Fallback Implementation (without feature)
// ============================================================================

#[cfg(not(feature = "fastembed-embeddings"))]
mod fallback {
    use super::{Embedder, EmbeddingModelId, Error, Result};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::path::PathBuf;

    /// `FastEmbed` embedder using hash-based pseudo-embeddings.
    ///
    /// Generates deterministic vectors from word hashes. Texts sharing words
    /// score closer than unrelated texts, but there is no semantic model
    /// behind it. Enable the `fastembed-embeddings` feature for real
    /// embeddings.
    pub struct FastEmbedEmbedder {
        model: EmbeddingModelId,
    }

    impl FastEmbedEmbedder {
        /// Creates an embedder producing vectors of the model's dimensionality.
        #[must_use]
        pub const fn new(model: EmbeddingModelId) -> Self {
            Self { model }
        }

        /// Accepted for API parity; nothing is downloaded.
        #[must_use]
        pub fn with_cache_dir(self, _dir: impl Into<PathBuf>) -> Self {
            self
        }

        /// Returns the model identifier.
        #[must_use]
        pub const fn model(&self) -> EmbeddingModelId {
            self.model
        }

        fn pseudo_embed(&self, text: &str) -> Vec<f32> {
            // Bound the work on very long texts.
            const MAX_WORDS: usize = 1000;
            let dimensions = self.model.dimensions();
            let mut embedding = vec![0.0f32; dimensions];

            // Words are position-independent so shared vocabulary scores close.
            for word in text.split_whitespace().take(MAX_WORDS) {
                let mut hasher = DefaultHasher::new();
                word.to_lowercase().hash(&mut hasher);
                Self::distribute_hash(&mut embedding, hasher.finish(), dimensions);
            }

            Self::normalize_embedding(&mut embedding);
            embedding
        }

        fn distribute_hash(embedding: &mut [f32], hash: u64, dimensions: usize) {
            for j in 0..8 {
                let idx = (hash >> (j * 8)) as usize % dimensions;
                let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
                embedding[idx] += value;
            }
        }

        fn normalize_embedding(embedding: &mut [f32]) {
            let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
            if norm_sq <= 0.0 {
                return;
            }
            let inv_norm = norm_sq.sqrt().recip();
            for v in embedding.iter_mut() {
                *v *= inv_norm;
            }
        }
    }

    impl Default for FastEmbedEmbedder {
        fn default() -> Self {
            Self::new(EmbeddingModelId::default())
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn dimensions(&self) -> usize {
            self.model.dimensions()
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(Error::InvalidInput("Cannot embed empty text".to_string()));
            }

            tracing::debug!(
                "Using pseudo-embedding fallback (fastembed-embeddings feature not enabled)"
            );
            Ok(self.pseudo_embed(text))
        }
    }
}

// ============================================================================
// Public Re-exports
// ============================================================================

#[cfg(feature = "fastembed-embeddings")]
pub use native::FastEmbedEmbedder;

#[cfg(not(feature = "fastembed-embeddings"))]
pub use fallback::FastEmbedEmbedder;

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or 0.0 if the vectors differ in length,
/// are empty, or either has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
