//! Supported embedding model identifiers.

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// Sentence-embedding models the provider can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingModelId {
    /// all-MiniLM-L6-v2: 384 dimensions, fast.
    #[default]
    AllMiniLmL6V2,
    /// all-mpnet-base-v2: 768 dimensions, higher quality.
    AllMpnetBaseV2,
    /// BGE small English v1.5: 384 dimensions.
    BgeSmallEnV15,
    /// BGE base English v1.5: 768 dimensions.
    BgeBaseEnV15,
}

impl EmbeddingModelId {
    /// Every supported model.
    pub const ALL: [Self; 4] = [
        Self::AllMiniLmL6V2,
        Self::AllMpnetBaseV2,
        Self::BgeSmallEnV15,
        Self::BgeBaseEnV15,
    ];

    /// Output dimensionality.
    #[must_use]
    pub const fn dimensions(self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::BgeSmallEnV15 => 384,
            Self::AllMpnetBaseV2 | Self::BgeBaseEnV15 => 768,
        }
    }

    /// Short model name, as written in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::AllMpnetBaseV2 => "all-mpnet-base-v2",
            Self::BgeSmallEnV15 => "bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "bge-base-en-v1.5",
        }
    }

    /// Hugging Face repository of the model.
    #[must_use]
    pub const fn repository(self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::AllMpnetBaseV2 => "sentence-transformers/all-mpnet-base-v2",
            Self::BgeSmallEnV15 => "BAAI/bge-small-en-v1.5",
            Self::BgeBaseEnV15 => "BAAI/bge-base-en-v1.5",
        }
    }
}

impl fmt::Display for EmbeddingModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingModelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| {
                m.as_str().eq_ignore_ascii_case(&wanted)
                    || m.repository().eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| Error::InvalidInput(format!("unknown embedding model: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("all-MiniLM-L6-v2", EmbeddingModelId::AllMiniLmL6V2 ; "short name")]
    #[test_case("sentence-transformers/all-MiniLM-L6-v2", EmbeddingModelId::AllMiniLmL6V2 ; "repository")]
    #[test_case("ALL-MPNET-BASE-V2", EmbeddingModelId::AllMpnetBaseV2 ; "upper case")]
    #[test_case(" bge-small-en-v1.5 ", EmbeddingModelId::BgeSmallEnV15 ; "padded")]
    fn test_parse_model(input: &str, expected: EmbeddingModelId) {
        assert_eq!(input.parse::<EmbeddingModelId>().ok(), Some(expected));
    }

    #[test]
    fn test_parse_unknown_model() {
        let err = "multi-qa-distilbert-cos-v1"
            .parse::<EmbeddingModelId>()
            .expect_err("should fail");
        assert!(err.is_precondition());
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(EmbeddingModelId::default().dimensions(), 384);
        assert_eq!(EmbeddingModelId::AllMpnetBaseV2.dimensions(), 768);
        assert_eq!(EmbeddingModelId::BgeBaseEnV15.dimensions(), 768);
    }
}
