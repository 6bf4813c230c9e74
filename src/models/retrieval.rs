//! Similarity retrieval types.

use super::Record;
use crate::config::{DEFAULT_CERTAINTY_THRESHOLD, DEFAULT_K_RETRIEVALS};
use serde::Serialize;
use std::ops::Deref;

/// What to search with.
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    /// Free text, embedded with the loaded embedder.
    Text(&'a str),
    /// A caller-supplied query vector.
    Vector(&'a [f32]),
}

/// Result-count cap and certainty floor for a retrieval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    /// Maximum number of hits.
    pub limit: usize,
    /// Minimum certainty (0.0 to 1.0) a hit must reach.
    pub certainty_floor: f32,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_K_RETRIEVALS,
            certainty_floor: DEFAULT_CERTAINTY_THRESHOLD,
        }
    }
}

impl RetrievalOptions {
    /// Creates options with the default limit and floor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the certainty floor.
    #[must_use]
    pub const fn with_certainty_floor(mut self, floor: f32) -> Self {
        self.certainty_floor = floor;
        self
    }
}

/// One retrieved record with its certainty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    /// Normalized similarity in `[0, 1]`.
    pub certainty: f32,
    /// The matching record.
    pub record: Record,
}

/// A non-empty, engine-ordered sequence of hits.
///
/// "No result" is `Option::<Hits>::None`; a `Hits` value always holds at
/// least one hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Hits(Vec<RetrievalHit>);

impl Hits {
    /// Wraps hits, returning `None` for an empty vector.
    #[must_use]
    pub fn from_vec(hits: Vec<RetrievalHit>) -> Option<Self> {
        if hits.is_empty() {
            None
        } else {
            Some(Self(hits))
        }
    }

    /// Returns the best hit.
    #[must_use]
    pub fn best(&self) -> &RetrievalHit {
        // Non-empty by construction.
        &self.0[0]
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_vec(self) -> Vec<RetrievalHit> {
        self.0
    }
}

impl Deref for Hits {
    type Target = [RetrievalHit];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for Hits {
    type Item = RetrievalHit;
    type IntoIter = std::vec::IntoIter<RetrievalHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Hits {
    type Item = &'a RetrievalHit;
    type IntoIter = std::slice::Iter<'a, RetrievalHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Properties, RecordId};

    fn hit(id: &str, certainty: f32) -> RetrievalHit {
        RetrievalHit {
            certainty,
            record: Record::new(RecordId::new(id), Properties::new()),
        }
    }

    #[test]
    fn test_empty_hits_are_absent() {
        assert!(Hits::from_vec(Vec::new()).is_none());
    }

    #[test]
    fn test_hits_preserve_order() {
        let hits = Hits::from_vec(vec![hit("a", 0.9), hit("b", 0.7)]).expect("non-empty");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits.best().record.uuid.as_str(), "a");
        let ids: Vec<_> = hits.iter().map(|h| h.record.uuid.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_default_options() {
        let options = RetrievalOptions::default();
        assert_eq!(options.limit, 3);
        assert!((options.certainty_floor - 0.5).abs() < f32::EPSILON);

        let options = options.with_limit(1).with_certainty_floor(0.9);
        assert_eq!(options.limit, 1);
        assert!((options.certainty_floor - 0.9).abs() < f32::EPSILON);
    }
}
