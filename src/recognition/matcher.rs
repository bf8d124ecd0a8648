//! Exhaustive nearest-neighbour matching over a set of candidates.
//!
//! Every candidate is scored against the query, optionally thresholded,
//! ordered by score (stable) and truncated to top-N.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;
use crate::recognition::similarity::{cosine_similarity, ScoreError};
use crate::recognition::vector::{EmbeddingVector, StoredEmbedding};
use crate::recognition::ImageRef;

/// Errors that can occur while matching. All are caller errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("query embedding is required")]
    MissingQuery,

    #[error("top_n must be at least 1")]
    InvalidTopN,

    #[error("min_score must be a finite number")]
    InvalidMinScore,

    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Anything that can be ranked against a query.
pub trait MatchCandidate {
    fn identity(&self) -> &str;
    fn image(&self) -> &ImageRef;
    fn embedding(&self) -> &StoredEmbedding;
}

impl<T: MatchCandidate + ?Sized> MatchCandidate for Arc<T> {
    fn identity(&self) -> &str {
        (**self).identity()
    }

    fn image(&self) -> &ImageRef {
        (**self).image()
    }

    fn embedding(&self) -> &StoredEmbedding {
        (**self).embedding()
    }
}

/// A ranked match. Derived per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub identity: String,
    pub image: ImageRef,
    pub score: f32,
}

/// Per-query knobs. `None` means "no limit" / "no threshold".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchOptions {
    pub top_n: Option<usize>,
    pub min_score: Option<f32>,
}

impl MatchOptions {
    pub fn new(top_n: Option<usize>, min_score: Option<f32>) -> Self {
        Self { top_n, min_score }
    }

    /// Fill omitted values from configuration.
    pub fn resolve(top_n: Option<usize>, min_score: Option<f32>, config: &MatchingConfig) -> Self {
        Self {
            top_n: top_n.or(Some(config.top_n)),
            min_score: min_score.or(Some(config.min_score)),
        }
    }

    fn validate(&self) -> Result<(), MatchError> {
        if self.top_n == Some(0) {
            return Err(MatchError::InvalidTopN);
        }
        if self.min_score.is_some_and(|s| !s.is_finite()) {
            return Err(MatchError::InvalidMinScore);
        }
        Ok(())
    }
}

/// Rank `entries` against `query`.
///
/// Entries without a usable embedding are skipped with a warning. An empty
/// input yields an empty result. Dimension mismatches against a parseable
/// entry are returned as errors.
pub fn find_matches<C, I>(
    query: Option<&EmbeddingVector>,
    entries: I,
    options: MatchOptions,
) -> Result<Vec<MatchResult>, MatchError>
where
    C: MatchCandidate,
    I: IntoIterator,
    I::Item: Borrow<C>,
{
    let query = query.ok_or(MatchError::MissingQuery)?;
    options.validate()?;

    let mut results = Vec::new();
    let mut skipped = 0usize;

    for entry in entries {
        let entry = entry.borrow();

        let embedding = match entry.embedding().resolve() {
            Ok(embedding) => embedding,
            Err(err) => {
                log::warn!("skipping entry for '{}': {}", entry.identity(), err);
                skipped += 1;
                continue;
            }
        };

        let score = cosine_similarity(query, &embedding)?;
        if score.is_nan() {
            log::warn!("skipping entry for '{}': score is NaN", entry.identity());
            skipped += 1;
            continue;
        }

        if let Some(min_score) = options.min_score {
            if score < min_score {
                continue;
            }
        }

        results.push(MatchResult {
            identity: entry.identity().to_string(),
            image: entry.image().clone(),
            score,
        });
    }

    if skipped > 0 {
        log::debug!("{skipped} entries without a usable embedding");
    }

    // sort_by is stable: equal scores keep their input order.
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    if let Some(top_n) = options.top_n {
        results.truncate(top_n);
    }

    Ok(results)
}
