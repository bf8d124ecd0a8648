//! Photo identification by embedding similarity.
//!
//! # Architecture
//!
//! - `vector`: Embedding vectors and their textual persisted form
//! - `similarity`: Cosine similarity
//! - `matcher`: Ranking, thresholding and top-N over candidates
//! - `catalog`: Per-group `{identity -> {slot -> entry}}` store
//! - `persist`: JSON documents backing the catalog
//! - `extractor`: Feature extraction model and its lazy handle
//! - `ingest`: Raw image bytes to embedding

pub mod catalog;
pub mod extractor;
pub mod ingest;
pub mod matcher;
mod persist;
pub mod similarity;
pub mod vector;

pub use catalog::{Catalog, CatalogEntry, CatalogError, GroupSummary, ImageRef, Slot};
pub use extractor::{ExtractorError, ExtractorHandle, FeatureExtractor};
pub use ingest::{IngestError, IngestionAdapter};
pub use matcher::{find_matches, MatchCandidate, MatchError, MatchOptions, MatchResult};
pub use similarity::{cosine_similarity, ScoreError};
pub use vector::{EmbeddingVector, StoredEmbedding, VectorError};

/// Default extractor model.
pub const DEFAULT_MODEL: &str = "clip-vit-b32";

/// Default minimum similarity for a match to be reported.
pub const DEFAULT_MIN_SCORE: f32 = 0.7;

/// Default number of matches returned.
pub const DEFAULT_TOP_N: usize = 5;
