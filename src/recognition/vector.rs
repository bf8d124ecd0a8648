//! Embedding vectors and their persisted form.
//!
//! Embeddings are stored as a textual JSON array so the catalog documents
//! stay human readable. Parsing happens at load time; entries whose text
//! cannot be parsed are kept verbatim and excluded at query time.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Errors that can occur while building or parsing an embedding.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("embedding component {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("embedding is not a numeric array: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("embedding is missing")]
    Missing,

    #[error("embedding has {got} dimensions, its group uses {expected}")]
    WrongDimensions { expected: usize, got: usize },
}

/// Immutable fixed-length feature vector produced by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Arc<[f32]>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Result<Self, VectorError> {
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite { index });
        }
        Ok(Self(values.into()))
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Serialize as a JSON array, e.g. `[0.25,-1.0,3.5]`.
    pub fn to_text(&self) -> String {
        // Finite f32 slices always serialize.
        serde_json::to_string(&*self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_text(text: &str) -> Result<Self, VectorError> {
        let values: Vec<f32> = serde_json::from_str(text)?;
        Self::new(values)
    }
}

impl Deref for EmbeddingVector {
    type Target = [f32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for EmbeddingVector {
    type Error = VectorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::new(values).map_err(serde::de::Error::custom)
    }
}

/// Embedding as attached to a catalog entry or a candidate supplied by a
/// caller. Only `Vector` takes part in matching.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEmbedding {
    Vector(EmbeddingVector),
    Unparsed(String),
    Missing,
    /// Parsed, but its length disagrees with the rest of its group.
    /// Persisted unchanged, excluded from matching.
    Mismatched {
        vector: EmbeddingVector,
        expected: usize,
    },
}

impl StoredEmbedding {
    pub fn from_text(text: &str) -> Self {
        match EmbeddingVector::from_text(text) {
            Ok(vector) => Self::Vector(vector),
            Err(_) => Self::Unparsed(text.to_string()),
        }
    }

    /// Accepts the textual encoding, a bare numeric array, or null.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::String(text) => Self::from_text(&text),
            Value::Array(_) => {
                let raw = value.to_string();
                serde_json::from_value::<Vec<f32>>(value)
                    .map_err(VectorError::from)
                    .and_then(EmbeddingVector::new)
                    .map(Self::Vector)
                    .unwrap_or(Self::Unparsed(raw))
            }
            other => Self::Unparsed(other.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Vector(vector) | Self::Mismatched { vector, .. } => {
                Value::String(vector.to_text())
            }
            Self::Unparsed(raw) => Value::String(raw.clone()),
            Self::Missing => Value::Null,
        }
    }

    pub fn resolve(&self) -> Result<EmbeddingVector, VectorError> {
        match self {
            Self::Vector(vector) => Ok(vector.clone()),
            Self::Unparsed(raw) => EmbeddingVector::from_text(raw),
            Self::Missing => Err(VectorError::Missing),
            Self::Mismatched { vector, expected } => Err(VectorError::WrongDimensions {
                expected: *expected,
                got: vector.dimensions(),
            }),
        }
    }

    /// Length of the parsed vector, whether or not it is usable.
    pub fn dimensions(&self) -> Option<usize> {
        match self {
            Self::Vector(vector) | Self::Mismatched { vector, .. } => Some(vector.dimensions()),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Vector(_))
    }
}

impl Default for StoredEmbedding {
    fn default() -> Self {
        Self::Missing
    }
}

impl From<EmbeddingVector> for StoredEmbedding {
    fn from(vector: EmbeddingVector) -> Self {
        Self::Vector(vector)
    }
}

impl Serialize for StoredEmbedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StoredEmbedding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trip_is_exact() {
        let values = vec![0.1, -2.5, 3.333_333_3, 1e-7, 123456.79, 0.0, -0.0];
        let vector = EmbeddingVector::new(values.clone()).unwrap();

        let parsed = EmbeddingVector::from_text(&vector.to_text()).unwrap();
        assert_eq!(parsed.as_slice(), values.as_slice());
        for (a, b) in parsed.iter().zip(values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let result = EmbeddingVector::new(vec![1.0, f32::NAN]);
        assert!(matches!(result, Err(VectorError::NonFinite { index: 1 })));

        let result = EmbeddingVector::new(vec![f32::INFINITY]);
        assert!(matches!(result, Err(VectorError::NonFinite { index: 0 })));
    }

    #[test]
    fn test_from_text_garbage() {
        assert!(matches!(
            EmbeddingVector::from_text("not json"),
            Err(VectorError::Parse(_))
        ));
        assert!(EmbeddingVector::from_text("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_stored_from_value_variants() {
        assert_eq!(StoredEmbedding::from_value(Value::Null), StoredEmbedding::Missing);

        let text = StoredEmbedding::from_value(Value::String("[1.0,2.0]".into()));
        assert!(text.is_valid());

        let array = StoredEmbedding::from_value(serde_json::json!([1.0, 2.0]));
        assert_eq!(array, text);

        let broken = StoredEmbedding::from_value(Value::String("[1.0,".into()));
        assert_eq!(broken, StoredEmbedding::Unparsed("[1.0,".into()));
        assert!(broken.resolve().is_err());

        let number = StoredEmbedding::from_value(serde_json::json!(42));
        assert!(matches!(number, StoredEmbedding::Unparsed(_)));
    }

    #[test]
    fn test_stored_serializes_as_text() {
        let stored = StoredEmbedding::from(EmbeddingVector::new(vec![0.5, 1.5]).unwrap());
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json, Value::String("[0.5,1.5]".into()));

        let back: StoredEmbedding = serde_json::from_value(json).unwrap();
        assert_eq!(back, stored);
        assert_eq!(
            serde_json::to_value(StoredEmbedding::Missing).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_mismatched_is_kept_but_unusable() {
        let vector = EmbeddingVector::new(vec![1.0, 2.0, 3.0]).unwrap();
        let stored = StoredEmbedding::Mismatched {
            vector: vector.clone(),
            expected: 2,
        };

        assert!(!stored.is_valid());
        assert_eq!(stored.dimensions(), Some(3));
        assert!(matches!(
            stored.resolve(),
            Err(VectorError::WrongDimensions { expected: 2, got: 3 })
        ));
        assert_eq!(stored.to_value(), Value::String(vector.to_text()));
    }
}
