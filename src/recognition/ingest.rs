//! Raw image bytes to embedding.
//!
//! Decodes, normalizes the pixel layout to what the extractor expects and
//! calls the extractor exactly once. Any failure yields an error and never
//! a partial embedding.

use std::sync::Arc;
use std::time::Duration;

use image::imageops::FilterType;
use image::DynamicImage;

use crate::recognition::extractor::{ExtractorError, ExtractorHandle};
use crate::recognition::vector::{EmbeddingVector, VectorError};

/// Extraction failures. Side-effect free, so callers may retry.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("extractor failed: {0}")]
    Extractor(#[from] ExtractorError),

    #[error("extractor returned an unusable embedding: {0}")]
    InvalidOutput(String),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Clone)]
pub struct IngestionAdapter {
    extractor: Arc<ExtractorHandle>,
    input_size: u32,
}

impl IngestionAdapter {
    pub fn new(extractor: Arc<ExtractorHandle>, input_size: u32) -> Self {
        Self {
            extractor,
            input_size,
        }
    }

    pub fn extractor(&self) -> &ExtractorHandle {
        &self.extractor
    }

    /// Decode `raw` and produce its embedding.
    pub fn ingest(&self, raw: &[u8]) -> Result<EmbeddingVector, IngestError> {
        let decoded = image::load_from_memory(raw)?;
        let prepared = self.prepare(decoded);

        let extractor = self.extractor.get()?;
        let output = extractor.infer(&prepared)?;

        if output.is_empty() {
            return Err(IngestError::InvalidOutput("empty vector".to_string()));
        }

        EmbeddingVector::new(output).map_err(|err| match err {
            VectorError::NonFinite { index } => {
                IngestError::InvalidOutput(format!("component {index} is not finite"))
            }
            other => IngestError::InvalidOutput(other.to_string()),
        })
    }

    /// Same as `ingest()`, run on the blocking pool and bounded by
    /// `timeout`. A timeout is reported, not retried.
    pub async fn ingest_with_timeout(
        &self,
        raw: Vec<u8>,
        timeout: Duration,
    ) -> Result<EmbeddingVector, IngestError> {
        let adapter = self.clone();
        let task = tokio::task::spawn_blocking(move || adapter.ingest(&raw));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(IngestError::Extractor(ExtractorError::Inference(format!(
                "extraction task failed: {join_err}"
            )))),
            Err(_) => {
                log::warn!("feature extraction exceeded {timeout:?}");
                Err(IngestError::Timeout(timeout))
            }
        }
    }

    /// RGB8, resized to a square of `input_size` with a bilinear filter.
    fn prepare(&self, image: DynamicImage) -> DynamicImage {
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.input_size, self.input_size, FilterType::Triangle);
        DynamicImage::ImageRgb8(resized)
    }
}
