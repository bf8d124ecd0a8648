//! Image feature extraction.
//!
//! Provides:
//! - The `FeatureExtractor` seam the ingestion adapter calls
//! - A fastembed-backed image embedding model
//! - `ExtractorHandle`, which loads the model lazily, exactly once, and
//!   shares it read-only afterwards

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use fastembed::{ImageEmbedding, ImageInitOptions};
use image::{DynamicImage, ImageFormat};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::config::ExtractorConfig;

/// Error type for extractor operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractorError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Turns a decoded image into a fixed-length feature vector.
///
/// Implementations hold no per-call state: concurrent calls are
/// independent.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractorError>;
}

/// Wrapper around fastembed's ImageEmbedding model.
/// Uses a Mutex because fastembed's embed methods require &mut self.
pub struct FastembedExtractor {
    model: Mutex<ImageEmbedding>,
    model_name: String,
}

impl FastembedExtractor {
    /// Load `model_name`, downloading it into `cache_dir/models` on first
    /// use.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, ExtractorError> {
        let model_enum = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            ExtractorError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = ImageInitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let model = ImageEmbedding::try_new(options)
            .map_err(|e| ExtractorError::InitFailed(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// Parse model name string to fastembed enum.
    fn parse_model_name(name: &str) -> Result<fastembed::ImageEmbeddingModel, ExtractorError> {
        match name.to_lowercase().as_str() {
            "clip-vit-b32" | "clipvitb32" => Ok(fastembed::ImageEmbeddingModel::ClipVitB32),
            "resnet50" => Ok(fastembed::ImageEmbeddingModel::Resnet50),
            "unicom-vit-b16" | "unicomvitb16" => Ok(fastembed::ImageEmbeddingModel::UnicomVitB16),
            "unicom-vit-b32" | "unicomvitb32" => Ok(fastembed::ImageEmbeddingModel::UnicomVitB32),
            "nomic-embed-vision-v1.5" | "nomicembedvisionv15" => {
                Ok(fastembed::ImageEmbeddingModel::NomicEmbedVisionV15)
            }
            _ => Err(ExtractorError::InvalidModel(format!(
                "Unknown model: {}. Supported models: clip-vit-b32, resnet50, unicom-vit-b16, unicom-vit-b32, nomic-embed-vision-v1.5",
                name
            ))),
        }
    }
}

impl FeatureExtractor for FastembedExtractor {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn infer(&self, image: &DynamicImage) -> Result<Vec<f32>, ExtractorError> {
        // fastembed does its own decoding, hand it a lossless encoding of
        // the already decoded pixels.
        let mut encoded = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|e| ExtractorError::Inference(format!("Failed to encode input: {}", e)))?;

        let mut model = self.model.lock().map_err(|e| {
            ExtractorError::Inference(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed_bytes(&[encoded.as_slice()], None)
            .map_err(|e| ExtractorError::Inference(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ExtractorError::Inference("No embedding returned".to_string()))
    }
}

type InitFn = dyn Fn() -> Result<Arc<dyn FeatureExtractor>, ExtractorError> + Send + Sync;

/// Owned, lazily-initialized extractor.
///
/// The first `get()` runs the initializer; concurrent callers block on it.
/// A failed initialization is not cached, the next call retries.
pub struct ExtractorHandle {
    model_name: String,
    init: Box<InitFn>,
    cell: OnceCell<Arc<dyn FeatureExtractor>>,
}

impl ExtractorHandle {
    /// Handle that loads the configured fastembed model on first use.
    pub fn fastembed(config: &ExtractorConfig, base_path: PathBuf) -> Self {
        let model_name = config.model.clone();
        Self::lazy(&config.model, move || {
            log::info!("Loading image embedding model '{}'", model_name);
            let extractor = FastembedExtractor::new(&model_name, base_path.clone())?;
            Ok(Arc::new(extractor) as Arc<dyn FeatureExtractor>)
        })
    }

    pub fn lazy<F>(model_name: &str, init: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn FeatureExtractor>, ExtractorError> + Send + Sync + 'static,
    {
        Self {
            model_name: model_name.to_string(),
            init: Box::new(init),
            cell: OnceCell::new(),
        }
    }

    /// Handle around an extractor that is already loaded.
    pub fn preloaded(extractor: Arc<dyn FeatureExtractor>) -> Self {
        let cell = OnceCell::new();
        let model_name = extractor.name().to_string();
        let _ = cell.set(extractor);
        Self {
            model_name,
            init: Box::new(|| Err(ExtractorError::InitFailed("already initialized".to_string()))),
            cell,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> Result<&Arc<dyn FeatureExtractor>, ExtractorError> {
        self.cell.get_or_try_init(|| (self.init)())
    }

    /// Hex SHA-256 of the model name, recorded on groups so embeddings
    /// from different models are never mixed silently.
    pub fn model_fingerprint(&self) -> String {
        model_fingerprint(&self.model_name)
    }
}

pub fn model_fingerprint(model_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_name.to_lowercase().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
