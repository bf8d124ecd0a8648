use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::{
    recognition::{DEFAULT_MIN_SCORE, DEFAULT_MODEL, DEFAULT_TOP_N},
    storage::{self, StorageManager},
};

const CONFIG_FILE: &str = "config.yaml";

/// Default square side the extractor input is resized to
const DEFAULT_INPUT_SIZE: u32 = 224;
/// Default per-image extraction timeout in seconds
const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 30;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default bound for stored image width/height
const DEFAULT_IMAGE_MAX_DIMENSION: u32 = 800;
/// Default WebP quality for stored images
const DEFAULT_IMAGE_QUALITY: u8 = 85;
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Ranking defaults applied when a request does not specify them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum number of matches returned
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Minimum cosine similarity for a match to be reported [-1.0, 1.0]
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

/// Configuration for the feature extraction model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Model name (e.g., "clip-vit-b32")
    #[serde(default = "default_model")]
    pub model: String,

    /// Images are resized to input_size x input_size before inference
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Timeout for a single extraction in seconds
    #[serde(default = "default_extract_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            timeout_secs: DEFAULT_EXTRACT_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

/// How uploaded photos are stored
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_image_max_dimension")]
    pub max_dimension: u32,

    /// WebP quality (1-100)
    #[serde(default = "default_image_quality")]
    pub quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_IMAGE_MAX_DIMENSION,
            quality: DEFAULT_IMAGE_QUALITY,
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_min_score() -> f32 {
    DEFAULT_MIN_SCORE
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

fn default_extract_timeout_secs() -> u64 {
    DEFAULT_EXTRACT_TIMEOUT_SECS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_image_max_dimension() -> u32 {
    DEFAULT_IMAGE_MAX_DIMENSION
}

fn default_image_quality() -> u8 {
    DEFAULT_IMAGE_QUALITY
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            matching: MatchingConfig::default(),
            extractor: ExtractorConfig::default(),
            images: ImagesConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

/// Data directory: `CARAPACE_BASE_PATH` or `~/.local/share/carapace`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CARAPACE_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .context("couldnt find home dir")?
        .context("couldnt find home dir")?;
    Ok(home.join(".local/share/carapace"))
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        let matching = &self.matching;
        if matching.top_n == 0 {
            bail!("matching.top_n must be at least 1");
        }
        if !(-1.0..=1.0).contains(&matching.min_score) {
            bail!(
                "matching.min_score must be between -1.0 and 1.0, got {}",
                matching.min_score
            );
        }

        let extractor = &self.extractor;
        if extractor.model.trim().is_empty() {
            bail!("extractor.model must not be empty");
        }
        if extractor.input_size == 0 {
            bail!("extractor.input_size must be greater than 0");
        }
        if extractor.timeout_secs == 0 {
            bail!("extractor.timeout_secs must be greater than 0");
        }
        if extractor.download_timeout_secs == 0 {
            bail!("extractor.download_timeout_secs must be greater than 0");
        }

        let images = &self.images;
        if images.max_dimension == 0 {
            bail!("images.max_dimension must be greater than 0");
        }
        if !(1..=100).contains(&images.quality) {
            bail!("images.quality must be between 1 and 100, got {}", images.quality);
        }

        Ok(())
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&base_path()?)
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn extract_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.extractor.timeout_secs)
    }

    /// Extra allowance for the first extraction, which may download the model.
    pub fn download_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.extractor.download_timeout_secs)
    }
}
