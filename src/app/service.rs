//! Recognition service: ties the catalog, the ingestion adapter, stored
//! photos and configuration together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    eid::Eid,
    images,
    recognition::{
        catalog::validate_name, find_matches, Catalog, CatalogEntry, EmbeddingVector,
        ExtractorHandle, GroupSummary, ImageRef, IngestionAdapter, MatchCandidate,
        MatchOptions, MatchResult, Slot, StoredEmbedding,
    },
    storage::{BackendLocal, StorageManager},
};

use super::errors::AppError;

/// A caller-supplied candidate, matched without touching the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    #[serde(alias = "id")]
    pub identity: String,
    pub image: ImageRef,
    #[serde(default)]
    pub embedding: StoredEmbedding,
}

impl MatchCandidate for Candidate {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn image(&self) -> &ImageRef {
        &self.image
    }

    fn embedding(&self) -> &StoredEmbedding {
        &self.embedding
    }
}

/// Catalog entry as shown to users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub identity: String,
    pub slot: Slot,
    pub image: ImageRef,
    pub uploaded_at: DateTime<Utc>,
    pub has_embedding: bool,
    pub dimensions: Option<usize>,
}

impl From<&CatalogEntry> for EntryView {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            identity: entry.identity.clone(),
            slot: entry.slot,
            image: entry.image.clone(),
            uploaded_at: entry.created_at,
            has_embedding: entry.embedding.is_valid(),
            dimensions: entry.embedding.dimensions(),
        }
    }
}

pub struct RecognitionService {
    catalog: Catalog,
    adapter: IngestionAdapter,
    images: Arc<dyn StorageManager>,
    config: Config,
}

impl RecognitionService {
    pub fn new(
        catalog: Catalog,
        adapter: IngestionAdapter,
        images: Arc<dyn StorageManager>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            adapter,
            images,
            config,
        }
    }

    /// Open the service on the data directory of `config`.
    ///
    /// The extraction model is not loaded here, only on first use.
    pub fn open(config: Config) -> Result<Self, AppError> {
        let base_path = config.base_path().to_path_buf();

        let catalog_store = Arc::new(BackendLocal::new(base_path.join("catalog"))?);
        let catalog = Catalog::open(catalog_store)?;
        let images = Arc::new(BackendLocal::new(base_path.join("images"))?);

        let extractor = Arc::new(ExtractorHandle::fastembed(&config.extractor, base_path));
        let adapter = IngestionAdapter::new(extractor, config.extractor.input_size);

        let service = Self::new(catalog, adapter, images, config);
        service.check_models();
        Ok(service)
    }

    fn check_models(&self) {
        let fingerprint = self.adapter.extractor().model_fingerprint();
        for group in self.catalog.groups() {
            match &group.model {
                Some(model) if model != &fingerprint => log::warn!(
                    "group '{}' was built with a different model than '{}', scores will be meaningless",
                    group.name,
                    self.adapter.extractor().model_name()
                ),
                _ => {}
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Options for one query, falling back to the configured defaults.
    pub fn match_options(&self, top_n: Option<usize>, min_score: Option<f32>) -> MatchOptions {
        MatchOptions::resolve(top_n, min_score, &self.config.matching)
    }

    pub fn create_group(&self, name: &str, owner: &str) -> Result<GroupSummary, AppError> {
        let model = self.adapter.extractor().model_fingerprint();
        Ok(self.catalog.create_group(name, owner, Some(model))?)
    }

    pub fn groups(&self) -> Vec<GroupSummary> {
        self.catalog.groups()
    }

    pub fn entries(&self, group: &str) -> Result<Vec<Arc<CatalogEntry>>, AppError> {
        Ok(self.catalog.list_entries(group)?)
    }

    /// Extract the embedding of `raw`, bounded by `extractor.timeout_secs`
    /// (plus `extractor.download_timeout_secs` until the model is loaded).
    pub async fn embed(&self, raw: Vec<u8>) -> Result<EmbeddingVector, AppError> {
        let mut timeout = self.config.extract_timeout();
        if !self.adapter.extractor().is_initialized() {
            timeout += self.config.download_timeout();
        }
        Ok(self.adapter.ingest_with_timeout(raw, timeout).await?)
    }

    /// Extract the embedding of `raw` and store it as a new slot of
    /// `identity`.
    ///
    /// Must run on a multi-threaded runtime.
    pub async fn register(
        &self,
        group: &str,
        identity: &str,
        raw: Vec<u8>,
    ) -> Result<Arc<CatalogEntry>, AppError> {
        self.check_target(group, identity)?;
        let embedding = self.embed(raw.clone()).await?;
        tokio::task::block_in_place(|| self.commit(group, identity, &raw, embedding))
    }

    // Fail before spending time on extraction.
    fn check_target(&self, group: &str, identity: &str) -> Result<(), AppError> {
        self.catalog.group_summary(group)?;
        validate_name("identity", identity)?;
        Ok(())
    }

    /// Store the photo, then the entry. The photo is removed again if the
    /// entry cannot be committed.
    fn commit(
        &self,
        group: &str,
        identity: &str,
        raw: &[u8],
        embedding: EmbeddingVector,
    ) -> Result<Arc<CatalogEntry>, AppError> {
        let data = images::prepare_for_storage(raw, &self.config.images)?;
        let key = format!("{group}/{identity}/{}.webp", Eid::new());
        self.images.write(&key, &data)?;

        match self
            .catalog
            .add_entry(group, identity, ImageRef::from(key.as_str()), embedding)
        {
            Ok(entry) => {
                log::info!("registered {identity}#{} in '{group}'", entry.slot);
                Ok(entry)
            }
            Err(err) => {
                if let Err(cleanup) = self.images.delete(&key) {
                    log::warn!("failed to remove orphaned photo {key}: {cleanup}");
                }
                Err(err.into())
            }
        }
    }

    /// Delete one slot and its stored photo.
    pub fn remove(
        &self,
        group: &str,
        identity: &str,
        slot: Slot,
    ) -> Result<Arc<CatalogEntry>, AppError> {
        let removed = self.catalog.remove_entry(group, identity, slot)?;

        if let Err(err) = self.images.delete(removed.image.as_str()) {
            log::warn!("failed to remove photo {}: {err}", removed.image);
        }

        Ok(removed)
    }

    pub fn match_group(
        &self,
        query: Option<&EmbeddingVector>,
        group: &str,
        options: MatchOptions,
    ) -> Result<Vec<MatchResult>, AppError> {
        let query = query.ok_or_else(|| AppError::InvalidInput("query embedding is required".into()))?;
        let entries = self.catalog.list_entries(group)?;
        Ok(find_matches::<Arc<CatalogEntry>, _>(Some(query), &entries, options)?)
    }

    pub fn match_candidates(
        &self,
        query: Option<&EmbeddingVector>,
        candidates: &[Candidate],
        options: MatchOptions,
    ) -> Result<Vec<MatchResult>, AppError> {
        Ok(find_matches::<Candidate, _>(query, candidates, options)?)
    }

    /// Photo in, ranked identities out.
    pub async fn identify(
        &self,
        group: &str,
        raw: Vec<u8>,
        options: MatchOptions,
    ) -> Result<Vec<MatchResult>, AppError> {
        self.catalog.group_summary(group)?;
        let query = self.embed(raw).await?;
        self.match_group(Some(&query), group, options)
    }

    /// Read a stored photo.
    pub fn photo(&self, image: &ImageRef) -> Result<Vec<u8>, AppError> {
        Ok(self.images.read(image.as_str())?)
    }
}
