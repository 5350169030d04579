//! Catalog → vector index ingestion.
//!
//! One sync pulls the whole catalog, makes sure the index exists and writes
//! every product whose key is not in the store yet. Records are processed
//! sequentially; an existing key is never overwritten, with or without
//! `force`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog::{CatalogError, CatalogRecord, CatalogSource, RecordError};
use crate::embedding::{EmbeddingPath, EmbeddingService};
use crate::index::{IndexError, IndexManager};
use crate::product::product_key;
use crate::store::{IndexSchema, StoreError, VectorStore};

/// Key of the document recording the last completed sync.
pub const SYNC_MARKER_KEY: &str = "sync:last";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(#[source] CatalogError),

    #[error("catalog source unavailable: {0}")]
    SourceUnavailable(#[source] CatalogError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to store product {product_id}: {source}")]
    RecordStorage {
        product_id: String,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    InvalidRecord(#[from] RecordError),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl From<CatalogError> for SyncError {
    fn from(e: CatalogError) -> Self {
        if e.is_configuration() {
            SyncError::Configuration(e)
        } else {
            SyncError::SourceUnavailable(e)
        }
    }
}

/// What to do when a single record cannot be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordErrorPolicy {
    /// Stop the batch and return the error. Earlier writes stay in place.
    #[default]
    Abort,
    /// Log, remember the failure and move on to the next record.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub product_id: Option<String>,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncSummary {
    pub new_count: usize,
    pub skipped_count: usize,
    /// Records written by this call, not the catalog size.
    pub total_count: usize,
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Not forced and the index already had data; the source was not contacted.
    AlreadyPresent,
    Completed(SyncSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub products_count: usize,
    pub data_exists: bool,
    pub last_sync: Option<String>,
}

enum RecordOutcome {
    Stored,
    Existing,
}

pub struct SyncService {
    store: Arc<dyn VectorStore>,
    source: Box<dyn CatalogSource>,
    embedder: Arc<EmbeddingService>,
    indexes: IndexManager,
    schema: IndexSchema,
    policy: RecordErrorPolicy,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        source: Box<dyn CatalogSource>,
        embedder: Arc<EmbeddingService>,
        schema: IndexSchema,
    ) -> Self {
        Self {
            indexes: IndexManager::new(store.clone()),
            store,
            source,
            embedder,
            schema,
            policy: RecordErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RecordErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pull the catalog into the index.
    ///
    /// Without `force`, an index that already holds products short-circuits
    /// to `SyncOutcome::AlreadyPresent` before the source is contacted.
    pub fn sync(&self, force: bool) -> Result<SyncOutcome, SyncError> {
        let _span = tracing::info_span!("sync", force, index = %self.schema.name).entered();
        log::info!("Starting catalog sync from {}", self.source.describe());

        if !force && self.data_exists()? {
            log::info!("Data already exists in the index. Use force to re-sync.");
            return Ok(SyncOutcome::AlreadyPresent);
        }

        let records = self.source.fetch().map_err(|e| {
            log::error!("Catalog fetch failed: {e}");
            SyncError::from(e)
        })?;
        log::info!("Processing {} products...", records.len());

        self.indexes.ensure_index(&self.schema)?;

        let mut summary = SyncSummary::default();
        for record in records {
            let name = record.display_name();
            let product_id = record.identifier();

            match self.process_record(&record) {
                Ok(RecordOutcome::Stored) => summary.new_count += 1,
                Ok(RecordOutcome::Existing) => summary.skipped_count += 1,
                Err(e) => {
                    log::error!("Failed to store product {name}: {e}");
                    if self.policy == RecordErrorPolicy::Abort {
                        return Err(e);
                    }
                    summary.failures.push(RecordFailure {
                        product_id,
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }
        summary.total_count = summary.new_count;

        log::info!(
            "Sync completed! New: {}, Skipped: {}, Failed: {}",
            summary.new_count,
            summary.skipped_count,
            summary.failures.len()
        );
        self.record_last_sync(&summary);

        Ok(SyncOutcome::Completed(summary))
    }

    /// Product count and the time of the last completed sync.
    pub fn status(&self) -> Result<SyncStatus, SyncError> {
        let products_count = match self.store.count(&self.schema.name) {
            Ok(n) => n,
            Err(StoreError::UnknownIndex(_)) => 0,
            Err(e) => return Err(SyncError::Store(e)),
        };

        let last_sync = self
            .store
            .get_json(SYNC_MARKER_KEY)
            .map_err(SyncError::Store)?
            .and_then(|marker| marker.get("at")?.as_str().map(str::to_owned));

        Ok(SyncStatus {
            products_count,
            data_exists: products_count > 0,
            last_sync,
        })
    }

    fn data_exists(&self) -> Result<bool, SyncError> {
        match self.store.count(&self.schema.name) {
            Ok(n) => Ok(n > 0),
            Err(StoreError::UnknownIndex(_)) => Ok(false),
            Err(e) => Err(SyncError::Store(e)),
        }
    }

    fn process_record(&self, record: &CatalogRecord) -> Result<RecordOutcome, SyncError> {
        let draft = record.normalize()?;
        let key = product_key(&self.schema.prefix, &draft.product_id);

        let storage_error = |source: StoreError| SyncError::RecordStorage {
            product_id: draft.product_id.clone(),
            source,
        };

        if self.store.get_json(&key).map_err(storage_error)?.is_some() {
            log::info!("Product already exists: {}", draft.name);
            return Ok(RecordOutcome::Existing);
        }

        let embedding = self.embedder.embed_effects(&draft.effects);
        if let EmbeddingPath::Fallback(reason) = &embedding.path {
            log::debug!("Product {}: fallback embedding ({reason:?})", draft.product_id);
        }

        let product = draft.clone().with_embedding(embedding.vector);
        let doc = serde_json::to_value(&product)
            .map_err(|e| storage_error(StoreError::Serialization(e)))?;
        self.store.set_json(&key, &doc).map_err(storage_error)?;

        log::info!("Stored product: {}", product.name);
        Ok(RecordOutcome::Stored)
    }

    fn record_last_sync(&self, summary: &SyncSummary) {
        let marker = json!({
            "at": chrono::Utc::now().to_rfc3339(),
            "new_products": summary.new_count,
            "skipped_products": summary.skipped_count,
            "failed_products": summary.failures.len(),
        });
        if let Err(e) = self.store.set_json(SYNC_MARKER_KEY, &marker) {
            log::warn!("Could not record sync time: {e}");
        }
    }
}

/// User-facing result of a sync call. Failures carry a message instead of
/// an error value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_products: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_products: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_products: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    pub fn from_result(result: &Result<SyncOutcome, SyncError>) -> Self {
        let empty = Self {
            success: true,
            message: None,
            skipped: None,
            new_products: None,
            skipped_products: None,
            total_products: None,
            failures: Vec::new(),
            error: None,
        };

        match result {
            Ok(SyncOutcome::AlreadyPresent) => Self {
                message: Some("Data already exists in the index".to_string()),
                skipped: Some(true),
                ..empty
            },
            Ok(SyncOutcome::Completed(summary)) => Self {
                message: Some(format!("Synced {} new products", summary.new_count)),
                new_products: Some(summary.new_count),
                skipped_products: Some(summary.skipped_count),
                total_products: Some(summary.total_count),
                failures: summary.failures.clone(),
                ..empty
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
                ..empty
            },
        }
    }
}
