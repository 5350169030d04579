use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::{
    catalog::DEFAULT_FETCH_TIMEOUT,
    embedding::{EmbeddingModel, DEFAULT_DIMENSIONS, DEFAULT_MODEL},
    index::{DEFAULT_INDEX_NAME, DEFAULT_KEY_PREFIX},
    storage::{self, StorageManager},
    sync::{RecordErrorPolicy, SYNC_MARKER_KEY},
};

const CONFIG_FILE: &str = "config.yaml";

/// Environment variable overriding `catalog.url`.
pub const CATALOG_URL_ENV: &str = "PRODVEC_CATALOG_URL";

/// Default number of matches returned by a similarity query
const DEFAULT_QUERY_LIMIT: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Endpoint returning the product catalog as JSON
    #[serde(default)]
    pub url: Option<String>,

    /// Read the catalog from an exported JSON file instead of `url`
    #[serde(default)]
    pub export_path: Option<String>,

    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: None,
            export_path: None,
            timeout_secs: default_catalog_timeout_secs(),
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for embedding generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Try the primary model before falling back to hash embeddings
    #[serde(default = "default_true")]
    pub primary: bool,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Vector length stored in the index
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            primary: true,
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    /// Key prefix of product documents
    #[serde(default = "default_key_prefix")]
    pub prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_INDEX_NAME.to_string(),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub on_record_error: RecordErrorPolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_limit")]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

fn default_catalog_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_query_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub query: QueryConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = self.catalog.url.as_deref() {
            url::Url::parse(url).with_context(|| format!("catalog.url '{url}' is not a valid URL"))?;
        }
        if self.catalog.timeout_secs == 0 {
            bail!("catalog.timeout_secs must be greater than 0");
        }

        let emb = &self.embedding;
        if emb.dimensions == 0 {
            bail!("embedding.dimensions must be greater than 0");
        }
        if emb.primary {
            EmbeddingModel::validate_name(&emb.model)
                .with_context(|| format!("embedding.model '{}' is not supported", emb.model))?;
        }

        if self.index.name.trim().is_empty() {
            bail!("index.name must not be empty");
        }
        if self.index.prefix.is_empty() {
            bail!("index.prefix must not be empty");
        }
        if SYNC_MARKER_KEY.starts_with(&self.index.prefix) {
            bail!(
                "index.prefix '{}' would include the sync marker key '{SYNC_MARKER_KEY}'",
                self.index.prefix
            );
        }

        if self.query.default_limit == 0 {
            bail!("query.default_limit must be greater than 0");
        }

        Ok(())
    }

    /// Environment overrides, applied after the file is read.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(CATALOG_URL_ENV) {
            let url = url.trim().to_string();
            if !url.is_empty() {
                self.catalog.url = Some(url);
            }
        }
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)
            .with_context(|| format!("failed to open config directory {base_path}"))?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}
