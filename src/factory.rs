use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use homedir::my_home;

use crate::{
    catalog::{CatalogSource, FileCatalogSource, HttpCatalogSource},
    config::Config,
    embedding::EmbeddingService,
    index::{product_schema, IndexManager},
    query::QueryService,
    store::{IndexSchema, LocalStore, VectorStore},
    sync::SyncService,
};

pub const BASE_PATH_ENV: &str = "PRODVEC_BASE_PATH";

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub store_path: String,
}

/// Services built from one loaded config, sharing a store and an embedder.
pub struct App {
    pub config: Config,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<EmbeddingService>,
    pub schema: IndexSchema,
}

impl App {
    pub fn sync_service(&self) -> SyncService {
        SyncService::new(
            self.store.clone(),
            AppFactory::create_catalog_source(&self.config),
            self.embedder.clone(),
            self.schema.clone(),
        )
        .with_policy(self.config.sync.on_record_error)
    }

    pub fn query_service(&self) -> QueryService {
        QueryService::new(
            self.store.clone(),
            self.embedder.clone(),
            self.schema.name.clone(),
        )
    }

    pub fn index_manager(&self) -> IndexManager {
        IndexManager::new(self.store.clone())
    }
}

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Load config and wire the store, embedder and index schema.
    pub fn create_app(paths: &AppPaths) -> Result<App> {
        let config = Config::load_with(&paths.base_path)?;

        let store: Arc<dyn VectorStore> = Arc::new(
            LocalStore::open(&paths.store_path)
                .with_context(|| format!("Failed to open store at {}", paths.store_path))?,
        );
        let embedder = Arc::new(Self::create_embedder(&config, &paths.base_path));
        let schema = product_schema(
            &config.index.name,
            &config.index.prefix,
            config.embedding.dimensions,
        );

        Ok(App {
            config,
            store,
            embedder,
            schema,
        })
    }

    /// The model itself is only loaded on the first embedding request.
    pub fn create_embedder(config: &Config, base_path: &str) -> EmbeddingService {
        let emb = &config.embedding;
        if emb.primary {
            EmbeddingService::with_fastembed(&emb.model, PathBuf::from(base_path), emb.dimensions)
        } else {
            log::info!("Primary embedding model disabled, using hash embeddings");
            EmbeddingService::fallback_only(emb.dimensions)
        }
    }

    /// A configured URL wins over an export file. With neither, the HTTP
    /// source reports a configuration error on fetch.
    pub fn create_catalog_source(config: &Config) -> Box<dyn CatalogSource> {
        let catalog = &config.catalog;
        match (&catalog.url, &catalog.export_path) {
            (None, Some(path)) => Box::new(FileCatalogSource::new(path)),
            (url, _) => Box::new(HttpCatalogSource::new(url.clone(), catalog.timeout())),
        }
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        Self::paths_for(base_path)
    }

    pub fn paths_for(base_path: String) -> Result<AppPaths> {
        let store_path = format!("{base_path}/store");

        // Ensure base directory exists
        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths {
            base_path,
            store_path,
        })
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<String> {
        if let Ok(base_path) = std::env::var(BASE_PATH_ENV) {
            return Ok(base_path);
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(format!("{}/.local/share/prodvec", home.to_string_lossy()))
    }
}
