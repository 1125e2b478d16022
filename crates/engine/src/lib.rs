//! treeidx Search Engine
//!
//! This crate stores indexed trees and answers searches and browse
//! requests against them. It includes the sled-backed document store, the
//! query language and the request-level [`Service`].

pub mod error;
pub mod negotiate;
pub mod query;
pub mod render;
pub mod service;
pub mod store;
pub mod terms;

// Re-export main types
pub use error::{QueryError, StoreError};
pub use negotiate::{request_wants_json, Accept};
pub use query::{clamp_limit, DirectHit, Query, SearchResult, DEFAULT_LIMIT, MAX_LIMIT, QUERY_TIMEOUT};
pub use service::{BrowseView, FileView, FolderView, RawAsset, SearchRequest, SearchResponse, Service};
pub use store::{DocumentStore, SledStore, SortKey, StoreQuery};

use anyhow::{Context, Result};
use treeidx_core::Config;

/// Main engine that owns the configuration and an open store
pub struct Engine {
    config: Config,
    store: SledStore,
}

impl Engine {
    /// Open the store named by `config.store_path`
    pub fn open(config: Config) -> Result<Self> {
        let store = SledStore::open(&config.store_path)
            .with_context(|| format!("Failed to open store {}", config.store_path.display()))?;
        Ok(Self { config, store })
    }

    /// Wrap an already open store
    pub fn with_store(config: Config, store: SledStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// Request handler borrowing this engine
    pub fn service(&self) -> Service<'_> {
        Service::new(&self.config, &self.store)
    }
}
