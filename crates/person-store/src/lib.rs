//! # Person Store
//!
//! Backends for the two stores behind the sync gateway.
//!
//! ## Record stores
//!
//! - `MemoryRecordStore`: process-local, for tests and demos
//! - `FileRecordStore`: JSON snapshot rewritten atomically on every mutation
//!
//! ## Search indexes
//!
//! - `MemorySearchIndex`: evaluates query strings locally
//! - `EsSearchIndex`: Elasticsearch over its REST API
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = record_store_from_config(&config.record_store);
//! let index = search_index_from_config(&config.search)?;
//! store.start().await?;
//! index.start().await?;
//! ```

pub mod es_index;
pub mod file_store;
pub mod memory;
pub mod query;

pub use es_index::*;
pub use file_store::*;
pub use memory::*;
pub use query::*;

use person_sync_core::prelude::*;
use person_sync_core::{RecordStoreConfig, RecordStoreKind, SearchBackend, SearchConfig};
use std::sync::Arc;
use tracing::info;

/// Build the configured primary store
pub fn record_store_from_config(config: &RecordStoreConfig) -> Arc<dyn RecordStore> {
    match config.kind {
        RecordStoreKind::Memory => {
            info!("Using in-memory record store");
            Arc::new(MemoryRecordStore::new())
        }
        RecordStoreKind::File => {
            info!(path = %config.path, "Using file record store");
            Arc::new(FileRecordStore::new(&config.path))
        }
    }
}

/// Build the configured search index
pub fn search_index_from_config(config: &SearchConfig) -> Result<Arc<dyn SearchIndex>> {
    match config.backend {
        SearchBackend::Memory => {
            info!("Using in-memory search index");
            Ok(Arc::new(MemorySearchIndex::new()))
        }
        SearchBackend::Elasticsearch => {
            info!(
                hosts = ?config.elasticsearch.hosts,
                index = %config.elasticsearch.index,
                "Using Elasticsearch search index"
            );
            Ok(Arc::new(EsSearchIndex::new(config.elasticsearch.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factories_follow_config() {
        let store = record_store_from_config(&RecordStoreConfig::default());
        assert_eq!(store.component_name(), "memory_record_store");

        let index = search_index_from_config(&SearchConfig::default()).unwrap();
        assert_eq!(index.component_name(), "memory_search_index");
    }

    #[test]
    fn test_file_store_selected() {
        let config = RecordStoreConfig {
            kind: RecordStoreKind::File,
            path: "/tmp/people.json".to_string(),
        };
        assert_eq!(
            record_store_from_config(&config).component_name(),
            "file_record_store"
        );
    }
}
