//! Configuration types for Person Sync
//!
//! Uses the `config` crate for layered configuration from files and environment.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Root configuration for the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Primary store configuration
    #[serde(default)]
    pub record_store: RecordStoreConfig,

    /// Search index configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Pagination defaults
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen: String,

    /// Application name used in alert headers
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_app_name() -> String {
    "personSync".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            app_name: default_app_name(),
        }
    }
}

// ============================================================================
// Primary Store Configuration
// ============================================================================

/// Primary store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStoreKind {
    Memory,
    File,
}

/// Primary store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStoreConfig {
    /// Backend: "memory" or "file"
    #[serde(default = "default_record_store_kind")]
    pub kind: RecordStoreKind,

    /// Snapshot path for the file backend
    #[serde(default = "default_record_store_path")]
    pub path: String,
}

fn default_record_store_kind() -> RecordStoreKind {
    RecordStoreKind::Memory
}

fn default_record_store_path() -> String {
    "/var/lib/person-sync/people.json".to_string()
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            kind: default_record_store_kind(),
            path: default_record_store_path(),
        }
    }
}

// ============================================================================
// Search Configuration
// ============================================================================

/// Search index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    Memory,
    Elasticsearch,
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend: "memory" or "elasticsearch"
    #[serde(default = "default_search_backend")]
    pub backend: SearchBackend,

    /// Elasticsearch connection, used by the elasticsearch backend
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
}

fn default_search_backend() -> SearchBackend {
    SearchBackend::Memory
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_search_backend(),
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

/// Elasticsearch connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch hosts
    #[serde(default = "default_es_hosts")]
    pub hosts: Vec<String>,

    /// Index holding the person mirrors
    #[serde(default = "default_index_name")]
    pub index: String,

    /// Optional username for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Optional API key for authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Connection timeout
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Wait for a refresh after each mirror write so it is searchable on return
    #[serde(default)]
    pub refresh_on_write: bool,
}

fn default_es_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index_name() -> String {
    "person".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: default_es_hosts(),
            index: default_index_name(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            refresh_on_write: false,
        }
    }
}

// ============================================================================
// Pagination Configuration
// ============================================================================

/// Pagination defaults applied at the API boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size when the request names none
    #[serde(default = "default_page_size")]
    pub default_size: u32,

    /// Requests asking for more are clamped to this
    #[serde(default = "default_max_page_size")]
    pub max_size: u32,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: default_page_size(),
            max_size: default_max_page_size(),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl SyncConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default values
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        // Add config file if specified
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Add environment variables with prefix PERSON_SYNC__
        builder = builder.add_source(
            config::Environment::with_prefix("PERSON_SYNC")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if self.pagination.default_size == 0 || self.pagination.max_size == 0 {
            return Err(SyncError::config("page sizes must be positive"));
        }
        if self.pagination.default_size > self.pagination.max_size {
            return Err(SyncError::config(
                "pagination.default_size exceeds pagination.max_size",
            ));
        }
        if self.search.backend == SearchBackend::Elasticsearch {
            let es = &self.search.elasticsearch;
            if es.hosts.is_empty() {
                return Err(SyncError::config("search.elasticsearch.hosts is empty"));
            }
            for host in &es.hosts {
                Url::parse(host).map_err(|e| {
                    SyncError::config(format!("invalid elasticsearch host '{}': {}", host, e))
                })?;
            }
            if es.index.is_empty() {
                return Err(SyncError::config("search.elasticsearch.index is empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.record_store.kind, RecordStoreKind::Memory);
        assert_eq!(config.search.backend, SearchBackend::Memory);
        assert_eq!(config.pagination.default_size, 20);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = SyncConfig::load(None).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.search.elasticsearch.index, "person");
        assert_eq!(
            config.search.elasticsearch.request_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_rejects_bad_es_host() {
        let mut config = SyncConfig::default();
        config.search.backend = SearchBackend::Elasticsearch;
        config.search.elasticsearch.hosts = vec!["not a url".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_default_above_max() {
        let mut config = SyncConfig::default();
        config.pagination.default_size = 500;
        assert!(config.validate().is_err());
    }
}
