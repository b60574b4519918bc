//! Store seams for Person Sync
//!
//! The gateway never owns state: both stores are injected capabilities behind
//! these traits, so deployments pick a backend and tests substitute fakes that
//! fail on demand.
//!
//! ## Store Hierarchy
//!
//! ```text
//! Lifecycle (start/stop) + HealthCheck
//!     │
//!     ├── RecordStore (primary, authoritative, assigns ids)
//!     │       └── MemoryRecordStore, FileRecordStore, ...
//!     │
//!     └── SearchIndex (secondary, eventually consistent mirror)
//!             └── MemorySearchIndex, EsSearchIndex, ...
//! ```

use crate::error::Result;
use crate::page::PageRequest;
use crate::record::Person;
use async_trait::async_trait;

// ============================================================================
// Lifecycle Management
// ============================================================================

/// Lifecycle management for components
///
/// Provides graceful startup and shutdown semantics.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Start the component
    ///
    /// Called once before any operations. Should establish connections,
    /// load persisted state, and prepare for operation.
    async fn start(&self) -> Result<()>;

    /// Stop the component gracefully
    ///
    /// May be called even if start() failed.
    async fn stop(&self) -> Result<()>;

    /// Check if the component is running
    fn is_running(&self) -> bool;
}

/// Health check capability
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check
    ///
    /// Returns Ok(()) if healthy, Err with details if not.
    async fn health_check(&self) -> Result<()>;

    /// Get component name for health reporting
    fn component_name(&self) -> &'static str;
}

// ============================================================================
// Primary Store
// ============================================================================

/// Primary record store: the system of record
///
/// Implementations:
/// - `MemoryRecordStore`: in-process map, failure injectable (for testing)
/// - `FileRecordStore`: JSON snapshot persisted on every mutation
#[async_trait]
pub trait RecordStore: Lifecycle + HealthCheck {
    /// Commit a new record, assigning its id
    ///
    /// Any id on the input is ignored; the returned record carries the
    /// store-assigned one.
    async fn create(&self, person: Person) -> Result<Person>;

    /// Replace a committed record by id
    async fn save(&self, person: Person) -> Result<Person>;

    /// Fetch a record, `None` if absent
    async fn find_by_id(&self, id: &str) -> Result<Option<Person>>;

    /// Check whether a record exists
    async fn exists_by_id(&self, id: &str) -> Result<bool>;

    /// Fetch one page of records, empty when the page is out of range
    async fn find_page(&self, page: &PageRequest) -> Result<Vec<Person>>;

    /// Total number of records
    async fn count(&self) -> Result<u64>;

    /// Remove a record
    async fn delete_by_id(&self, id: &str) -> Result<()>;
}

// ============================================================================
// Secondary Index
// ============================================================================

/// Search index: a disposable, eventually consistent projection
///
/// Implementations:
/// - `MemorySearchIndex`: in-process query-string matcher (for testing)
/// - `EsSearchIndex`: Elasticsearch over HTTP
#[async_trait]
pub trait SearchIndex: Lifecycle + HealthCheck {
    /// Upsert the mirror of a committed record
    async fn save(&self, person: &Person) -> Result<Person>;

    /// Remove the mirror of a record; absent mirrors are not an error
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Free-text query returning one page of mirrors
    async fn query(&self, text: &str, page: &PageRequest) -> Result<Vec<Person>>;

    /// Total number of mirrored records
    async fn count(&self) -> Result<u64>;
}
