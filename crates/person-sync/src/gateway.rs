//! Dual-store sync gateway
//!
//! Every mutation hits the primary store first; that write decides the
//! outcome. The committed record is then mirrored into the search index.
//! Mirror failures are logged and counted but never change the result, so the
//! index may lag the primary store (drift). Reads of `search` and
//! `search_count` always go to the index.
//!
//! No per-id lock is taken: two concurrent updates of the same id may reach
//! the index in a different order than they reached the primary store.

use person_sync_core::prelude::*;
use person_sync_core::{ErrorContext, ErrorContextExt, LatencyTimer, SyncMetrics};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "sync_gateway";

/// A record without an id cannot denote an existing entry
fn missing_id() -> SyncError {
    SyncError::not_found("<missing id>")
}

/// Orchestrates the primary store and the search index
pub struct SyncGateway<M = PersonMapper> {
    records: Arc<dyn RecordStore>,
    index: Arc<dyn SearchIndex>,
    mapper: M,
    metrics: SyncMetrics,
}

impl SyncGateway<PersonMapper> {
    /// Create a gateway with the default field mapper
    pub fn new(records: Arc<dyn RecordStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self::with_mapper(records, index, PersonMapper)
    }
}

impl<M> SyncGateway<M>
where
    M: EntityMapper<Entity = Person, Dto = PersonDto, Patch = PersonPatch>,
{
    pub fn with_mapper(records: Arc<dyn RecordStore>, index: Arc<dyn SearchIndex>, mapper: M) -> Self {
        Self {
            records,
            index,
            mapper,
            metrics: SyncMetrics::new(COMPONENT),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start both stores
    ///
    /// The primary store must come up. An index that fails to start is logged
    /// and left to recover on its own.
    pub async fn start(&self) -> Result<()> {
        self.records
            .start()
            .await
            .with_context(ErrorContext::new(COMPONENT, "start"))?;

        if let Err(e) = self.index.start().await {
            warn!(
                error = %e,
                component = self.index.component_name(),
                "Search index failed to start, mirroring will fail until it recovers"
            );
        }

        info!(
            record_store = self.records.component_name(),
            search_index = self.index.component_name(),
            "Sync gateway started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let index = self.index.stop().await;
        self.records.stop().await?;
        index
    }

    /// Health of both stores
    pub async fn health(&self) -> HealthReport {
        let (records, index) = futures::join!(
            component_health(self.records.as_ref()),
            component_health(self.index.as_ref()),
        );
        HealthReport { records, index }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a person; the primary store assigns the id
    pub async fn create(&self, dto: PersonDto) -> Result<PersonDto> {
        self.instrumented("create", async move {
            debug!(person = ?dto, "Request to create Person");
            if let Some(ref id) = dto.id {
                return Err(SyncError::id_conflict(format!(
                    "A new person cannot already have an id: {}",
                    id
                )));
            }

            let committed = self
                .records
                .create(self.mapper.to_entity(&dto))
                .await
                .with_context(ErrorContext::new(COMPONENT, "create"))?;

            self.mirror("create", &committed).await;
            Ok(self.mapper.to_dto(&committed))
        })
        .await
    }

    /// Replace every mutable field of an existing person
    pub async fn update(&self, dto: PersonDto) -> Result<PersonDto> {
        self.instrumented("update", async move {
            debug!(person = ?dto, "Request to update Person");
            let id = dto.id.clone().ok_or_else(missing_id)?;
            let ctx = ErrorContext::new(COMPONENT, "update").with_record_id(&id);

            if !self.records.exists_by_id(&id).await.with_context(ctx.clone())? {
                return Err(SyncError::not_found(id));
            }

            let saved = self
                .records
                .save(self.mapper.to_entity(&dto))
                .await
                .with_context(ctx)?;

            self.mirror("update", &saved).await;
            Ok(self.mapper.to_dto(&saved))
        })
        .await
    }

    /// Overlay the fields present in `patch` onto an existing person
    pub async fn partial_update(&self, patch: PersonPatch) -> Result<PersonDto> {
        self.instrumented("partial_update", async move {
            debug!(patch = ?patch, "Request to partially update Person");
            let id = patch.id.clone().ok_or_else(missing_id)?;
            let ctx = ErrorContext::new(COMPONENT, "partial_update").with_record_id(&id);

            let mut current = self
                .records
                .find_by_id(&id)
                .await
                .with_context(ctx.clone())?
                .ok_or_else(|| SyncError::not_found(&id))?;

            self.mapper.partial_update(&mut current, &patch);
            let saved = self.records.save(current).await.with_context(ctx)?;

            self.mirror("partial_update", &saved).await;
            Ok(self.mapper.to_dto(&saved))
        })
        .await
    }

    /// Delete from the primary store, then from the index
    ///
    /// If the primary delete fails the index is not touched and may keep a
    /// stale mirror.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.instrumented("delete", async move {
            debug!(id, "Request to delete Person");
            let ctx = ErrorContext::new(COMPONENT, "delete").with_record_id(id);

            if !self.records.exists_by_id(id).await.with_context(ctx.clone())? {
                return Err(SyncError::not_found(id));
            }
            self.records.delete_by_id(id).await.with_context(ctx)?;

            match self.index.delete_by_id(id).await {
                Ok(()) => self.metrics.record_mirror_write("delete"),
                Err(e) => {
                    warn!(error = %e, id, "Failed to remove mirror, index is now stale");
                    self.metrics.record_mirror_failure("delete");
                }
            }
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn find_one(&self, id: &str) -> Result<PersonDto> {
        self.instrumented("find_one", async move {
            debug!(id, "Request to get Person");
            self.records
                .find_by_id(id)
                .await
                .with_context(ErrorContext::new(COMPONENT, "find_one").with_record_id(id))?
                .map(|p| self.mapper.to_dto(&p))
                .ok_or_else(|| SyncError::not_found(id))
        })
        .await
    }

    pub async fn find_all(&self, page: &PageRequest) -> Result<Vec<PersonDto>> {
        self.instrumented("find_all", async move {
            Ok(self.mapper.to_dtos(&self.fetch_primary(page).await?))
        })
        .await
    }

    /// Free-text query against the search index
    pub async fn search(&self, query: &str, page: &PageRequest) -> Result<Vec<PersonDto>> {
        self.instrumented("search", async move {
            Ok(self.mapper.to_dtos(&self.fetch_index(query, page).await?))
        })
        .await
    }

    pub async fn count_all(&self) -> Result<u64> {
        self.instrumented("count_all", self.count_primary()).await
    }

    /// Number of documents in the search index, whatever their content
    pub async fn search_count(&self) -> Result<u64> {
        self.instrumented("search_count", self.count_index()).await
    }

    /// One page of the primary store, counted against the primary store
    pub async fn list_page(&self, page: &PageRequest) -> Result<Page<PersonDto>> {
        self.instrumented("list_page", async move {
            debug!(page = page.page(), size = page.size(), "Request to list People");
            let result = assemble(self.count_primary(), self.fetch_primary(page), page).await?;
            self.sample_drift(Some(result.total_count), None).await;
            Ok(result.map(|p| self.mapper.to_dto(&p)))
        })
        .await
    }

    /// One page of index hits, counted against the index
    pub async fn search_page(&self, query: &str, page: &PageRequest) -> Result<Page<PersonDto>> {
        self.instrumented("search_page", async move {
            debug!(query, page = page.page(), size = page.size(), "Request to search People");
            let result =
                assemble(self.count_index(), self.fetch_index(query, page), page).await?;
            self.sample_drift(None, Some(result.total_count)).await;
            Ok(result.map(|p| self.mapper.to_dto(&p)))
        })
        .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn count_primary(&self) -> Result<u64> {
        self.records
            .count()
            .await
            .with_context(ErrorContext::new(COMPONENT, "count_all"))
    }

    async fn count_index(&self) -> Result<u64> {
        self.index
            .count()
            .await
            .with_context(ErrorContext::new(COMPONENT, "search_count"))
    }

    async fn fetch_primary(&self, page: &PageRequest) -> Result<Vec<Person>> {
        self.records
            .find_page(page)
            .await
            .with_context(ErrorContext::new(COMPONENT, "find_all"))
    }

    async fn fetch_index(&self, query: &str, page: &PageRequest) -> Result<Vec<Person>> {
        self.index
            .query(query, page)
            .await
            .with_context(ErrorContext::new(COMPONENT, "search"))
    }

    /// Awaited, error-discarded mirror write
    async fn mirror(&self, operation: &'static str, person: &Person) {
        match self.index.save(person).await {
            Ok(_) => self.metrics.record_mirror_write(operation),
            Err(e) => {
                warn!(
                    error = %e,
                    operation,
                    id = ?person.id,
                    "Mirror write failed, search index is behind the primary store"
                );
                self.metrics.record_mirror_failure(operation);
            }
        }
    }

    /// Update the drift gauge from whichever count is already known
    async fn sample_drift(&self, primary: Option<u64>, index: Option<u64>) {
        let primary = match primary {
            Some(n) => Ok(n),
            None => self.records.count().await,
        };
        let index = match index {
            Some(n) => Ok(n),
            None => self.index.count().await,
        };
        match (primary, index) {
            (Ok(primary), Ok(index)) => self.metrics.set_drift(primary, index),
            (Err(e), _) | (_, Err(e)) => debug!(error = %e, "Skipped drift sample"),
        }
    }

    async fn instrumented<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timer = LatencyTimer::start(|d| self.metrics.record_latency(operation, d));
        let result = fut.await;
        timer.stop();

        let outcome = match result {
            Ok(_) => "ok",
            Err(ref e) => e.kind().as_str(),
        };
        self.metrics.record_operation(operation, outcome);
        result
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health of a single store
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn component_health<C: HealthCheck + ?Sized>(component: &C) -> ComponentHealth {
    match component.health_check().await {
        Ok(()) => ComponentHealth {
            component: component.component_name(),
            healthy: true,
            error: None,
        },
        Err(e) => ComponentHealth {
            component: component.component_name(),
            healthy: false,
            error: Some(e.to_string()),
        },
    }
}

/// Health of both stores
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub records: ComponentHealth,
    pub index: ComponentHealth,
}

impl HealthReport {
    /// Requests can be served as long as the primary store is up
    pub fn is_ready(&self) -> bool {
        self.records.healthy
    }

    pub fn status(&self) -> &'static str {
        match (self.records.healthy, self.index.healthy) {
            (true, true) => "healthy",
            (true, false) => "degraded",
            _ => "unhealthy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use person_store::{MemoryRecordStore, MemorySearchIndex};

    fn gateway() -> (SyncGateway, Arc<MemoryRecordStore>, Arc<MemorySearchIndex>) {
        let records = Arc::new(MemoryRecordStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let gateway = SyncGateway::new(records.clone(), index.clone());
        (gateway, records, index)
    }

    fn dto() -> PersonDto {
        PersonDto::new("abcd", "wxyzwxyzwxyz", 5)
    }

    #[tokio::test]
    async fn test_create_mirrors_committed_record() {
        let (gateway, records, index) = gateway();
        let created = gateway.create(dto()).await.unwrap();
        let id = created.id.clone().unwrap();

        assert_eq!(records.snapshot().await.len(), 1);
        let mirror = index.get(&id).await.unwrap();
        assert_eq!(mirror.first_name, "abcd");
    }

    #[tokio::test]
    async fn test_primary_failure_mirrors_nothing() {
        let (gateway, records, index) = gateway();
        records.failures().fail_next(1);

        let err = gateway.create(dto()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mirror_failure_keeps_result() {
        let (gateway, _records, index) = gateway();
        index.write_failures().set(true);

        let created = gateway.create(dto()).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(gateway.count_all().await.unwrap(), 1);
        assert_eq!(gateway.search_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_without_id_is_not_found() {
        let (gateway, records, index) = gateway();
        gateway.create(dto()).await.unwrap();
        let before = records.snapshot().await;

        let err = gateway.update(dto()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let patch = PersonPatch {
            first_name: Some("efgh".to_string()),
            ..Default::default()
        };
        let err = gateway.partial_update(patch).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(records.snapshot().await, before);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_query_failure_is_returned() {
        let (gateway, _, index) = gateway();
        gateway.create(dto()).await.unwrap();
        index.read_failures().fail_next(1);

        let err = gateway.search("abcd", &PageRequest::first()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexQueryFailure);
    }

    #[tokio::test]
    async fn test_health_report() {
        let (gateway, _, index) = gateway();
        let report = gateway.health().await;
        assert_eq!(report.status(), "healthy");

        index.read_failures().set(true);
        let report = gateway.health().await;
        assert_eq!(report.status(), "degraded");
        assert!(report.is_ready());
    }
}
