//! In-memory stores
//!
//! Both stores can be told to fail on demand, which is how tests simulate an
//! unreachable primary or a flaky index.

use async_trait::async_trait;
use person_sync_core::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use crate::query::QueryMatcher;

/// Failure injection switch shared by the in-memory stores
#[derive(Debug, Default)]
pub struct FailureSwitch {
    always: AtomicBool,
    skip: AtomicU32,
    next: AtomicU32,
}

impl FailureSwitch {
    /// Fail every call until switched off
    pub fn set(&self, failing: bool) {
        self.always.store(failing, Ordering::SeqCst);
    }

    /// Fail the next `count` calls, then recover
    pub fn fail_next(&self, count: u32) {
        self.skip.store(0, Ordering::SeqCst);
        self.next.store(count, Ordering::SeqCst);
    }

    /// Let `skip` calls through, then fail exactly one
    pub fn fail_after(&self, skip: u32) {
        self.skip.store(skip, Ordering::SeqCst);
        self.next.store(1, Ordering::SeqCst);
    }

    /// Consume one armed failure, if any
    pub fn trip(&self) -> bool {
        if self.always.load(Ordering::SeqCst) {
            return true;
        }
        if self.next.load(Ordering::SeqCst) == 0 {
            return false;
        }
        if self
            .skip
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return false;
        }
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn sorted(mut people: Vec<Person>, page: &PageRequest) -> Vec<Person> {
    if let Some(sort) = page.sort() {
        people.sort_by(|a, b| sort.compare(a, b));
    }
    people
}

// ============================================================================
// Memory Record Store
// ============================================================================

/// In-memory primary store
///
/// Records are kept ordered by id; ids are random UUIDs.
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, Person>>,
    failures: FailureSwitch,
    running: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            failures: FailureSwitch::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Failure injection for every call on this store
    pub fn failures(&self) -> &FailureSwitch {
        &self.failures
    }

    /// Snapshot of all records, in id order
    pub async fn snapshot(&self) -> Vec<Person> {
        self.records.read().await.values().cloned().collect()
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failures.trip() {
            return Err(SyncError::store(format!(
                "memory record store unavailable during {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemoryRecordStore {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for MemoryRecordStore {
    async fn health_check(&self) -> Result<()> {
        self.check("health_check")
    }

    fn component_name(&self) -> &'static str {
        "memory_record_store"
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, mut person: Person) -> Result<Person> {
        self.check("create")?;
        let id = Uuid::new_v4().to_string();
        person.id = Some(id.clone());
        self.records.write().await.insert(id, person.clone());
        trace!(id = ?person.id, "Created record");
        Ok(person)
    }

    async fn save(&self, person: Person) -> Result<Person> {
        self.check("save")?;
        let id = person.require_id()?.to_string();
        self.records.write().await.insert(id, person.clone());
        Ok(person)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Person>> {
        self.check("find_by_id")?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        self.check("exists_by_id")?;
        Ok(self.records.read().await.contains_key(id))
    }

    async fn find_page(&self, page: &PageRequest) -> Result<Vec<Person>> {
        self.check("find_page")?;
        let all = self.records.read().await.values().cloned().collect();
        Ok(page.slice(&sorted(all, page)))
    }

    async fn count(&self) -> Result<u64> {
        self.check("count")?;
        Ok(self.records.read().await.len() as u64)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.check("delete_by_id")?;
        self.records.write().await.remove(id);
        Ok(())
    }
}

// ============================================================================
// Memory Search Index
// ============================================================================

/// In-memory search index
///
/// Writes and reads fail independently so a test can break mirroring while
/// searches keep working.
pub struct MemorySearchIndex {
    documents: RwLock<BTreeMap<String, Person>>,
    write_failures: FailureSwitch,
    read_failures: FailureSwitch,
    running: AtomicBool,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            write_failures: FailureSwitch::default(),
            read_failures: FailureSwitch::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Failure injection for save and delete
    pub fn write_failures(&self) -> &FailureSwitch {
        &self.write_failures
    }

    /// Failure injection for query and count
    pub fn read_failures(&self) -> &FailureSwitch {
        &self.read_failures
    }

    /// Mirror held for an id, if any
    pub async fn get(&self, id: &str) -> Option<Person> {
        self.documents.read().await.get(id).cloned()
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        if self.write_failures.trip() {
            return Err(SyncError::index_write(format!(
                "memory search index rejected {}",
                operation
            )));
        }
        Ok(())
    }

    fn check_read(&self, operation: &str) -> Result<()> {
        if self.read_failures.trip() {
            return Err(SyncError::index_query(format!(
                "memory search index rejected {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for MemorySearchIndex {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthCheck for MemorySearchIndex {
    async fn health_check(&self) -> Result<()> {
        self.check_read("health_check")
    }

    fn component_name(&self) -> &'static str {
        "memory_search_index"
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn save(&self, person: &Person) -> Result<Person> {
        self.check_write("save")?;
        let id = person.require_id()?.to_string();
        self.documents.write().await.insert(id, person.clone());
        Ok(person.clone())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.check_write("delete")?;
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn query(&self, text: &str, page: &PageRequest) -> Result<Vec<Person>> {
        self.check_read("query")?;
        let matcher = QueryMatcher::parse(text);
        let hits = self
            .documents
            .read()
            .await
            .values()
            .filter(|p| matcher.matches(p))
            .cloned()
            .collect();
        Ok(page.slice(&sorted(hits, page)))
    }

    async fn count(&self) -> Result<u64> {
        self.check_read("count")?;
        Ok(self.documents.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(first: &str) -> Person {
        Person::new(first, "wxyzwxyzwxyz", 5)
    }

    #[test]
    fn test_failure_switch_counts_down() {
        let switch = FailureSwitch::default();
        assert!(!switch.trip());

        switch.fail_next(2);
        assert!(switch.trip());
        assert!(switch.trip());
        assert!(!switch.trip());

        switch.set(true);
        assert!(switch.trip());
        switch.set(false);
        assert!(!switch.trip());

        switch.fail_after(1);
        assert!(!switch.trip());
        assert!(switch.trip());
        assert!(!switch.trip());
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let store = MemoryRecordStore::new();
        let created = store.create(person("abcd")).await.unwrap();

        let id = created.id.clone().unwrap();
        assert!(!id.is_empty());
        assert_eq!(store.find_by_id(&id).await.unwrap(), Some(created));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_requires_id() {
        let store = MemoryRecordStore::new();
        assert!(store.save(person("abcd")).await.is_err());
    }

    #[tokio::test]
    async fn test_find_page_sorted_and_bounded() {
        let store = MemoryRecordStore::new();
        for name in ["cccc", "aaaa", "bbbb"] {
            store.create(person(name)).await.unwrap();
        }

        let page = PageRequest::new(0, 2)
            .unwrap()
            .with_sort(Sort::asc(SortField::FirstName));
        let names: Vec<_> = store
            .find_page(&page)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.first_name)
            .collect();
        assert_eq!(names, vec!["aaaa", "bbbb"]);

        let beyond = PageRequest::new(5, 2).unwrap();
        assert!(store.find_page(&beyond).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_store_failure_injection() {
        let store = MemoryRecordStore::new();
        store.failures().fail_next(1);

        let err = store.create(person("abcd")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreFailure);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_query_and_count() {
        let index = MemorySearchIndex::new();
        index.save(&person("alpha1").with_id("1")).await.unwrap();
        index.save(&person("beta22").with_id("2")).await.unwrap();

        let hits = index.query("alpha1", &PageRequest::first()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_deref(), Some("1"));

        let all = index.query("*", &PageRequest::first()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_index_write_failure_leaves_no_mirror() {
        let index = MemorySearchIndex::new();
        index.write_failures().set(true);

        let err = index.save(&person("abcd").with_id("1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexWriteFailure);
        assert!(index.get("1").await.is_none());

        // Reads are unaffected by write failures
        assert_eq!(index.count().await.unwrap(), 0);
    }
}
