//! Pagination for Person Sync
//!
//! `assemble` joins a count query and a page fetch into a [`Page`] envelope.
//! The two run concurrently with no ordering between them, so the count and
//! the items may come from different snapshots of the same store. They are
//! never reconciled against the other store's count.

use crate::error::{Result, SyncError};
use crate::record::{fields, Person};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Sortable person attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    Id,
    FirstName,
    LastName,
    Telephone,
}

impl SortField {
    /// Name on the wire (`sort=firstName,asc`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => fields::ID,
            Self::FirstName => fields::FIRST_NAME,
            Self::LastName => fields::LAST_NAME,
            Self::Telephone => fields::TELEPHONE,
        }
    }

    /// Name in the persisted document
    pub fn document_field(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Telephone => "telephone",
        }
    }
}

impl FromStr for SortField {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(Self::Id),
            "firstName" | "first_name" => Ok(Self::FirstName),
            "lastName" | "last_name" => Ok(Self::LastName),
            "telephone" => Ok(Self::Telephone),
            other => Err(SyncError::validation(
                "sort",
                format!("unknown sort field '{}'", other),
            )),
        }
    }
}

/// Sort order for a page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Order two records by this sort, ties broken by id
    pub fn compare(&self, a: &Person, b: &Person) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::FirstName => a.first_name.cmp(&b.first_name),
            SortField::LastName => a.last_name.cmp(&b.last_name),
            SortField::Telephone => a.telephone.cmp(&b.telephone),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

impl FromStr for Sort {
    type Err = SyncError;

    /// Parse `field` or `field,asc|desc`
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, ',');
        let field = parts.next().unwrap_or_default().trim().parse()?;
        let direction = match parts.next().map(|d| d.trim().to_ascii_lowercase()) {
            None => SortDirection::Asc,
            Some(d) if d == "asc" => SortDirection::Asc,
            Some(d) if d == "desc" => SortDirection::Desc,
            Some(d) => {
                return Err(SyncError::validation(
                    "sort",
                    format!("unknown sort direction '{}'", d),
                ))
            }
        };
        Ok(Self { field, direction })
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.field.as_str(), self.direction.as_str())
    }
}

/// Zero-based page index with a positive page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Option<Sort>,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 20;

    pub fn new(page: u32, size: u32) -> Result<Self> {
        if size == 0 {
            return Err(SyncError::validation("size", "page size must be positive"));
        }
        Ok(Self {
            page,
            size,
            sort: None,
        })
    }

    /// First page with the default size
    pub fn first() -> Self {
        Self {
            page: 0,
            size: Self::DEFAULT_SIZE,
            sort: None,
        }
    }

    /// Builder pattern: set sort
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> Option<Sort> {
        self.sort
    }

    /// Index of the first item on this page
    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }

    /// Slice one page out of an already ordered sequence
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .iter()
            .skip(start)
            .take(self.size as usize)
            .cloned()
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

/// Page envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, request: &PageRequest) -> Self {
        Self {
            items,
            total_count,
            page_number: request.page(),
            page_size: request.size(),
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size as u64)
    }

    pub fn has_next(&self) -> bool {
        (self.page_number as u64) + 1 < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 0
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert items, keeping the navigation metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_number: self.page_number,
            page_size: self.page_size,
        }
    }
}

/// Run a count and a page fetch concurrently and join them into a page
///
/// Fails with the first error of either side.
pub async fn assemble<T, C, F>(count: C, fetch: F, request: &PageRequest) -> Result<Page<T>>
where
    C: Future<Output = Result<u64>>,
    F: Future<Output = Result<Vec<T>>>,
{
    let (total_count, mut items) = futures::try_join!(count, fetch)?;
    items.truncate(request.size() as usize);
    Ok(Page::new(items, total_count, request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_page_request_rejects_zero_size() {
        assert!(PageRequest::new(0, 0).is_err());
        let req = PageRequest::new(2, 10).unwrap();
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn test_slice_out_of_range_is_empty() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(PageRequest::new(0, 2).unwrap().slice(&items), vec![0, 1]);
        assert_eq!(PageRequest::new(2, 2).unwrap().slice(&items), vec![4]);
        assert!(PageRequest::new(3, 2).unwrap().slice(&items).is_empty());
    }

    #[test]
    fn test_sort_parsing() {
        let sort: Sort = "firstName,desc".parse().unwrap();
        assert_eq!(sort, Sort::desc(SortField::FirstName));
        assert_eq!(sort.to_string(), "firstName,desc");

        let sort: Sort = "telephone".parse().unwrap();
        assert_eq!(sort, Sort::asc(SortField::Telephone));

        assert!("nope,asc".parse::<Sort>().is_err());
        assert!("id,sideways".parse::<Sort>().is_err());
    }

    #[test]
    fn test_sort_compare() {
        let a = Person::new("aaaa", "zzzz", 1).with_id("1");
        let b = Person::new("bbbb", "yyyy", 1).with_id("2");

        assert_eq!(Sort::asc(SortField::FirstName).compare(&a, &b), Ordering::Less);
        assert_eq!(Sort::asc(SortField::LastName).compare(&a, &b), Ordering::Greater);
        // Equal telephone falls back to id
        assert_eq!(Sort::desc(SortField::Telephone).compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_page_navigation() {
        let req = PageRequest::new(1, 2).unwrap();
        let page = Page::new(vec![3, 4], 5, &req);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_previous());

        let last = Page::new(vec![5], 5, &PageRequest::new(2, 2).unwrap());
        assert!(!last.has_next());
    }

    #[tokio::test]
    async fn test_assemble_joins_count_and_items() {
        let req = PageRequest::new(0, 2).unwrap();
        let page = assemble(async { Ok(7) }, async { Ok(vec!["a", "b"]) }, &req)
            .await
            .unwrap();

        assert_eq!(page.total_count, 7);
        assert_eq!(page.items, vec!["a", "b"]);
        assert_eq!(page.page_size, 2);
    }

    #[tokio::test]
    async fn test_assemble_out_of_range_keeps_total() {
        let req = PageRequest::new(9, 10).unwrap();
        let page: Page<u32> = assemble(async { Ok(3) }, async { Ok(Vec::new()) }, &req)
            .await
            .unwrap();

        assert!(page.is_empty());
        assert_eq!(page.total_count, 3);
        assert_eq!(page.page_number, 9);
    }

    #[tokio::test]
    async fn test_assemble_runs_both_sides_concurrently() {
        // The count waits on a signal only the fetch sends; sequential
        // evaluation would never complete.
        let (tx, rx) = oneshot::channel::<()>();
        let count = async move {
            rx.await.map_err(|_| SyncError::Internal("fetch dropped".into()))?;
            Ok::<u64, SyncError>(1)
        };
        let fetch = async move {
            let _ = tx.send(());
            Ok::<_, SyncError>(vec![1u32])
        };

        let req = PageRequest::first();
        let page = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            assemble(count, fetch, &req),
        )
        .await
        .expect("assembly deadlocked")
        .unwrap();

        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn test_assemble_propagates_failure() {
        let req = PageRequest::first();
        let result: Result<Page<u32>> = assemble(
            async { Err(SyncError::store("count failed")) },
            async { Ok(vec![1]) },
            &req,
        )
        .await;
        assert!(result.is_err());
    }
}
