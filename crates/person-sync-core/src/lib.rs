//! # Person Sync Core
//!
//! Core types, store seams, and pagination for the person sync gateway.
//!
//! Two independently failing stores back every person record:
//! - a `RecordStore`, the authoritative system of record that assigns ids
//! - a `SearchIndex`, an eventually consistent mirror built for free text
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────┐  1. authoritative  ┌─────────────┐
//!  caller ──────►│ Sync Gateway │───────────────────►│ RecordStore │
//!                └──────┬───────┘                    └─────────────┘
//!                       │ 2. best-effort mirror      ┌─────────────┐
//!                       └───────────────────────────►│ SearchIndex │
//!                                                    └─────────────┘
//! ```

pub mod config;
pub mod error;
pub mod mapper;
pub mod metrics;
pub mod page;
pub mod record;
pub mod store;

pub use self::config::*;
pub use error::*;
pub use mapper::*;
pub use self::metrics::*;
pub use page::*;
pub use record::*;
pub use store::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::error::{ErrorKind, Result, SyncError};
    pub use crate::mapper::{EntityMapper, PersonMapper};
    pub use crate::page::{assemble, Page, PageRequest, Sort, SortDirection, SortField};
    pub use crate::record::{Person, PersonDto, PersonPatch};
    pub use crate::store::{HealthCheck, Lifecycle, RecordStore, SearchIndex};
}
