//! # Person Sync
//!
//! CRUD and free-text search over person records held in two stores.
//!
//! ## Components
//!
//! - `SyncGateway`: primary write first, then a best-effort mirror into the
//!   search index
//! - `api`: thin HTTP adapter over the gateway
//!
//! ## Consistency
//!
//! - The primary store decides every outcome and assigns ids
//! - A failed mirror write is logged and counted, never returned
//! - `search` and `search_count` read the index and may lag the primary store

pub mod api;
pub mod gateway;

pub use api::{build_router, run_server, AppState};
pub use gateway::*;
