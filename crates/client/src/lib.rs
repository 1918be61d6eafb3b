//! `gradelens-client`
//!
//! **Responsibility:** the dashboard side of the export pipeline.
//!
//! This crate provides:
//! - A query cache with freshness/retention windows, retry with backoff,
//!   refetch-on-focus and in-flight de-duplication
//! - `DashboardClient`: export history, notifications and the unread badge
//!   behind that cache, invalidated by the client's own mutations
//! - Artifact downloads under `<export_type>_<YYYY-MM-DD>.<ext>`
//!
//! The client never sees the worker directly: completion shows up through
//! cache refreshes.

pub mod dashboard;
pub mod download;
pub mod query_cache;
pub mod types;

pub use dashboard::{DashboardClient, jobs_key, notifications_key, unread_key};
pub use download::{Download, download_filename};
pub use query_cache::QueryCache;
pub use types::{Backoff, BackoffStrategy, CacheState, CachedQueryResult, QueryOptions};
