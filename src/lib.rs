//! Space-scoped search aggregation and indexing engine
//!
//! A user's files live in many storage spaces: a personal home, project
//! drives and shares received from other users. This crate answers one
//! query across all of them: it resolves the caller's visible spaces,
//! fans the query out to one index partition per space, rewrites paths so
//! every hit is addressed relative to the space the caller sees, and merges
//! the per-space answers into one ranked page. The ingestion side keeps the
//! partitions in step with storage through full walks and lifecycle events.

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod search;
pub mod storage;

pub use error::{AppError, Result};
