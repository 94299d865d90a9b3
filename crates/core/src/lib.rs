//! Core types and shared functionality for the static file cache queue.
//!
//! This crate provides:
//! - The SQLite-backed warming queue and its admin API
//! - The tagged static cache interface and invalidation façade
//! - Unified error types
//! - Configuration structures

pub mod admin;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod target;

pub use admin::QueueAdmin;
pub use cache::{CacheInvalidator, SqliteTagCache, TaggedCache, page_tag};
pub use config::{ConfigError, DEFAULT_BATCH_LIMIT, RunStrategy, WorkerConfig};
pub use error::Error;
pub use store::{EntryState, QueueEntry, QueueStats, QueueStore};
pub use target::{UrlError, parse_target};
