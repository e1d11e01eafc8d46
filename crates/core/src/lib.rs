//! Core types and offline runtime for offline-h5.
//!
//! This crate provides:
//! - SQLite-backed local store: response buckets, resource records, notes
//! - Cache-first and network-first strategies with URL routing
//! - The caching worker (install, activate, fetch, sync)
//! - The record-backed fallback controller
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod intercept;
pub mod store;
pub mod strategy;
pub mod sync_queue;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Bucket, RecordStore, ResourceCache};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Network, Request, Response};
pub use intercept::RequestInterceptor;
pub use store::{LocalDb, Note, ReadyHandle, RetryPolicy};
pub use strategy::{Served, Source, Strategy};
pub use sync_queue::{LocalStubRemote, NoteQueue, NoteRemote};
pub use worker::Worker;
