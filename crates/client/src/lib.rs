//! Client code for offline-h5.
//!
//! This crate provides the reqwest-backed [`Network`](offline_h5_core::Network)
//! and the URL helpers the host uses to resolve page requests.

pub mod fetch;

pub use fetch::{HttpNetwork, NetworkConfig, UrlError, canonicalize, resolve, same_origin};
