//! GoPlay catalog client library
//!
//! Session handling, the resilient metadata cache, request signing and the
//! content fetcher. The `goplay` binary and the integration tests build on
//! these modules.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod content;
pub mod data;
pub mod metadata;
pub mod sync;
