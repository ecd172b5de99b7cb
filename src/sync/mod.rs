//! Signed access to the Cognito Sync service

pub mod client;
pub mod sigv4;

pub use client::{FederatedIdentity, SyncClient, SyncError};
pub use sigv4::{RequestSigner, SignableRequest, SignedHeaders, SigningContext};
