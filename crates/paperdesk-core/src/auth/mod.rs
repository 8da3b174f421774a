//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SharedSession`: the process-wide session, written through to storage
//! - `SessionManager`: login, logout, restore, profile and password operations
//! - `CredentialStore`: durable storage for the token and profile (file,
//!   OS keychain via keyring, or memory)

pub mod credentials;
pub mod manager;
pub mod session;

use thiserror::Error;

use crate::api::ApiError;

pub use credentials::{
    open_store, CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    StoreError, StoredCredentials,
};
pub use manager::SessionManager;
pub use session::{RestoreOutcome, Session, SharedSession};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}
