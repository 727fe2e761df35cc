//! Token lifecycle: the per-user access-token cache and the manager that
//! walks cache → refresh → full provisioning.

pub mod cache;
pub mod manager;

pub use cache::TokenCache;
pub use manager::TokenManager;

use thiserror::Error;

use crate::identity::LinkError;
use crate::store::StoreError;

/// Token lifecycle errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Commerce authentication failed")]
    AuthenticationFailed,

    #[error("Session has no email address")]
    MissingEmail,

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
