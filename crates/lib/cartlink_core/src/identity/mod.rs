//! Cross-system identity: commerce customer provisioning and the durable link
//! between a profile and its commerce identity.
//!
//! - [`credentials::CredentialResolver`]: password grant with one fallback secret
//! - [`registry::CustomerRegistry`]: ensure a commerce customer exists and authenticate it
//! - [`linker::IdentityLinker`]: upsert the profile ↔ customer link row

pub mod credentials;
pub mod linker;
pub mod registry;

use thiserror::Error;

use crate::store::StoreError;

/// Identity-link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No profile found for {0}")]
    ProfileNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
