//! Durable store for profiles, lookup entities and identity links.
//!
//! [`LinkStore`] is the seam the identity components talk to.
//! [`postgres::PgLinkStore`] is the production implementation;
//! [`memory::MemoryLinkStore`] keeps everything in-process.

pub mod memory;
pub mod postgres;
pub mod secrets;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::link::{LinkKey, LinkUpsert, LinkWrite, LookupKind, ServiceBrandAppLink};
use crate::models::profile::{Profile, ProfileUpdate};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Persistence operations needed by the identity linker and lifecycle manager.
///
/// Implementations must keep lookup names unique per kind, profiles unique
/// per `auth_user_id` and links unique per [`LinkKey`].
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Return the id of the named lookup entity, creating it if absent.
    async fn ensure_lookup(&self, kind: LookupKind, name: &str) -> Result<String, StoreError>;

    async fn find_profile_by_auth_user_id(
        &self,
        auth_user_id: &str,
    ) -> Result<Option<Profile>, StoreError>;

    /// Case-insensitive lookup by email.
    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError>;

    /// Return the profile for `auth_user_id`, creating it if absent.
    async fn ensure_profile(&self, auth_user_id: &str, email: &str)
    -> Result<Profile, StoreError>;

    /// Apply settings to the profile for `auth_user_id`, creating it if absent.
    async fn update_profile(
        &self,
        auth_user_id: &str,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError>;

    async fn find_link(&self, key: &LinkKey) -> Result<Option<ServiceBrandAppLink>, StoreError>;

    /// Insert or update the link row for `upsert.key` atomically.
    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<LinkWrite, StoreError>;
}

/// Id for a new link row. v7, so link ids sort by creation time; profiles and
/// lookup entities take `gen_random_uuid()` defaults instead.
pub(crate) fn new_link_id() -> Uuid {
    Uuid::now_v7()
}
