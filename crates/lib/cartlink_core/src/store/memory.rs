//! In-process [`LinkStore`] with the same uniqueness rules as the Postgres
//! schema. Every operation runs under one lock, so upserts are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{LinkStore, StoreError, new_link_id};
use crate::models::link::{LinkKey, LinkUpsert, LinkWrite, LookupKind, ServiceBrandAppLink};
use crate::models::profile::{Profile, ProfileUpdate};

#[derive(Debug, Default)]
struct Tables {
    lookups: HashMap<(LookupKind, String), String>,
    /// Keyed by `auth_user_id`.
    profiles: HashMap<String, Profile>,
    links: HashMap<LinkKey, ServiceBrandAppLink>,
}

/// Link store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    tables: Mutex<Tables>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored link rows.
    pub async fn link_count(&self) -> usize {
        self.tables.lock().await.links.len()
    }

    /// All stored link rows, in no particular order.
    pub async fn links(&self) -> Vec<ServiceBrandAppLink> {
        self.tables.lock().await.links.values().cloned().collect()
    }
}

fn new_profile(auth_user_id: &str, email: &str) -> Profile {
    Profile {
        id: uuid::Uuid::new_v4().to_string(),
        auth_user_id: auth_user_id.to_string(),
        email: email.trim().to_string(),
        first_name: None,
        last_name: None,
        phone: None,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn ensure_lookup(&self, kind: LookupKind, name: &str) -> Result<String, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = tables
            .lookups
            .entry((kind, name.to_string()))
            .or_insert_with(|| uuid::Uuid::new_v4().to_string());
        Ok(id.clone())
    }

    async fn find_profile_by_auth_user_id(
        &self,
        auth_user_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        Ok(self.tables.lock().await.profiles.get(auth_user_id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let wanted = email.trim().to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .values()
            .filter(|p| p.email.to_lowercase() == wanted)
            .max_by_key(|p| p.updated_at)
            .cloned())
    }

    async fn ensure_profile(
        &self,
        auth_user_id: &str,
        email: &str,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .entry(auth_user_id.to_string())
            .or_insert_with(|| new_profile(auth_user_id, email));
        Ok(profile.clone())
    }

    async fn update_profile(
        &self,
        auth_user_id: &str,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .entry(auth_user_id.to_string())
            .or_insert_with(|| new_profile(auth_user_id, email));

        profile.email = email.trim().to_string();
        if let Some(first_name) = &update.first_name {
            profile.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &update.last_name {
            profile.last_name = Some(last_name.clone());
        }
        if let Some(phone) = &update.phone {
            profile.phone = Some(phone.clone());
        }
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn find_link(&self, key: &LinkKey) -> Result<Option<ServiceBrandAppLink>, StoreError> {
        Ok(self.tables.lock().await.links.get(key).cloned())
    }

    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<LinkWrite, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        if let Some(existing) = tables.links.get_mut(&upsert.key) {
            existing.external_customer_id = upsert.external_customer_id.clone();
            if upsert.refresh_token.is_some() {
                existing.refresh_token = upsert.refresh_token.clone();
            }
            existing.metadata = upsert.metadata.clone();
            existing.updated_at = now;
            return Ok(LinkWrite::Updated);
        }

        tables.links.insert(
            upsert.key.clone(),
            ServiceBrandAppLink {
                id: new_link_id().to_string(),
                profile_id: upsert.key.profile_id.clone(),
                service_id: upsert.key.service_id.clone(),
                brand_id: upsert.key.brand_id.clone(),
                app_id: upsert.key.app_id.clone(),
                external_customer_id: upsert.external_customer_id.clone(),
                refresh_token: upsert.refresh_token.clone(),
                metadata: upsert.metadata.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(LinkWrite::Inserted)
    }
}
