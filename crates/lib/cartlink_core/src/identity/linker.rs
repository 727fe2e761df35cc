//! Durable profile ↔ commerce customer links.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::LinkError;
use crate::commerce::normalize_email;
use crate::config::CommerceConfig;
use crate::models::link::{LinkKey, LinkUpsert, LinkWrite, LookupKind, ServiceBrandAppLink};
use crate::store::LinkStore;

/// Writes link rows for the configured brand and app.
///
/// Lookup entity ids and profile ids are memoized for the lifetime of the
/// linker; both are immutable once created. Profile ids are keyed by the
/// owning auth user, never by email, since a profile's email can change.
pub struct IdentityLinker {
    config: Arc<CommerceConfig>,
    store: Arc<dyn LinkStore>,
    lookups: DashMap<(LookupKind, String), String>,
    /// Auth user id → profile id.
    profile_ids: DashMap<String, String>,
}

impl IdentityLinker {
    pub fn new(config: Arc<CommerceConfig>, store: Arc<dyn LinkStore>) -> Self {
        Self {
            config,
            store,
            lookups: DashMap::new(),
            profile_ids: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    async fn lookup_id(&self, kind: LookupKind, name: &str) -> Result<String, LinkError> {
        let cache_key = (kind, name.to_string());
        if let Some(id) = self.lookups.get(&cache_key) {
            return Ok(id.clone());
        }
        let id = self.store.ensure_lookup(kind, name).await?;
        self.lookups.insert(cache_key, id.clone());
        Ok(id)
    }

    /// Link key for `profile_id` under `service_name` and the configured brand/app.
    pub async fn link_key(&self, profile_id: &str, service_name: &str) -> Result<LinkKey, LinkError> {
        Ok(LinkKey {
            profile_id: profile_id.to_string(),
            service_id: self.lookup_id(LookupKind::Service, service_name).await?,
            brand_id: self.lookup_id(LookupKind::Brand, &self.config.brand_name).await?,
            app_id: self.lookup_id(LookupKind::App, &self.config.app_name).await?,
        })
    }

    /// Resolve the profile id for `email`, accepting only a profile owned by
    /// `profile_user_id`.
    pub async fn profile_id_for_user(
        &self,
        profile_user_id: &str,
        email: &str,
    ) -> Result<String, LinkError> {
        if let Some(id) = self.profile_ids.get(profile_user_id) {
            return Ok(id.clone());
        }

        let normalized = normalize_email(email);
        let profile = match self.store.find_profile_by_email(&normalized).await? {
            Some(profile) if profile.auth_user_id == profile_user_id => profile,
            other => {
                if let Some(foreign) = other {
                    debug!(
                        user_id = profile_user_id,
                        owner = %foreign.auth_user_id,
                        "email belongs to another user's profile"
                    );
                }
                self.store
                    .find_profile_by_auth_user_id(profile_user_id)
                    .await?
                    .filter(|own| normalize_email(&own.email) == normalized)
                    .ok_or_else(|| LinkError::ProfileNotFound(normalized.clone()))?
            }
        };

        self.profile_ids
            .insert(profile_user_id.to_string(), profile.id.clone());
        Ok(profile.id)
    }

    /// Stored link row for the profile owned by `auth_user_id`, if any.
    pub async fn stored_link(
        &self,
        auth_user_id: &str,
        service_name: &str,
    ) -> Result<Option<ServiceBrandAppLink>, LinkError> {
        let Some(profile) = self.store.find_profile_by_auth_user_id(auth_user_id).await? else {
            return Ok(None);
        };
        let key = self.link_key(&profile.id, service_name).await?;
        Ok(self.store.find_link(&key).await?)
    }

    /// Insert or update the link row for the profile of `profile_user_id`
    /// registered under `email`.
    ///
    /// A `None` refresh token leaves any stored one in place.
    pub async fn try_link_identity(
        &self,
        profile_user_id: &str,
        email: &str,
        service_name: &str,
        external_id: &str,
        refresh_token: Option<&str>,
    ) -> Result<LinkWrite, LinkError> {
        let profile_id = self.profile_id_for_user(profile_user_id, email).await?;
        let key = self.link_key(&profile_id, service_name).await?;

        let metadata = serde_json::json!({
            "service_type": service_name,
            "created_via": "token_lifecycle",
            "user_email": email.trim(),
            "auth_user_id": profile_user_id,
            "last_updated": Utc::now().to_rfc3339(),
        });

        let write = self
            .store
            .upsert_link(&LinkUpsert {
                key,
                external_customer_id: external_id.to_string(),
                refresh_token: refresh_token.map(str::to_string),
                metadata,
            })
            .await?;

        debug!(
            user_id = profile_user_id,
            customer_id = external_id,
            service = service_name,
            ?write,
            "identity link stored"
        );
        Ok(write)
    }

    /// Best-effort [`Self::try_link_identity`]: failures are logged, not returned.
    pub async fn link_identity(
        &self,
        profile_user_id: &str,
        email: &str,
        service_name: &str,
        external_id: &str,
        refresh_token: Option<&str>,
    ) -> Option<LinkWrite> {
        match self
            .try_link_identity(profile_user_id, email, service_name, external_id, refresh_token)
            .await
        {
            Ok(write) => Some(write),
            Err(e) => {
                warn!(
                    user_id = profile_user_id,
                    customer_id = external_id,
                    service = service_name,
                    error = %e,
                    "identity link persistence failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryLinkStore;
    use std::collections::HashMap;

    fn config() -> Arc<CommerceConfig> {
        let env: HashMap<&str, &str> = HashMap::from([
            ("COMMERCE_BASE_URL", "https://shop.example.com"),
            ("COMMERCE_CLIENT_ID", "sales-channel"),
            ("COMMERCE_SCOPE", "market:1"),
            ("COMMERCE_INTEGRATION_CLIENT_ID", "integration"),
            ("COMMERCE_INTEGRATION_CLIENT_SECRET", "integration-secret"),
            ("COMMERCE_PRIMARY_PROVISION_SECRET", "primary"),
            ("BRAND_NAME", "acme"),
            ("APP_NAME", "storefront"),
        ]);
        Arc::new(CommerceConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap())
    }

    #[tokio::test]
    async fn missing_profile_is_an_explicit_error() {
        let linker = IdentityLinker::new(config(), Arc::new(MemoryLinkStore::new()));
        let err = linker
            .try_link_identity("auth-1", "ghost@example.com", "commercelayer", "cus_1", Some("rt"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::ProfileNotFound(email) if email == "ghost@example.com"));
        assert!(
            linker
                .link_identity("auth-1", "ghost@example.com", "commercelayer", "cus_1", None)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn second_link_updates_the_same_row() {
        let store = Arc::new(MemoryLinkStore::new());
        store.ensure_profile("auth-1", "a@example.com").await.unwrap();
        let linker = IdentityLinker::new(config(), store.clone());

        let first = linker
            .try_link_identity("auth-1", "A@example.com", "commercelayer", "cus_1", Some("rt1"))
            .await
            .unwrap();
        let second = linker
            .try_link_identity("auth-1", "a@example.com", "commercelayer", "cus_1", Some("rt2"))
            .await
            .unwrap();

        assert_eq!(first, LinkWrite::Inserted);
        assert_eq!(second, LinkWrite::Updated);
        assert_eq!(store.link_count().await, 1);

        let link = linker.stored_link("auth-1", "commercelayer").await.unwrap().unwrap();
        assert_eq!(link.refresh_token.as_deref(), Some("rt2"));
        assert_eq!(link.metadata["created_via"], "token_lifecycle");
        assert_eq!(link.metadata["auth_user_id"], "auth-1");
    }

    #[tokio::test]
    async fn services_get_separate_rows() {
        let store = Arc::new(MemoryLinkStore::new());
        store.ensure_profile("auth-1", "a@example.com").await.unwrap();
        let linker = IdentityLinker::new(config(), store.clone());

        linker
            .try_link_identity("auth-1", "a@example.com", "commercelayer", "cus_1", None)
            .await
            .unwrap();
        linker
            .try_link_identity("auth-1", "a@example.com", "loyalty", "mem_1", None)
            .await
            .unwrap();
        assert_eq!(store.link_count().await, 2);
    }

    #[tokio::test]
    async fn profile_with_email_of_another_user_is_not_linked() {
        let store = Arc::new(MemoryLinkStore::new());
        store.ensure_profile("auth-1", "shared@example.com").await.unwrap();
        let linker = IdentityLinker::new(config(), store.clone());

        let err = linker
            .try_link_identity("auth-2", "shared@example.com", "commercelayer", "cus_2", Some("rt"))
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::ProfileNotFound(_)));
        assert_eq!(store.link_count().await, 0);
    }

    #[tokio::test]
    async fn cached_profile_id_follows_the_user_not_the_email() {
        let store = Arc::new(MemoryLinkStore::new());
        store.ensure_profile("auth-1", "shared@example.com").await.unwrap();
        let linker = IdentityLinker::new(config(), store.clone());
        linker
            .try_link_identity("auth-1", "shared@example.com", "commercelayer", "cus_1", Some("rt1"))
            .await
            .unwrap();

        store
            .update_profile("auth-1", "moved@example.com", &Default::default())
            .await
            .unwrap();
        store.ensure_profile("auth-2", "shared@example.com").await.unwrap();
        linker
            .try_link_identity("auth-2", "shared@example.com", "commercelayer", "cus_2", Some("rt2"))
            .await
            .unwrap();

        assert_eq!(store.link_count().await, 2);
        let first = linker.stored_link("auth-1", "commercelayer").await.unwrap().unwrap();
        let second = linker.stored_link("auth-2", "commercelayer").await.unwrap().unwrap();
        assert_eq!(first.refresh_token.as_deref(), Some("rt1"));
        assert_eq!(first.metadata["auth_user_id"], "auth-1");
        assert_eq!(second.external_customer_id, "cus_2");
        assert_ne!(first.profile_id, second.profile_id);
    }

    #[tokio::test]
    async fn stored_link_is_none_without_profile() {
        let linker = IdentityLinker::new(config(), Arc::new(MemoryLinkStore::new()));
        assert!(linker.stored_link("nobody", "commercelayer").await.unwrap().is_none());
    }
}
