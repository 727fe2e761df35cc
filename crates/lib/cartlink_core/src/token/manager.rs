//! Token lifecycle manager.
//!
//! `get_valid_access_token` walks three phases for a user:
//!
//! 1. **cache**: an unexpired cached token is returned with no remote calls.
//! 2. **refresh**: the stored refresh token is exchanged; a rotated refresh
//!    token is written back through the linker.
//! 3. **provision**: the customer is ensured and authenticated from scratch,
//!    then linked.
//!
//! Everything after the cache check runs under a per-user guard, so
//! concurrent callers for one user wait for the first and then reuse its
//! cached result.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TokenError;
use super::cache::TokenCache;
use crate::commerce::{CommerceProvider, TokenGrant};
use crate::config::CommerceConfig;
use crate::identity::linker::IdentityLinker;
use crate::identity::registry::CustomerRegistry;
use crate::models::link::ServiceBrandAppLink;
use crate::models::profile::{Profile, ProfileUpdate, Session};
use crate::models::token::{AccessGrant, TokenPair, TokenSource};
use crate::store::LinkStore;

pub struct TokenManager {
    config: Arc<CommerceConfig>,
    commerce: Arc<dyn CommerceProvider>,
    cache: Arc<TokenCache>,
    registry: CustomerRegistry,
    linker: IdentityLinker,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

/// Handle on a user's entry in `in_flight`. Dropping the last handle removes
/// the entry, including when the owning future is cancelled.
struct Flight<'a> {
    in_flight: &'a DashMap<String, Arc<Mutex<()>>>,
    user_id: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // Two owners left means the map and this handle.
        self.in_flight
            .remove_if(self.user_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl TokenManager {
    pub fn new(
        config: Arc<CommerceConfig>,
        commerce: Arc<dyn CommerceProvider>,
        store: Arc<dyn LinkStore>,
    ) -> Self {
        Self {
            cache: Arc::new(TokenCache::new(config.cache_policy)),
            registry: CustomerRegistry::new(config.clone(), commerce.clone()),
            linker: IdentityLinker::new(config.clone(), store),
            config,
            commerce,
            in_flight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn registry(&self) -> &CustomerRegistry {
        &self.registry
    }

    pub fn linker(&self) -> &IdentityLinker {
        &self.linker
    }

    /// Valid commerce access token for the user, or `None` after a logged
    /// failure. Failures are not remembered; the next call starts over.
    pub async fn get_valid_access_token(&self, profile_user_id: &str, email: &str) -> Option<String> {
        match self.acquire(profile_user_id, email).await {
            Ok(grant) => Some(grant.access_token),
            Err(e) => {
                warn!(user_id = profile_user_id, error = %e, "no valid commerce access token");
                None
            }
        }
    }

    /// Like [`Self::get_valid_access_token`], reporting where the token came from.
    pub async fn acquire(&self, profile_user_id: &str, email: &str) -> Result<AccessGrant, TokenError> {
        if let Some(grant) = self.cached(profile_user_id) {
            return Ok(grant);
        }
        if email.trim().is_empty() {
            return Err(TokenError::MissingEmail);
        }

        let flight = self.flight(profile_user_id);
        let _held = flight.lock.lock().await;
        match self.cached(profile_user_id) {
            Some(grant) => Ok(grant),
            None => self.refresh_or_provision(profile_user_id, email).await,
        }
    }

    fn cached(&self, user_id: &str) -> Option<AccessGrant> {
        let hit = self.cache.get(user_id)?;
        debug!(user_id, phase = "cache", "cached commerce token is valid");
        Some(AccessGrant {
            access_token: hit.tokens.access_token,
            source: TokenSource::Cache,
        })
    }

    fn flight<'a>(&'a self, user_id: &'a str) -> Flight<'a> {
        let lock = self
            .in_flight
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Flight {
            in_flight: &self.in_flight,
            user_id,
            lock,
        }
    }

    async fn refresh_or_provision(&self, user_id: &str, email: &str) -> Result<AccessGrant, TokenError> {
        if let Some(pair) = self.refresh_attempt(user_id, email).await {
            return Ok(AccessGrant {
                access_token: pair.access_token,
                source: TokenSource::Refresh,
            });
        }
        let pair = self.full_provision(user_id, email).await?;
        Ok(AccessGrant {
            access_token: pair.access_token,
            source: TokenSource::Provisioned,
        })
    }

    /// Exchange the stored refresh token. `None` means fall through to provisioning.
    async fn refresh_attempt(&self, user_id: &str, email: &str) -> Option<TokenPair> {
        let service = self.config.service_name.as_str();
        let link = match self.linker.stored_link(user_id, service).await {
            Ok(link) => link?,
            Err(e) => {
                warn!(user_id, phase = "refresh", error = %e, "stored link lookup failed");
                return None;
            }
        };
        let stored_refresh = link.refresh_token.as_deref().filter(|t| !t.is_empty())?;
        if link.external_customer_id.is_empty() {
            return None;
        }

        let response = self
            .commerce
            .token(TokenGrant::RefreshToken {
                client_id: &self.config.commerce_client_id,
                scope: &self.config.commerce_scope,
                refresh_token: stored_refresh,
            })
            .await;
        let granted = match response {
            Ok(response) => response.token_pair(),
            Err(e) => {
                warn!(user_id, phase = "refresh", error = %e, "refresh grant failed");
                None
            }
        };
        let Some(fresh) = granted else {
            debug!(user_id, phase = "refresh", "refresh token rejected");
            return None;
        };

        let pair = TokenPair {
            access_token: fresh.access_token,
            refresh_token: fresh
                .refresh_token
                .clone()
                .or_else(|| Some(stored_refresh.to_string())),
        };
        self.cache.put(user_id, pair.clone(), self.config.token_ttl);

        if let Some(rotated) = fresh.refresh_token.as_deref()
            && rotated != stored_refresh
        {
            debug!(user_id, phase = "refresh", "refresh token rotated");
            self.linker
                .link_identity(user_id, email, service, &link.external_customer_id, Some(rotated))
                .await;
        }

        info!(user_id, customer_id = %link.external_customer_id, phase = "refresh", "commerce token refreshed");
        Some(pair)
    }

    async fn full_provision(&self, user_id: &str, email: &str) -> Result<TokenPair, TokenError> {
        let ensured = self.registry.ensure_customer(email, user_id, None).await;
        let Some((customer_id, pair)) = ensured.into_authenticated() else {
            warn!(user_id, phase = "provision", "commerce provisioning failed");
            return Err(TokenError::AuthenticationFailed);
        };

        self.cache.put(user_id, pair.clone(), self.config.token_ttl);
        self.linker
            .link_identity(
                user_id,
                email,
                &self.config.service_name,
                &customer_id,
                pair.refresh_token.as_deref(),
            )
            .await;

        info!(user_id, customer_id = %customer_id, phase = "provision", "commerce customer provisioned");
        Ok(pair)
    }

    /// Start a commerce session for a freshly signed-in user, creating their
    /// profile on first sign-in.
    pub async fn sign_in(&self, session: &Session) -> Result<AccessGrant, TokenError> {
        if session.email.trim().is_empty() {
            return Err(TokenError::MissingEmail);
        }
        self.linker
            .store()
            .ensure_profile(&session.user_id, &session.email)
            .await?;
        self.acquire(&session.user_id, &session.email).await
    }

    /// Forget the cached token for a user whose session ended.
    pub fn sign_out(&self, user_id: &str) -> bool {
        let removed = self.cache.invalidate(user_id);
        debug!(user_id, removed, "commerce session cleared");
        removed
    }

    pub async fn update_profile(
        &self,
        session: &Session,
        update: &ProfileUpdate,
    ) -> Result<Profile, TokenError> {
        Ok(self
            .linker
            .store()
            .update_profile(&session.user_id, &session.email, update)
            .await?)
    }

    /// Stored link row for the configured service.
    pub async fn stored_link(&self, user_id: &str) -> Result<Option<ServiceBrandAppLink>, TokenError> {
        Ok(self
            .linker
            .stored_link(user_id, &self.config.service_name)
            .await?)
    }
}
