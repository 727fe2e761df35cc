//! Shared fixtures: a scripted commerce provider and a call-counting store.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cartlink_core::commerce::types::{CommerceCustomer, TokenResponse};
use cartlink_core::commerce::{CommerceError, CommerceProvider, TokenGrant};
use cartlink_core::config::CommerceConfig;
use cartlink_core::models::link::{LinkKey, LinkUpsert, LinkWrite, LookupKind, ServiceBrandAppLink};
use cartlink_core::models::profile::{Profile, ProfileUpdate};
use cartlink_core::store::memory::MemoryLinkStore;
use cartlink_core::store::{LinkStore, StoreError};
use cartlink_core::token::TokenManager;

pub const PRIMARY: &str = "primary-secret";
pub const FALLBACK: &str = "fallback-secret";
pub const SERVICE: &str = "commercelayer";

pub fn config_with(overrides: &[(&'static str, &'static str)]) -> Arc<CommerceConfig> {
    let mut env: HashMap<&str, &str> = HashMap::from([
        ("COMMERCE_BASE_URL", "https://shop.example.com"),
        ("COMMERCE_CLIENT_ID", "sales-channel"),
        ("COMMERCE_SCOPE", "market:1"),
        ("COMMERCE_INTEGRATION_CLIENT_ID", "integration"),
        ("COMMERCE_INTEGRATION_CLIENT_SECRET", "integration-secret"),
        ("COMMERCE_PRIMARY_PROVISION_SECRET", PRIMARY),
        ("BRAND_NAME", "acme"),
        ("APP_NAME", "storefront"),
    ]);
    env.extend(overrides.iter().copied());
    Arc::new(
        CommerceConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))
            .expect("test config"),
    )
}

pub fn config() -> Arc<CommerceConfig> {
    config_with(&[])
}

/// How the fake answers `refresh_token` grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// New access token and a new refresh token.
    Rotate,
    /// New access token, same refresh token echoed back.
    Echo,
    Reject,
}

/// Customer endpoints that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomerCall {
    Find,
    Create,
    UpdatePassword,
}

#[derive(Debug, Clone)]
struct FakeCustomer {
    id: String,
    password: Option<String>,
}

#[derive(Default)]
struct FakeState {
    customers: HashMap<String, FakeCustomer>,
    grants: HashMap<&'static str, usize>,
    passwords_tried: Vec<String>,
    refresh_tokens_seen: Vec<String>,
}

/// In-process commerce provider with call counters.
pub struct FakeCommerce {
    state: Mutex<FakeState>,
    seq: AtomicUsize,
    pub creates: AtomicUsize,
    pub password_updates: AtomicUsize,
    pub lookups: AtomicUsize,
    refresh: Mutex<RefreshBehavior>,
    app_token_down: Mutex<bool>,
    transport_down: Mutex<bool>,
    customer_call_failures: Mutex<HashMap<CustomerCall, u16>>,
    latency: Duration,
}

impl FakeCommerce {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Every call sleeps for `latency` first, widening race windows.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            seq: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            password_updates: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            refresh: Mutex::new(RefreshBehavior::Rotate),
            app_token_down: Mutex::new(false),
            transport_down: Mutex::new(false),
            customer_call_failures: Mutex::new(HashMap::new()),
            latency,
        }
    }

    /// Seed an existing customer.
    pub fn with_customer(self, email: &str, password: Option<&str>) -> Self {
        let id = format!("cus_seed_{}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.state.lock().unwrap().customers.insert(
            email.to_lowercase(),
            FakeCustomer {
                id,
                password: password.map(str::to_string),
            },
        );
        self
    }

    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh.lock().unwrap() = behavior;
    }

    pub fn set_app_token_down(&self, down: bool) {
        *self.app_token_down.lock().unwrap() = down;
    }

    pub fn set_transport_down(&self, down: bool) {
        *self.transport_down.lock().unwrap() = down;
    }

    /// Answer every `call` with a non-2xx `status` from now on.
    pub fn fail_customer_call(&self, call: CustomerCall, status: u16) {
        self.customer_call_failures.lock().unwrap().insert(call, status);
    }

    pub fn grants(&self, grant_type: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .grants
            .get(grant_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        let grants: usize = self.state.lock().unwrap().grants.values().sum();
        grants
            + self.creates.load(Ordering::SeqCst)
            + self.password_updates.load(Ordering::SeqCst)
            + self.lookups.load(Ordering::SeqCst)
    }

    pub fn passwords_tried(&self) -> Vec<String> {
        self.state.lock().unwrap().passwords_tried.clone()
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().refresh_tokens_seen.clone()
    }

    pub fn customer_count(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    pub fn customer_password(&self, email: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .customers
            .get(&email.to_lowercase())
            .and_then(|c| c.password.clone())
    }

    fn next(&self) -> usize {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn io(&self) -> Result<(), CommerceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if *self.transport_down.lock().unwrap() {
            return Err(CommerceError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn customer_call(&self, call: CustomerCall) -> Result<(), CommerceError> {
        match self.customer_call_failures.lock().unwrap().get(&call).copied() {
            Some(status) => Err(CommerceError::Http {
                status,
                body: r#"{"errors":[{"title":"scripted failure"}]}"#.into(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommerceProvider for FakeCommerce {
    async fn token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, CommerceError> {
        self.io().await?;
        *self
            .state
            .lock()
            .unwrap()
            .grants
            .entry(grant.grant_type())
            .or_default() += 1;

        match grant {
            TokenGrant::ClientCredentials { .. } => {
                if *self.app_token_down.lock().unwrap() {
                    Ok(TokenResponse::rejected(401, "invalid client"))
                } else {
                    Ok(TokenResponse::granted("app-token", None))
                }
            }
            TokenGrant::Password {
                username, password, ..
            } => {
                let mut state = self.state.lock().unwrap();
                state.passwords_tried.push(password.to_string());
                let accepted = state
                    .customers
                    .get(username)
                    .and_then(|c| c.password.as_deref())
                    == Some(password);
                drop(state);
                if accepted {
                    let n = self.next();
                    let refresh = format!("refresh-{n}");
                    Ok(TokenResponse::granted(&format!("access-{n}"), Some(refresh.as_str())))
                } else {
                    Ok(TokenResponse::rejected(401, "invalid credentials"))
                }
            }
            TokenGrant::RefreshToken { refresh_token, .. } => {
                self.state
                    .lock()
                    .unwrap()
                    .refresh_tokens_seen
                    .push(refresh_token.to_string());
                let behavior = *self.refresh.lock().unwrap();
                let n = self.next();
                let access = format!("access-{n}");
                let rotated = format!("refresh-{n}");
                Ok(match behavior {
                    RefreshBehavior::Rotate => TokenResponse::granted(&access, Some(rotated.as_str())),
                    RefreshBehavior::Echo => TokenResponse::granted(&access, Some(refresh_token)),
                    RefreshBehavior::Reject => TokenResponse::rejected(400, "invalid refresh token"),
                })
            }
        }
    }

    async fn find_customer_by_email(
        &self,
        _app_token: &str,
        email: &str,
    ) -> Result<Option<CommerceCustomer>, CommerceError> {
        self.io().await?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.customer_call(CustomerCall::Find)?;
        let state = self.state.lock().unwrap();
        Ok(state.customers.get(email).map(|c| CommerceCustomer {
            id: c.id.clone(),
            email: Some(email.to_string()),
            has_password: c.password.is_some(),
        }))
    }

    async fn create_customer(
        &self,
        _app_token: &str,
        email: &str,
        password: &str,
    ) -> Result<String, CommerceError> {
        self.io().await?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.customer_call(CustomerCall::Create)?;
        let id = format!("cus_{}", self.next());
        self.state.lock().unwrap().customers.insert(
            email.to_string(),
            FakeCustomer {
                id: id.clone(),
                password: Some(password.to_string()),
            },
        );
        Ok(id)
    }

    async fn update_customer_password(
        &self,
        _app_token: &str,
        customer_id: &str,
        password: &str,
    ) -> Result<(), CommerceError> {
        self.io().await?;
        self.password_updates.fetch_add(1, Ordering::SeqCst);
        self.customer_call(CustomerCall::UpdatePassword)?;
        let mut state = self.state.lock().unwrap();
        let customer = state
            .customers
            .values_mut()
            .find(|c| c.id == customer_id)
            .ok_or(CommerceError::Http {
                status: 404,
                body: "not found".into(),
            })?;
        customer.password = Some(password.to_string());
        Ok(())
    }
}

/// [`MemoryLinkStore`] wrapper counting every call and every upsert.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryLinkStore,
    pub calls: AtomicUsize,
    pub upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LinkStore for CountingStore {
    async fn ensure_lookup(&self, kind: LookupKind, name: &str) -> Result<String, StoreError> {
        self.hit();
        self.inner.ensure_lookup(kind, name).await
    }

    async fn find_profile_by_auth_user_id(
        &self,
        auth_user_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        self.hit();
        self.inner.find_profile_by_auth_user_id(auth_user_id).await
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        self.hit();
        self.inner.find_profile_by_email(email).await
    }

    async fn ensure_profile(&self, auth_user_id: &str, email: &str) -> Result<Profile, StoreError> {
        self.hit();
        self.inner.ensure_profile(auth_user_id, email).await
    }

    async fn update_profile(
        &self,
        auth_user_id: &str,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        self.hit();
        self.inner.update_profile(auth_user_id, email, update).await
    }

    async fn find_link(&self, key: &LinkKey) -> Result<Option<ServiceBrandAppLink>, StoreError> {
        self.hit();
        self.inner.find_link(key).await
    }

    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<LinkWrite, StoreError> {
        self.hit();
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_link(upsert).await
    }
}

pub struct Harness {
    pub commerce: Arc<FakeCommerce>,
    pub store: Arc<CountingStore>,
    pub manager: Arc<TokenManager>,
}

pub fn harness(commerce: FakeCommerce, config: Arc<CommerceConfig>) -> Harness {
    let commerce = Arc::new(commerce);
    let store = Arc::new(CountingStore::new());
    let manager = Arc::new(TokenManager::new(config, commerce.clone(), store.clone()));
    Harness {
        commerce,
        store,
        manager,
    }
}
