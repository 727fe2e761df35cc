//! Commerce-link configuration.
//!
//! All values are read once at process start and shared immutably behind an
//! `Arc` by every component.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Default lifetime of a freshly cached access token: 30 minutes.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Default I/O bound for a single commerce-provider call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Service name recorded on link rows when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "commercelayer";

/// Brand/app name used when none is configured.
pub const DEFAULT_ENTITY_NAME: &str = "default";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// What to do with the password of a commerce customer that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRotation {
    /// Reset the password on every ensure call (observed legacy behavior).
    Always,
    /// Only set a password when the customer is created.
    OnCreate,
}

impl PasswordRotation {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "always" => Some(Self::Always),
            "on-create" | "on_create" | "oncreate" => Some(Self::OnCreate),
            _ => None,
        }
    }
}

/// How the token cache partitions entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// One entry per user, each with its own expiry.
    PerUser,
    /// A single global slot; caching for one user evicts any other user.
    SingleSlot,
}

impl CachePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per-user" | "per_user" | "peruser" => Some(Self::PerUser),
            "single-slot" | "single_slot" | "singleslot" => Some(Self::SingleSlot),
            _ => None,
        }
    }
}

/// Immutable configuration for the commerce provider and link bookkeeping.
#[derive(Clone)]
pub struct CommerceConfig {
    /// Base URL of the commerce provider, e.g. `https://acme.commercelayer.io`.
    pub commerce_base_url: String,
    /// Sales-channel client id used for customer grants.
    pub commerce_client_id: String,
    /// Market scope sent with customer grants.
    pub commerce_scope: String,
    /// Integration client id (administrative `client_credentials`).
    pub integration_client_id: String,
    pub integration_client_secret: String,
    /// Shared password customers are provisioned with.
    pub primary_provision_secret: String,
    /// Password from the older provisioning scheme, tried once on auth failure.
    pub fallback_provision_secret: Option<String>,
    pub brand_name: String,
    pub app_name: String,
    /// Service name recorded on link rows.
    pub service_name: String,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    pub password_rotation: PasswordRotation,
    pub cache_policy: CachePolicy,
}

impl CommerceConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                              | Default          |
    /// |---------------------------------------|------------------|
    /// | `COMMERCE_BASE_URL`                   | required         |
    /// | `COMMERCE_CLIENT_ID`                  | required         |
    /// | `COMMERCE_SCOPE`                      | required         |
    /// | `COMMERCE_INTEGRATION_CLIENT_ID`      | required         |
    /// | `COMMERCE_INTEGRATION_CLIENT_SECRET`  | required         |
    /// | `COMMERCE_PRIMARY_PROVISION_SECRET`   | required         |
    /// | `COMMERCE_FALLBACK_PROVISION_SECRET`  | unset            |
    /// | `BRAND_NAME`                          | `default`        |
    /// | `APP_NAME`                            | `default`        |
    /// | `COMMERCE_SERVICE_NAME`               | `commercelayer`  |
    /// | `COMMERCE_TOKEN_TTL_SECS`             | `1800`           |
    /// | `COMMERCE_REQUEST_TIMEOUT_SECS`       | `15`             |
    /// | `COMMERCE_PASSWORD_ROTATION`          | `always`         |
    /// | `TOKEN_CACHE_POLICY`                  | `per-user`       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let commerce_base_url = required("COMMERCE_BASE_URL")?;
        url::Url::parse(&commerce_base_url).map_err(|e| ConfigError::Invalid {
            var: "COMMERCE_BASE_URL",
            reason: e.to_string(),
        })?;

        let token_ttl = match get("COMMERCE_TOKEN_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("COMMERCE_TOKEN_TTL_SECS", &raw)?),
            None => DEFAULT_TOKEN_TTL,
        };
        let request_timeout = match get("COMMERCE_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                Duration::from_secs(parse_secs("COMMERCE_REQUEST_TIMEOUT_SECS", &raw)?)
            }
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let password_rotation = match get("COMMERCE_PASSWORD_ROTATION") {
            Some(raw) => PasswordRotation::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "COMMERCE_PASSWORD_ROTATION",
                reason: format!("expected 'always' or 'on-create', got '{raw}'"),
            })?,
            None => PasswordRotation::Always,
        };
        let cache_policy = match get("TOKEN_CACHE_POLICY") {
            Some(raw) => CachePolicy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "TOKEN_CACHE_POLICY",
                reason: format!("expected 'per-user' or 'single-slot', got '{raw}'"),
            })?,
            None => CachePolicy::PerUser,
        };

        Ok(Self {
            commerce_base_url,
            commerce_client_id: required("COMMERCE_CLIENT_ID")?,
            commerce_scope: required("COMMERCE_SCOPE")?,
            integration_client_id: required("COMMERCE_INTEGRATION_CLIENT_ID")?,
            integration_client_secret: required("COMMERCE_INTEGRATION_CLIENT_SECRET")?,
            primary_provision_secret: required("COMMERCE_PRIMARY_PROVISION_SECRET")?,
            fallback_provision_secret: get("COMMERCE_FALLBACK_PROVISION_SECRET"),
            brand_name: get("BRAND_NAME").unwrap_or_else(|| DEFAULT_ENTITY_NAME.to_string()),
            app_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_ENTITY_NAME.to_string()),
            service_name: get("COMMERCE_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            token_ttl,
            request_timeout,
            password_rotation,
            cache_policy,
        })
    }
}

/// Whole seconds, at least one.
fn parse_secs(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be at least 1 second".into(),
        });
    }
    Ok(secs)
}

// Secrets stay out of logs.
impl fmt::Debug for CommerceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommerceConfig")
            .field("commerce_base_url", &self.commerce_base_url)
            .field("commerce_client_id", &self.commerce_client_id)
            .field("commerce_scope", &self.commerce_scope)
            .field("integration_client_id", &self.integration_client_id)
            .field("integration_client_secret", &"<redacted>")
            .field("primary_provision_secret", &"<redacted>")
            .field(
                "fallback_provision_secret",
                &self.fallback_provision_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("brand_name", &self.brand_name)
            .field("app_name", &self.app_name)
            .field("service_name", &self.service_name)
            .field("token_ttl", &self.token_ttl)
            .field("request_timeout", &self.request_timeout)
            .field("password_rotation", &self.password_rotation)
            .field("cache_policy", &self.cache_policy)
            .finish()
    }
}
