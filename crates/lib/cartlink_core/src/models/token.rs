//! Access/refresh token pairs and their cached form.

use chrono::{DateTime, Utc};

/// Token pair minted by the commerce provider.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// In-memory cache entry for a user's active token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub user_id: String,
    pub tokens: TokenPair,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// A cached token is usable only for its own user and before expiry.
    pub fn is_valid_for(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.user_id == user_id && now < self.expires_at
    }
}

/// Where `get_valid_access_token` obtained its token from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Cache,
    Refresh,
    Provisioned,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Cache => "cache",
            TokenSource::Refresh => "refresh",
            TokenSource::Provisioned => "provisioned",
        }
    }
}

/// Successful outcome of a lifecycle invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub access_token: String,
    pub source: TokenSource,
}
