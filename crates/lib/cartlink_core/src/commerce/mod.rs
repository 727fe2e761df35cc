//! Commerce-provider access.
//!
//! [`CommerceProvider`] is the seam between the identity components and the
//! remote commerce service: one OAuth-style token endpoint plus the customer
//! resource. [`client::HttpCommerceClient`] is the production implementation.

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use types::{CommerceCustomer, TokenResponse};

/// Commerce-provider errors.
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Commerce provider HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Customer authentication failed")]
    AuthenticationFailed,
}

/// Grant requested from the token endpoint.
#[derive(Clone, Copy)]
pub enum TokenGrant<'a> {
    /// App-level token for administrative customer calls.
    ClientCredentials {
        client_id: &'a str,
        client_secret: &'a str,
    },
    /// Resource-owner password grant for a customer.
    Password {
        client_id: &'a str,
        scope: &'a str,
        username: &'a str,
        password: &'a str,
    },
    /// Exchange of a stored customer refresh token.
    RefreshToken {
        client_id: &'a str,
        scope: &'a str,
        refresh_token: &'a str,
    },
}

impl TokenGrant<'_> {
    /// OAuth `grant_type` value.
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::ClientCredentials { .. } => "client_credentials",
            TokenGrant::Password { .. } => "password",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form parameters sent to the token endpoint.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("grant_type", self.grant_type())];
        match *self {
            TokenGrant::ClientCredentials {
                client_id,
                client_secret,
            } => {
                params.push(("client_id", client_id));
                params.push(("client_secret", client_secret));
            }
            TokenGrant::Password {
                client_id,
                scope,
                username,
                password,
            } => {
                params.push(("client_id", client_id));
                params.push(("scope", scope));
                params.push(("username", username));
                params.push(("password", password));
            }
            TokenGrant::RefreshToken {
                client_id,
                scope,
                refresh_token,
            } => {
                params.push(("client_id", client_id));
                params.push(("scope", scope));
                params.push(("refresh_token", refresh_token));
            }
        }
        params
    }
}

impl std::fmt::Debug for TokenGrant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Remote commerce service.
///
/// Token calls return the decoded body even for rejected credentials so that
/// callers can inspect `errors`; only transport and decode failures are `Err`.
/// Customer calls map any non-2xx response to [`CommerceError::Http`].
#[async_trait]
pub trait CommerceProvider: Send + Sync {
    /// Call the token endpoint.
    async fn token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, CommerceError>;

    /// Find the customer whose email equals `email`.
    async fn find_customer_by_email(
        &self,
        app_token: &str,
        email: &str,
    ) -> Result<Option<CommerceCustomer>, CommerceError>;

    /// Create a customer, returning its id.
    async fn create_customer(
        &self,
        app_token: &str,
        email: &str,
        password: &str,
    ) -> Result<String, CommerceError>;

    /// Replace the password of an existing customer.
    async fn update_customer_password(
        &self,
        app_token: &str,
        customer_id: &str,
        password: &str,
    ) -> Result<(), CommerceError>;
}

/// Canonical form of an email for commerce lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
