//! Password-grant authentication for commerce customers.
//!
//! Customers may have been provisioned under either of two shared secrets.
//! The primary secret is tried first; on an authentication error the fallback
//! (if configured) is tried exactly once.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::commerce::types::TokenResponse;
use crate::commerce::{CommerceError, CommerceProvider, TokenGrant, normalize_email};
use crate::config::CommerceConfig;
use crate::models::token::TokenPair;

#[derive(Clone)]
pub struct CredentialResolver {
    config: Arc<CommerceConfig>,
    commerce: Arc<dyn CommerceProvider>,
}

impl CredentialResolver {
    pub fn new(config: Arc<CommerceConfig>, commerce: Arc<dyn CommerceProvider>) -> Self {
        Self { config, commerce }
    }

    async fn attempt(&self, username: &str, password: &str) -> Result<TokenResponse, CommerceError> {
        self.commerce
            .token(TokenGrant::Password {
                client_id: &self.config.commerce_client_id,
                scope: &self.config.commerce_scope,
                username,
                password,
            })
            .await
    }

    /// Authenticate `email` with the provisioning secrets.
    ///
    /// Returns [`CommerceError::AuthenticationFailed`] once every permitted
    /// attempt has been rejected. Transport errors are returned as-is and do
    /// not trigger the fallback.
    pub async fn resolve_password_grant(&self, email: &str) -> Result<TokenPair, CommerceError> {
        let username = normalize_email(email);

        let primary = self
            .attempt(&username, &self.config.primary_provision_secret)
            .await?;
        if let Some(pair) = primary.token_pair() {
            return Ok(pair);
        }

        if primary.is_auth_error()
            && let Some(fallback) = self.config.fallback_provision_secret.as_deref()
        {
            debug!("primary secret rejected, retrying with fallback secret");
            let second = self.attempt(&username, fallback).await?;
            if let Some(pair) = second.token_pair() {
                return Ok(pair);
            }
        }

        warn!("customer password grant rejected");
        Err(CommerceError::AuthenticationFailed)
    }
}
