//! Commerce customer provisioning.
//!
//! Makes sure a customer exists for an email, sets its password according to
//! the configured [`PasswordRotation`] policy, then authenticates it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::credentials::CredentialResolver;
use crate::commerce::{CommerceError, CommerceProvider, TokenGrant, normalize_email};
use crate::config::{CommerceConfig, PasswordRotation};
use crate::models::token::TokenPair;

/// Outcome of [`CustomerRegistry::ensure_customer`].
///
/// Failures while obtaining, finding or writing the customer are folded into
/// an empty result; a `None` field always means failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredCustomer {
    pub customer_id: Option<String>,
    pub auth: Option<TokenPair>,
    /// Whether the customer already had a password before this call.
    pub had_password: bool,
}

impl EnsuredCustomer {
    fn failed() -> Self {
        Self {
            customer_id: None,
            auth: None,
            had_password: false,
        }
    }

    /// Customer id and token pair, when both provisioning and authentication
    /// succeeded.
    pub fn into_authenticated(self) -> Option<(String, TokenPair)> {
        Some((self.customer_id?, self.auth?))
    }
}

#[derive(Clone)]
pub struct CustomerRegistry {
    config: Arc<CommerceConfig>,
    commerce: Arc<dyn CommerceProvider>,
    resolver: CredentialResolver,
}

impl CustomerRegistry {
    pub fn new(config: Arc<CommerceConfig>, commerce: Arc<dyn CommerceProvider>) -> Self {
        let resolver = CredentialResolver::new(config.clone(), commerce.clone());
        Self {
            config,
            commerce,
            resolver,
        }
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Ensure a customer exists for `email` and authenticate it.
    ///
    /// `password_for_creation` defaults to the primary provisioning secret.
    pub async fn ensure_customer(
        &self,
        email: &str,
        profile_user_id: &str,
        password_for_creation: Option<&str>,
    ) -> EnsuredCustomer {
        let password =
            password_for_creation.unwrap_or(self.config.primary_provision_secret.as_str());

        let (customer_id, had_password) = match self.provision(email, password).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id = profile_user_id, error = %e, "commerce customer provisioning failed");
                return EnsuredCustomer::failed();
            }
        };

        debug!(
            user_id = profile_user_id,
            customer_id = %customer_id,
            had_password,
            "authenticating commerce customer"
        );
        let auth = match self.resolver.resolve_password_grant(email).await {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(user_id = profile_user_id, customer_id = %customer_id, error = %e, "commerce customer authentication failed");
                None
            }
        };

        EnsuredCustomer {
            customer_id: Some(customer_id),
            auth,
            had_password,
        }
    }

    /// Find or create the customer, returning `(customer_id, had_password)`.
    async fn provision(&self, email: &str, password: &str) -> Result<(String, bool), CommerceError> {
        let app = self
            .commerce
            .token(TokenGrant::ClientCredentials {
                client_id: &self.config.integration_client_id,
                client_secret: &self.config.integration_client_secret,
            })
            .await?;
        let app_token = app
            .token_pair()
            .ok_or(CommerceError::AuthenticationFailed)?
            .access_token;

        let email = normalize_email(email);

        match self.commerce.find_customer_by_email(&app_token, &email).await? {
            Some(existing) => {
                if self.config.password_rotation == PasswordRotation::Always {
                    self.commerce
                        .update_customer_password(&app_token, &existing.id, password)
                        .await?;
                    debug!(customer_id = %existing.id, "commerce customer password reset");
                }
                Ok((existing.id, existing.has_password))
            }
            None => {
                let id = self
                    .commerce
                    .create_customer(&app_token, &email, password)
                    .await?;
                info!(customer_id = %id, "commerce customer created");
                Ok((id, false))
            }
        }
    }
}
