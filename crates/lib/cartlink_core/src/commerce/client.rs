//! HTTP implementation of [`CommerceProvider`] on top of `reqwest`.
//!
//! Every request is bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use tracing::debug;
use url::Url;

use super::types::{
    ApiErrorEntry, CommerceCustomer, CustomerDocument, CustomerList, CustomerWrite, JSON_API,
    TokenResponse,
};
use super::{CommerceError, CommerceProvider, TokenGrant};
use crate::config::CommerceConfig;

const TOKEN_PATH: &str = "oauth/token";
const CUSTOMERS_PATH: &str = "api/customers";

/// Commerce provider reached over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpCommerceClient {
    client: Client,
    base_url: Url,
}

impl HttpCommerceClient {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CommerceError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| CommerceError::Transport(format!("Invalid base URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CommerceError::Transport(format!("HTTP client build failed: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &CommerceConfig) -> Result<Self, CommerceError> {
        Self::new(&config.commerce_base_url, config.request_timeout)
    }

    fn endpoint(&self, path: &str) -> Result<Url, CommerceError> {
        self.base_url
            .join(path)
            .map_err(|e| CommerceError::Transport(format!("Invalid endpoint {path}: {e}")))
    }

    fn customer_url(&self, customer_id: &str) -> Result<Url, CommerceError> {
        let mut url = self.endpoint(CUSTOMERS_PATH)?;
        url.path_segments_mut()
            .map_err(|_| CommerceError::Transport("Base URL cannot carry a path".into()))?
            .push(customer_id);
        Ok(url)
    }
}

fn transport(context: &str, e: reqwest::Error) -> CommerceError {
    if e.is_timeout() {
        CommerceError::Transport(format!("{context} timed out"))
    } else {
        CommerceError::Transport(format!("{context} failed: {e}"))
    }
}

/// Map a non-2xx customer response to [`CommerceError::Http`].
async fn ensure_success(resp: Response) -> Result<Response, CommerceError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(CommerceError::Http { status, body })
}

/// Decode a token endpoint body, synthesizing an error entry when a rejected
/// response has no parseable body.
fn decode_token_body(status: StatusCode, body: &str) -> Result<TokenResponse, CommerceError> {
    match serde_json::from_str::<TokenResponse>(body) {
        Ok(mut parsed) => {
            if !status.is_success() && !parsed.is_auth_error() {
                parsed.errors.push(ApiErrorEntry {
                    status: Some(status.as_u16()),
                    detail: Some(body.to_string()),
                    ..ApiErrorEntry::default()
                });
            }
            Ok(parsed)
        }
        Err(_) if !status.is_success() => Ok(TokenResponse {
            errors: vec![ApiErrorEntry {
                status: Some(status.as_u16()),
                detail: Some(body.to_string()),
                ..ApiErrorEntry::default()
            }],
            ..TokenResponse::default()
        }),
        Err(e) => Err(CommerceError::Decode(format!("Token response parse error: {e}"))),
    }
}

#[async_trait]
impl CommerceProvider for HttpCommerceClient {
    async fn token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, CommerceError> {
        let url = self.endpoint(TOKEN_PATH)?;
        let resp = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .form(&grant.params())
            .send()
            .await
            .map_err(|e| transport("Token request", e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport("Token response read", e))?;
        debug!(grant_type = grant.grant_type(), status = status.as_u16(), "token endpoint replied");

        decode_token_body(status, &body)
    }

    async fn find_customer_by_email(
        &self,
        app_token: &str,
        email: &str,
    ) -> Result<Option<CommerceCustomer>, CommerceError> {
        let url = self.endpoint(CUSTOMERS_PATH)?;
        let resp = self
            .client
            .get(url)
            .query(&[("filter[q][email_eq]", email)])
            .header(header::ACCEPT, JSON_API)
            .bearer_auth(app_token)
            .send()
            .await
            .map_err(|e| transport("Customer lookup", e))?;

        let list: CustomerList = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| CommerceError::Decode(format!("Customer list parse error: {e}")))?;

        Ok(list.data.into_iter().next().map(CommerceCustomer::from))
    }

    async fn create_customer(
        &self,
        app_token: &str,
        email: &str,
        password: &str,
    ) -> Result<String, CommerceError> {
        let url = self.endpoint(CUSTOMERS_PATH)?;
        let body = serde_json::to_vec(&CustomerWrite::create(email, password))
            .map_err(|e| CommerceError::Decode(format!("Customer body encode error: {e}")))?;

        let resp = self
            .client
            .post(url)
            .header(header::ACCEPT, JSON_API)
            .header(header::CONTENT_TYPE, JSON_API)
            .bearer_auth(app_token)
            .body(body)
            .send()
            .await
            .map_err(|e| transport("Customer create", e))?;

        let doc: CustomerDocument = ensure_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| CommerceError::Decode(format!("Customer create parse error: {e}")))?;

        Ok(doc.data.id)
    }

    async fn update_customer_password(
        &self,
        app_token: &str,
        customer_id: &str,
        password: &str,
    ) -> Result<(), CommerceError> {
        let url = self.customer_url(customer_id)?;
        let body = serde_json::to_vec(&CustomerWrite::password_update(customer_id, password))
            .map_err(|e| CommerceError::Decode(format!("Customer body encode error: {e}")))?;

        let resp = self
            .client
            .patch(url)
            .header(header::ACCEPT, JSON_API)
            .header(header::CONTENT_TYPE, JSON_API)
            .bearer_auth(app_token)
            .body(body)
            .send()
            .await
            .map_err(|e| transport("Customer password update", e))?;

        ensure_success(resp).await?;
        Ok(())
    }
}
