//! Wire types for the commerce provider's token endpoint and JSON:API
//! customer resource.

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::token::TokenPair;

/// JSON:API media type required by the customer resource.
pub const JSON_API: &str = "application/vnd.api+json";

/// One entry of an `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    /// HTTP status; the provider sends it either as a number or a string.
    #[serde(default, deserialize_with = "status_from_any")]
    pub status: Option<u16>,
}

fn status_from_any<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Response of the token endpoint, successful or not.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
    /// Plain OAuth error code (`invalid_grant`, ...).
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Build a successful response (used by fakes and tests).
    pub fn granted(access_token: &str, refresh_token: Option<&str>) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            refresh_token: refresh_token.map(str::to_string),
            token_type: Some("bearer".to_string()),
            ..Self::default()
        }
    }

    /// Build a rejection carrying a single error entry with `status`.
    pub fn rejected(status: u16, detail: &str) -> Self {
        Self {
            errors: vec![ApiErrorEntry {
                code: Some("UNAUTHORIZED".to_string()),
                title: Some(detail.to_string()),
                detail: Some(detail.to_string()),
                status: Some(status),
            }],
            ..Self::default()
        }
    }

    /// True when any error entry has status ≥ 400 or a top-level error is set.
    pub fn is_auth_error(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.status.is_some_and(|s| s >= 400))
            || self.error.is_some()
    }

    /// The minted token pair, if this response is a usable success.
    pub fn token_pair(&self) -> Option<TokenPair> {
        if self.is_auth_error() {
            return None;
        }
        let access_token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        Some(TokenPair {
            access_token: access_token.to_string(),
            refresh_token: self.refresh_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

/// Customer as observed through the administrative API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommerceCustomer {
    pub id: String,
    pub email: Option<String>,
    pub has_password: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerList {
    #[serde(default)]
    pub data: Vec<CustomerResource>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerDocument {
    pub data: CustomerResource,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CustomerResource {
    pub id: String,
    #[serde(default)]
    pub attributes: CustomerAttributes,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CustomerAttributes {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub has_password: Option<bool>,
}

impl From<CustomerResource> for CommerceCustomer {
    fn from(resource: CustomerResource) -> Self {
        Self {
            id: resource.id,
            email: resource.attributes.email,
            has_password: resource.attributes.has_password == Some(true),
        }
    }
}

/// Body of a customer create/update request.
#[derive(Debug, Serialize)]
pub(crate) struct CustomerWrite<'a> {
    pub data: CustomerWriteData<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomerWriteData<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    pub attributes: CustomerWriteAttributes<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CustomerWriteAttributes<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
    pub password: &'a str,
}

impl<'a> CustomerWrite<'a> {
    pub fn create(email: &'a str, password: &'a str) -> Self {
        Self {
            data: CustomerWriteData {
                kind: "customers",
                id: None,
                attributes: CustomerWriteAttributes {
                    email: Some(email),
                    password,
                },
            },
        }
    }

    pub fn password_update(customer_id: &'a str, password: &'a str) -> Self {
        Self {
            data: CustomerWriteData {
                kind: "customers",
                id: Some(customer_id),
                attributes: CustomerWriteAttributes {
                    email: None,
                    password,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_statuses_both_count_as_auth_errors() {
        let numeric: TokenResponse =
            serde_json::from_str(r#"{"errors":[{"code":"UNAUTHORIZED","status":401}]}"#).unwrap();
        let text: TokenResponse =
            serde_json::from_str(r#"{"errors":[{"code":"UNAUTHORIZED","status":"401"}]}"#)
                .unwrap();
        assert!(numeric.is_auth_error());
        assert!(text.is_auth_error());
        assert!(numeric.token_pair().is_none());
    }

    #[test]
    fn top_level_error_counts_as_auth_error() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"bad"}"#)
                .unwrap();
        assert!(resp.is_auth_error());
    }

    #[test]
    fn low_status_entries_are_not_auth_errors() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"at","refresh_token":"rt","errors":[{"status":200}]}"#,
        )
        .unwrap();
        assert!(!resp.is_auth_error());
        let pair = resp.token_pair().unwrap();
        assert_eq!(pair.access_token, "at");
        assert_eq!(pair.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn empty_access_token_is_not_a_grant() {
        let resp: TokenResponse = serde_json::from_str(r#"{"access_token":""}"#).unwrap();
        assert!(resp.token_pair().is_none());
    }

    #[test]
    fn customer_list_maps_has_password_flag() {
        let list: CustomerList = serde_json::from_str(
            r#"{"data":[{"id":"cus_1","type":"customers","attributes":{"email":"a@b.c","has_password":true}}]}"#,
        )
        .unwrap();
        let customer: CommerceCustomer = list.data.into_iter().next().unwrap().into();
        assert_eq!(customer.id, "cus_1");
        assert!(customer.has_password);
    }

    #[test]
    fn password_update_body_omits_email() {
        let body = serde_json::to_value(CustomerWrite::password_update("cus_1", "pw")).unwrap();
        assert_eq!(body["data"]["type"], "customers");
        assert_eq!(body["data"]["id"], "cus_1");
        assert_eq!(body["data"]["attributes"]["password"], "pw");
        assert!(body["data"]["attributes"].get("email").is_none());
    }
}
