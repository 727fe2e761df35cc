//! Profile ↔ commerce identity link records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lookup entity tables referenced by a link row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupKind {
    Service,
    Brand,
    App,
}

impl LookupKind {
    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::Service => "services",
            LookupKind::Brand => "brands",
            LookupKind::App => "apps",
        }
    }
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// The (profile, service, brand, app) tuple a link row is unique on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub profile_id: String,
    pub service_id: String,
    pub brand_id: String,
    pub app_id: String,
}

/// Stored association between a profile and one commerce identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBrandAppLink {
    pub id: String,
    pub profile_id: String,
    pub service_id: String,
    pub brand_id: String,
    pub app_id: String,
    /// Customer id on the commerce provider (`service_user_id` column).
    pub external_customer_id: String,
    pub refresh_token: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceBrandAppLink {
    pub fn key(&self) -> LinkKey {
        LinkKey {
            profile_id: self.profile_id.clone(),
            service_id: self.service_id.clone(),
            brand_id: self.brand_id.clone(),
            app_id: self.app_id.clone(),
        }
    }
}

/// Values written by a link upsert.
#[derive(Debug, Clone)]
pub struct LinkUpsert {
    pub key: LinkKey,
    pub external_customer_id: String,
    pub refresh_token: Option<String>,
    pub metadata: serde_json::Value,
}

/// Whether an upsert created the row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWrite {
    Inserted,
    Updated,
}
