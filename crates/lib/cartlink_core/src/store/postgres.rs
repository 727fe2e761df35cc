//! PostgreSQL-backed [`LinkStore`].
//!
//! Uniqueness is enforced by constraints (see `migrations/`), and every
//! create-if-absent goes through a single `INSERT … ON CONFLICT` statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::secrets::TokenCipher;
use super::{LinkStore, StoreError, new_link_id};
use crate::models::link::{LinkKey, LinkUpsert, LinkWrite, LookupKind, ServiceBrandAppLink};
use crate::models::profile::{Profile, ProfileUpdate};

type ProfileRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

type LinkRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

const PROFILE_COLUMNS: &str =
    "id::text, auth_user_id, email, first_name, last_name, phone, updated_at";

fn profile_from_row(row: ProfileRow) -> Profile {
    let (id, auth_user_id, email, first_name, last_name, phone, updated_at) = row;
    Profile {
        id,
        auth_user_id,
        email,
        first_name,
        last_name,
        phone,
        updated_at,
    }
}

/// Link store over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgLinkStore {
    pool: PgPool,
    cipher: Option<TokenCipher>,
}

impl PgLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, cipher: None }
    }

    /// Encrypt refresh tokens at rest with `cipher`.
    pub fn with_cipher(mut self, cipher: TokenCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn seal(&self, token: Option<&str>) -> Result<Option<String>, StoreError> {
        match (token, &self.cipher) {
            (Some(t), Some(cipher)) => cipher.seal(t).map(Some),
            (Some(t), None) => Ok(Some(t.to_string())),
            (None, _) => Ok(None),
        }
    }

    fn open(&self, stored: Option<String>) -> Result<Option<String>, StoreError> {
        match (stored, &self.cipher) {
            (Some(s), Some(cipher)) => cipher.open(&s).map(Some),
            (stored, _) => Ok(stored),
        }
    }
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn ensure_lookup(&self, kind: LookupKind, name: &str) -> Result<String, StoreError> {
        // Table name comes from a closed enum, never from input.
        let sql = format!(
            "INSERT INTO {} (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id::text",
            kind.table()
        );
        let id = sqlx::query_scalar::<_, String>(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_profile_by_auth_user_id(
        &self,
        auth_user_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE auth_user_id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(auth_user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(profile_from_row))
    }

    async fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE lower(email) = lower($1) \
             ORDER BY updated_at DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(profile_from_row))
    }

    async fn ensure_profile(
        &self,
        auth_user_id: &str,
        email: &str,
    ) -> Result<Profile, StoreError> {
        let sql = format!(
            "INSERT INTO profiles (auth_user_id, email) VALUES ($1, $2) \
             ON CONFLICT (auth_user_id) DO UPDATE SET auth_user_id = EXCLUDED.auth_user_id \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(auth_user_id)
            .bind(email.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(profile_from_row(row))
    }

    async fn update_profile(
        &self,
        auth_user_id: &str,
        email: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, StoreError> {
        let sql = format!(
            "INSERT INTO profiles (auth_user_id, email, first_name, last_name, phone) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (auth_user_id) DO UPDATE SET \
               email = EXCLUDED.email, \
               first_name = COALESCE(EXCLUDED.first_name, profiles.first_name), \
               last_name = COALESCE(EXCLUDED.last_name, profiles.last_name), \
               phone = COALESCE(EXCLUDED.phone, profiles.phone), \
               updated_at = now() \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(auth_user_id)
            .bind(email.trim())
            .bind(update.first_name.as_deref())
            .bind(update.last_name.as_deref())
            .bind(update.phone.as_deref())
            .fetch_one(&self.pool)
            .await?;
        Ok(profile_from_row(row))
    }

    async fn find_link(&self, key: &LinkKey) -> Result<Option<ServiceBrandAppLink>, StoreError> {
        let row = sqlx::query_as::<_, LinkRow>(
            "SELECT id::text, profile_id::text, service_id::text, brand_id::text, app_id::text, \
                    service_user_id, refresh_token, metadata::text, created_at, updated_at \
             FROM profile_service_brand \
             WHERE profile_id = $1::uuid AND service_id = $2::uuid \
               AND brand_id = $3::uuid AND app_id = $4::uuid",
        )
        .bind(&key.profile_id)
        .bind(&key.service_id)
        .bind(&key.brand_id)
        .bind(&key.app_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let (
            id,
            profile_id,
            service_id,
            brand_id,
            app_id,
            external_customer_id,
            refresh_token,
            metadata,
            created_at,
            updated_at,
        ) = row;

        let metadata = serde_json::from_str(&metadata)
            .map_err(|e| StoreError::Decode(format!("link metadata: {e}")))?;

        Ok(Some(ServiceBrandAppLink {
            id,
            profile_id,
            service_id,
            brand_id,
            app_id,
            external_customer_id,
            refresh_token: self.open(refresh_token)?,
            metadata,
            created_at,
            updated_at,
        }))
    }

    async fn upsert_link(&self, upsert: &LinkUpsert) -> Result<LinkWrite, StoreError> {
        let refresh_token = self.seal(upsert.refresh_token.as_deref())?;

        // xmax is 0 only for rows created by this statement.
        let inserted = sqlx::query_scalar::<_, bool>(
            "INSERT INTO profile_service_brand \
               (id, profile_id, service_id, brand_id, app_id, service_user_id, refresh_token, metadata) \
             VALUES ($1, $2::uuid, $3::uuid, $4::uuid, $5::uuid, $6, $7, $8::jsonb) \
             ON CONFLICT (profile_id, service_id, brand_id, app_id) \
             DO UPDATE SET service_user_id = EXCLUDED.service_user_id, \
                           refresh_token = COALESCE(EXCLUDED.refresh_token, profile_service_brand.refresh_token), \
                           metadata = EXCLUDED.metadata, \
                           updated_at = now() \
             RETURNING (xmax = 0)",
        )
        .bind(new_link_id())
        .bind(&upsert.key.profile_id)
        .bind(&upsert.key.service_id)
        .bind(&upsert.key.brand_id)
        .bind(&upsert.key.app_id)
        .bind(&upsert.external_customer_id)
        .bind(refresh_token)
        .bind(upsert.metadata.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(if inserted {
            LinkWrite::Inserted
        } else {
            LinkWrite::Updated
        })
    }
}
