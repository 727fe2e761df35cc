//! # cartlink_core
//!
//! Links a first-party profile to a commerce-provider customer and keeps a
//! valid customer access token available for it.
//!
//! The entry point is [`token::TokenManager::get_valid_access_token`], which
//! walks the cache → refresh-token → full-provisioning chain.

pub mod commerce;
pub mod config;
pub mod identity;
pub mod models;
pub mod store;
pub mod token;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
