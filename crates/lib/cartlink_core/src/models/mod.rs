//! Domain models.
//!
//! Internal domain types shared by the store, the identity components and the
//! token lifecycle manager. Wire types for the commerce provider live in
//! [`crate::commerce::types`].

pub mod link;
pub mod profile;
pub mod token;
