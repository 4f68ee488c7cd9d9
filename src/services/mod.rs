//! Workflows and the storage adapters they run against.
//!
//! Workflows (`listing_service`, `photo_service`) only see the traits in
//! `ports`; `sqlite_store` and `blob_store` are the production adapters.

pub mod audit_service;
pub mod blob_store;
pub mod idempotency_service;
pub mod listing_service;
pub mod photo_service;
pub mod ports;
pub mod sqlite_store;

#[cfg(test)]
pub(crate) mod test_support;
