//! Capability interfaces the workflows depend on.
//!
//! The workflows only ever see these traits; `SqliteStore` and
//! `LocalBlobStore` are the adapters wired up in `main`.

use crate::errors::ListingError;
use crate::models::{
    audit::AuditLog,
    idempotency::IdempotencyRecord,
    listing::{Category, Listing, ListingStatus},
    photo::ListingPhoto,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version no longer matches the version the caller read.
    #[error("listing `{0}` was modified concurrently")]
    ConcurrentModification(Uuid),
    #[error("key `{0}` already exists")]
    DuplicateKey(String),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage path `{0}` escapes the storage root")]
    PathEscape(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

impl From<StoreError> for ListingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrentModification(id) => ListingError::ConcurrentModification(id),
            StoreError::DuplicateKey(key) => ListingError::DuplicateKey(key),
            other => ListingError::StorageFailure(other.to_string()),
        }
    }
}

impl From<BlobError> for ListingError {
    fn from(err: BlobError) -> Self {
        ListingError::StorageFailure(err.to_string())
    }
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert a never-saved listing, or compare-and-swap an existing one on
    /// the version it was read at. New photos are written in the same
    /// operation. Returns the listing as stored, with its new version.
    async fn save(&self, listing: &Listing) -> StoreResult<Listing>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Listing>>;

    /// Listings matching every set criterion, newest first.
    async fn find_by_filters(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>>;
}

/// Search criteria for [`ListingStore::find_by_filters`]. Unset fields
/// match everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListingFilter {
    /// Case-insensitive substring of the title or description.
    pub query: Option<String>,
    pub category: Option<Category>,
    pub status: Option<ListingStatus>,
    /// Inclusive lower bound on the price amount.
    pub min_price: Option<BigDecimal>,
    /// Inclusive upper bound on the price amount.
    pub max_price: Option<BigDecimal>,
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Photos of a listing in insertion order.
    async fn find_by_listing_id(&self, listing_id: Uuid) -> StoreResult<Vec<ListingPhoto>>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] while an unexpired record
    /// holds the same key.
    async fn save_record(&self, record: &IdempotencyRecord) -> StoreResult<IdempotencyRecord>;

    /// Raw lookup; may return an expired record.
    async fn find_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>>;

    /// Remove records expired at `now`, returning how many were removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditLog) -> StoreResult<AuditLog>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh, collision-free path derived from
    /// `filename`'s extension. Returns the opaque storage path.
    async fn put(&self, filename: &str, bytes: Bytes) -> BlobResult<String>;

    /// Deleting a path that does not exist succeeds.
    async fn delete(&self, storage_path: &str) -> BlobResult<()>;

    async fn exists(&self, storage_path: &str) -> BlobResult<bool>;
}
