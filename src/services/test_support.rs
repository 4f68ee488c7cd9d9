//! Shared fixtures for workflow tests: an in-memory SQLite store and a
//! tempdir-backed blob store wired into both services.

use crate::models::{
    idempotency::IdempotencyRecord,
    listing::{Category, Currency, Listing},
};
use crate::services::{
    audit_service::AuditEmitter,
    blob_store::LocalBlobStore,
    idempotency_service::IdempotencyCoordinator,
    listing_service::{CreateListing, ListingService},
    photo_service::{PhotoService, PhotoUpload},
    ports::{IdempotencyStore, ListingFilter, ListingStore, StoreError, StoreResult},
    sqlite_store::SqliteStore,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{path::Path, str::FromStr, sync::Arc};
use uuid::Uuid;

pub(crate) struct Harness {
    pub store: SqliteStore,
    pub blobs: LocalBlobStore,
    pub audit: AuditEmitter,
    pub listings: ListingService,
    pub photos: PhotoService,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path().join("photos")).await.unwrap();
        Self::with_blob_store(dir, blobs.clone(), Arc::new(blobs)).await
    }

    /// Wire the services against `blob_port`, which usually wraps `blobs`.
    pub async fn with_blob_store(
        dir: tempfile::TempDir,
        blobs: LocalBlobStore,
        blob_port: Arc<dyn crate::services::ports::BlobStore>,
    ) -> Self {
        let store = SqliteStore::in_memory().await;
        let audit = AuditEmitter::new(Arc::new(store.clone()));
        let listings = ListingService::new(
            Arc::new(store.clone()),
            IdempotencyCoordinator::with_default_ttl(Arc::new(store.clone())),
            audit.clone(),
        );
        let photos = PhotoService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            blob_port,
            audit.clone(),
        );
        Self {
            store,
            blobs,
            audit,
            listings,
            photos,
            _dir: dir,
        }
    }

    pub async fn draft(&self) -> Listing {
        self.listings
            .create_listing(create_cmd("MacBook Pro", "2499.00"))
            .await
            .unwrap()
    }

    /// Number of payload files currently on disk.
    pub fn blob_count(&self) -> usize {
        count_files(self.blobs.root())
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

pub(crate) fn create_cmd(title: &str, amount: &str) -> CreateListing {
    CreateListing {
        title: title.to_string(),
        description: Some("16-inch, M3 Pro".to_string()),
        price_amount: BigDecimal::from_str(amount).unwrap(),
        price_currency: Currency::Usd,
        category: Category::Electronics,
    }
}

pub(crate) fn upload(listing_id: Uuid, filename: &str, content_type: &str) -> PhotoUpload {
    PhotoUpload {
        listing_id,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        bytes: Bytes::from(vec![0xFF, 0xD8, 0xFF, 0xE0]),
    }
}

pub(crate) fn jpegs(listing_id: Uuid, count: usize) -> Vec<PhotoUpload> {
    (0..count)
        .map(|i| upload(listing_id, &format!("photo-{i}.jpg"), "image/jpeg"))
        .collect()
}

/// Listing store that lets another writer slip in between read and write,
/// so every read-modify-write through it loses the version race.
pub(crate) struct RacingListingStore(pub SqliteStore);

#[async_trait]
impl ListingStore for RacingListingStore {
    async fn save(&self, listing: &Listing) -> StoreResult<Listing> {
        self.0.save(listing).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        let snapshot = self.0.find_by_id(id).await?;
        if let Some(current) = &snapshot {
            let mut other = current.clone();
            other.update_category(Category::Other);
            self.0.save(&other).await?;
        }
        Ok(snapshot)
    }

    async fn find_by_filters(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
        self.0.find_by_filters(filter).await
    }
}

/// Idempotency store that reads fine but cannot write.
pub(crate) struct ReadOnlyIdempotencyStore(pub SqliteStore);

#[async_trait]
impl IdempotencyStore for ReadOnlyIdempotencyStore {
    async fn save_record(&self, _record: &IdempotencyRecord) -> StoreResult<IdempotencyRecord> {
        Err(StoreError::Corrupt("disk full".into()))
    }

    async fn find_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        self.0.find_by_key(key).await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.0.delete_expired(now).await
    }
}
