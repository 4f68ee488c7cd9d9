use crate::services::{
    audit_service::AuditEmitter, idempotency_service::IdempotencyCoordinator,
    listing_service::ListingService, photo_service::PhotoService, ports::BlobStore,
    sqlite_store::SqliteStore,
};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub listings: ListingService,
    pub photos: PhotoService,
    pub idempotency: IdempotencyCoordinator,
    pub audit: AuditEmitter,
    pub store: SqliteStore,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    /// Wire both workflows against one SQLite store and one blob store.
    pub fn new(
        store: SqliteStore,
        blobs: Arc<dyn BlobStore>,
        idempotency_ttl: chrono::Duration,
    ) -> Self {
        let audit = AuditEmitter::new(Arc::new(store.clone()));
        let idempotency = IdempotencyCoordinator::new(Arc::new(store.clone()), idempotency_ttl);
        let listings =
            ListingService::new(Arc::new(store.clone()), idempotency.clone(), audit.clone());
        let photos = PhotoService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            blobs.clone(),
            audit.clone(),
        );
        Self {
            listings,
            photos,
            idempotency,
            audit,
            store,
            blobs,
        }
    }
}
