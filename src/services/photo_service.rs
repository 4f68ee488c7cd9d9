//! Batch photo ingestion.
//!
//! A batch is accepted whole or not at all. Payloads go to the blob store one
//! by one, then the listing (with every new photo) is written once. If
//! anything fails after the first payload landed, the payloads stored so far
//! are deleted again. Ingestion runs on its own task so a dropped request
//! cannot abandon it between the first payload and the compensation.

use crate::errors::{ListingError, ListingResult};
use crate::models::{
    audit::DomainEvent,
    listing::{Listing, MAX_PHOTOS},
    photo::{ListingPhoto, PhotoMetadata},
};
use crate::services::{
    audit_service::AuditEmitter,
    ports::{BlobStore, ListingStore, PhotoStore},
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One file of an upload batch.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub listing_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoUpload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Clone)]
pub struct PhotoService {
    listings: Arc<dyn ListingStore>,
    photos: Arc<dyn PhotoStore>,
    blobs: Arc<dyn BlobStore>,
    audit: AuditEmitter,
}

impl PhotoService {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        photos: Arc<dyn PhotoStore>,
        blobs: Arc<dyn BlobStore>,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            listings,
            photos,
            blobs,
            audit,
        }
    }

    /// Attach a batch of photos to a listing. Empty files are skipped; a
    /// batch with nothing left is rejected. Returns the new photos in input
    /// order.
    pub async fn upload_photos(
        &self,
        listing_id: Uuid,
        files: Vec<PhotoUpload>,
    ) -> ListingResult<Vec<ListingPhoto>> {
        let files: Vec<PhotoUpload> = files.into_iter().filter(|f| !f.bytes.is_empty()).collect();
        if files.is_empty() {
            return Err(ListingError::InvalidArgument(
                "at least one non-empty file is required".into(),
            ));
        }
        if let Some(stray) = files.iter().find(|f| f.listing_id != listing_id) {
            return Err(ListingError::InvalidArgument(format!(
                "file `{}` targets listing {} instead of {}",
                stray.filename, stray.listing_id, listing_id
            )));
        }

        debug!(%listing_id, files = files.len(), "uploading photo batch");
        let service = self.clone();
        tokio::spawn(async move { service.ingest(listing_id, files).await })
            .await
            .map_err(|err| ListingError::StorageFailure(format!("photo ingestion aborted: {err}")))?
    }

    pub async fn list_photos(&self, listing_id: Uuid) -> ListingResult<Vec<ListingPhoto>> {
        if self.listings.find_by_id(listing_id).await?.is_none() {
            return Err(ListingError::ListingNotFound(listing_id));
        }
        Ok(self.photos.find_by_listing_id(listing_id).await?)
    }

    async fn ingest(
        &self,
        listing_id: Uuid,
        files: Vec<PhotoUpload>,
    ) -> ListingResult<Vec<ListingPhoto>> {
        let listing = self
            .listings
            .find_by_id(listing_id)
            .await?
            .ok_or(ListingError::ListingNotFound(listing_id))?;

        let current = listing.photo_count();
        if files.len() > listing.remaining_photo_slots() {
            warn!(%listing_id, current, attempted = files.len(), "photo limit exceeded");
            return Err(ListingError::PhotoLimitExceeded {
                max: MAX_PHOTOS,
                current,
                attempted: files.len(),
            });
        }

        let mut stored = Vec::with_capacity(files.len());
        let photos = match self.stage_and_persist(listing, files, &mut stored).await {
            Ok(photos) => photos,
            Err(err) => {
                warn!(%listing_id, stored = stored.len(), "photo batch failed: {}", err);
                self.compensate(&stored).await;
                return Err(err);
            }
        };

        for photo in &photos {
            self.audit
                .emit_best_effort(&DomainEvent::PhotoUploaded {
                    photo_id: photo.id(),
                    listing_id,
                    filename: photo.metadata().filename().to_string(),
                    file_size: photo.metadata().size_bytes(),
                    uploaded_at: photo.created_at(),
                })
                .await;
        }

        info!(%listing_id, added = photos.len(), "photo batch stored");
        Ok(photos)
    }

    /// Store every payload, then write the listing once. Paths of payloads
    /// that reached the blob store are pushed to `stored` as they land.
    async fn stage_and_persist(
        &self,
        mut listing: Listing,
        files: Vec<PhotoUpload>,
        stored: &mut Vec<String>,
    ) -> ListingResult<Vec<ListingPhoto>> {
        let mut photos = Vec::with_capacity(files.len());
        for file in files {
            let metadata = PhotoMetadata::new(&file.filename, &file.content_type, file.size())?;
            let path = self.blobs.put(metadata.filename(), file.bytes).await?;
            stored.push(path.clone());

            let photo = ListingPhoto::create(listing.id(), metadata, path)?;
            listing.add_photo(photo.clone())?;
            photos.push(photo);
        }

        self.listings.save(&listing).await?;
        Ok(photos)
    }

    /// Delete payloads stored for a failed batch. Failures are logged and
    /// leave an orphan behind; they never replace the original error.
    async fn compensate(&self, stored: &[String]) {
        for path in stored.iter().rev() {
            match self.blobs.delete(path).await {
                Ok(()) => debug!(path = path.as_str(), "compensated stored photo"),
                Err(err) => error!(path = path.as_str(), "failed to remove orphaned photo: {}", err),
            }
        }
    }
}
