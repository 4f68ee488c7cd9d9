//! Photos attached to a listing and the metadata checked before upload.

use crate::errors::{ListingError, ListingResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Content types accepted for listing photos.
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Largest accepted photo, in bytes (2 MiB).
pub const MAX_PHOTO_BYTES: u64 = 2 * 1024 * 1024;

/// Validated description of an uploaded image file.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PhotoMetadata {
    filename: String,
    content_type: String,
    size_bytes: u64,
}

impl PhotoMetadata {
    /// Validate filename, content type and size.
    ///
    /// A blank filename is an `InvalidArgument`; a disallowed type or an
    /// out-of-range size is an `InvalidPhotoFormat`. The content type is
    /// compared case-insensitively and stored lowercased.
    pub fn new(filename: &str, content_type: &str, size_bytes: u64) -> ListingResult<Self> {
        if filename.trim().is_empty() {
            return Err(ListingError::InvalidArgument(
                "filename cannot be empty".into(),
            ));
        }

        let content_type = content_type.trim().to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ListingError::InvalidPhotoFormat(format!(
                "Invalid content type `{content_type}`. Allowed types: {}",
                ALLOWED_CONTENT_TYPES.join(", ")
            )));
        }

        if size_bytes == 0 {
            return Err(ListingError::InvalidPhotoFormat(
                "File size must be positive".into(),
            ));
        }
        if size_bytes > MAX_PHOTO_BYTES {
            return Err(ListingError::InvalidPhotoFormat(format!(
                "File size exceeds maximum allowed size of {}MB",
                MAX_PHOTO_BYTES / 1024 / 1024
            )));
        }

        Ok(Self {
            filename: filename.to_string(),
            content_type,
            size_bytes,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// A photo owned by exactly one listing.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingPhoto {
    id: Uuid,
    listing_id: Uuid,
    metadata: PhotoMetadata,
    /// Opaque reference handed out by the blob store.
    storage_path: String,
    created_at: DateTime<Utc>,
}

impl ListingPhoto {
    pub fn create(
        listing_id: Uuid,
        metadata: PhotoMetadata,
        storage_path: impl Into<String>,
    ) -> ListingResult<Self> {
        Self::reconstitute(
            Uuid::new_v4(),
            listing_id,
            metadata,
            storage_path.into(),
            Utc::now(),
        )
    }

    pub fn reconstitute(
        id: Uuid,
        listing_id: Uuid,
        metadata: PhotoMetadata,
        storage_path: String,
        created_at: DateTime<Utc>,
    ) -> ListingResult<Self> {
        if storage_path.trim().is_empty() {
            return Err(ListingError::InvalidArgument(
                "storage path cannot be empty".into(),
            ));
        }
        Ok(Self {
            id,
            listing_id,
            metadata,
            storage_path,
            created_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn listing_id(&self) -> Uuid {
        self.listing_id
    }

    pub fn metadata(&self) -> &PhotoMetadata {
        &self.metadata
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
