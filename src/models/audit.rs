//! Append-only audit entries and the domain events they record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Domain events worth an audit trail.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    ListingPublished {
        listing_id: Uuid,
        title: String,
        published_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    PhotoUploaded {
        photo_id: Uuid,
        listing_id: Uuid,
        filename: String,
        file_size: u64,
        uploaded_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ListingPublished { .. } => "LISTING_PUBLISHED",
            Self::PhotoUploaded { .. } => "PHOTO_UPLOADED",
        }
    }

    pub fn listing_id(&self) -> Uuid {
        match self {
            Self::ListingPublished { listing_id, .. } | Self::PhotoUploaded { listing_id, .. } => {
                *listing_id
            }
        }
    }
}

/// A persisted audit entry. Never updated once appended.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AuditLog {
    pub id: Uuid,
    pub event_type: String,
    pub listing_id: Uuid,
    pub payload_json: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn from_event(event: &DomainEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event.event_type().to_string(),
            listing_id: event.listing_id(),
            payload_json: serde_json::to_string(event)?,
            created_at: Utc::now(),
        })
    }
}
