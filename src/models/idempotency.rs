//! Records binding a client idempotency token to the operation it completed.

use crate::errors::{ListingError, ListingResult};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Default lifetime of a record, measured from its creation.
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub id: Uuid,

    /// Client-supplied token; unique among unexpired records.
    pub key: String,

    /// Listing the token was consumed against.
    pub listing_id: Uuid,

    /// Serialized result of the operation.
    pub result_json: String,

    /// HTTP-equivalent status the operation completed with.
    pub status_code: u16,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Build a fresh record expiring `ttl` after `now`.
    pub fn new(
        key: &str,
        listing_id: Uuid,
        result_json: String,
        status_code: u16,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> ListingResult<Self> {
        if key.trim().is_empty() {
            return Err(ListingError::InvalidArgument(
                "idempotency key cannot be empty".into(),
            ));
        }
        if result_json.trim().is_empty() {
            return Err(ListingError::InvalidArgument(
                "idempotency result cannot be empty".into(),
            ));
        }
        if !(100..=599).contains(&status_code) {
            return Err(ListingError::InvalidArgument(format!(
                "status code {status_code} is outside 100..=599"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            key: key.to_string(),
            listing_id,
            result_json,
            status_code,
            created_at: now,
            expires_at: now + ttl,
        })
    }

    /// Expired once `now` reaches the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
