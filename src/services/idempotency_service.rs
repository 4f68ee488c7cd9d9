//! Idempotency coordinator for publish requests.
//!
//! A token is consumed by at most one successful operation. While its record
//! is live, any further request carrying it is a conflict; the cached result
//! is never replayed. Once the record expires the token is usable again.

use crate::errors::{ListingError, ListingResult};
use crate::models::idempotency::{DEFAULT_TTL_HOURS, IdempotencyRecord};
use crate::services::ports::{IdempotencyStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct IdempotencyCoordinator {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyCoordinator {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[cfg(test)]
    pub fn with_default_ttl(store: Arc<dyn IdempotencyStore>) -> Self {
        Self::new(store, Duration::hours(DEFAULT_TTL_HOURS))
    }

    /// Live record for `key`, if any.
    pub async fn lookup(&self, key: &str) -> ListingResult<Option<IdempotencyRecord>> {
        self.lookup_at(key, Utc::now()).await
    }

    /// Expired records read as absent, whether or not they were swept yet.
    pub async fn lookup_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> ListingResult<Option<IdempotencyRecord>> {
        match self.store.find_by_key(key).await? {
            Some(record) if record.is_expired_at(now) => {
                debug!(key, expired_at = %record.expires_at, "idempotency record expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Bind `key` to `listing_id`. A live record for the same key surfaces as
    /// `DuplicateKey`, never as an overwrite.
    pub async fn record(
        &self,
        key: &str,
        listing_id: Uuid,
        status_code: u16,
    ) -> ListingResult<IdempotencyRecord> {
        let result = json!({
            "listingId": listing_id.to_string(),
            "status": "success",
        });
        let record = IdempotencyRecord::new(
            key,
            listing_id,
            result.to_string(),
            status_code,
            Utc::now(),
            self.ttl,
        )?;

        match self.store.save_record(&record).await {
            Ok(saved) => {
                debug!(key, %listing_id, "idempotency record saved");
                Ok(saved)
            }
            Err(StoreError::DuplicateKey(key)) => Err(ListingError::DuplicateKey(key)),
            Err(err) => Err(err.into()),
        }
    }

    /// Physically remove expired records. Driven by the periodic sweep.
    pub async fn sweep_expired(&self) -> ListingResult<u64> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        info!(removed, "swept expired idempotency records");
        Ok(removed)
    }
}
