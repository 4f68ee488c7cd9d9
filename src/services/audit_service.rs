//! Best-effort audit trail.
//!
//! Audit writes happen after the primary write has committed and never share
//! its fate: a failed append is logged, counted, and otherwise ignored by the
//! workflow. The counter is the operator-facing signal that the trail has
//! gaps; `/readyz` reports it.

use crate::errors::{ListingError, ListingResult};
use crate::models::audit::{AuditLog, DomainEvent};
use crate::services::ports::AuditStore;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, error};

#[derive(Clone)]
pub struct AuditEmitter {
    store: Arc<dyn AuditStore>,
    failures: Arc<AtomicU64>,
}

impl AuditEmitter {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Serialize and append one event.
    pub async fn emit(&self, event: &DomainEvent) -> ListingResult<AuditLog> {
        let entry = AuditLog::from_event(event)
            .map_err(|err| ListingError::StorageFailure(format!("audit payload: {err}")))?;
        let saved = self.store.append(&entry).await?;
        debug!(
            event_type = saved.event_type.as_str(),
            listing_id = %saved.listing_id,
            "audit entry appended"
        );
        Ok(saved)
    }

    /// Emit without affecting the caller's outcome. Failures are logged at
    /// error level and counted. Returns whether the entry was written.
    pub async fn emit_best_effort(&self, event: &DomainEvent) -> bool {
        match self.emit(event).await {
            Ok(_) => true,
            Err(err) => {
                let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    event_type = event.event_type(),
                    listing_id = %event.listing_id(),
                    audit_failures = total,
                    "audit emission failed: {}",
                    err
                );
                false
            }
        }
    }

    /// Number of audit entries lost since startup.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
