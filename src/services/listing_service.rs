//! Listing lifecycle workflows: create, read, search, edit, publish, archive.
//!
//! Publish runs idempotency check → load → state transition → CAS write →
//! audit → token bookkeeping. Only the CAS write is the consistency
//! boundary. Audit is best-effort, and a token that fails to record after a
//! committed publish is reported as its own error kind.

use crate::errors::{ListingError, ListingResult};
use crate::models::{
    audit::DomainEvent,
    listing::{Category, Currency, Listing, Money},
};
use crate::services::{
    audit_service::AuditEmitter,
    idempotency_service::IdempotencyCoordinator,
    ports::{ListingFilter, ListingStore},
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status code recorded against a consumed publish token.
const PUBLISH_STATUS_CODE: u16 = 200;

/// Input for creating a listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListing {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_amount: BigDecimal,
    pub price_currency: Currency,
    pub category: Category,
}

/// Partial edit of a listing. Absent fields keep their current value; an
/// empty description clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListing {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_amount: Option<BigDecimal>,
    pub price_currency: Option<Currency>,
    pub category: Option<Category>,
}

impl UpdateListing {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price_amount.is_none()
            && self.price_currency.is_none()
            && self.category.is_none()
    }
}

#[derive(Clone)]
pub struct ListingService {
    listings: Arc<dyn ListingStore>,
    idempotency: IdempotencyCoordinator,
    audit: AuditEmitter,
}

impl ListingService {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        idempotency: IdempotencyCoordinator,
        audit: AuditEmitter,
    ) -> Self {
        Self {
            listings,
            idempotency,
            audit,
        }
    }

    pub async fn create_listing(&self, cmd: CreateListing) -> ListingResult<Listing> {
        debug!(title = cmd.title.as_str(), "creating listing");
        let price = Money::new(cmd.price_amount, cmd.price_currency)?;
        let listing = Listing::create(&cmd.title, cmd.description.as_deref(), price, cmd.category)?;
        let saved = self.listings.save(&listing).await?;
        info!(listing_id = %saved.id(), "listing created");
        Ok(saved)
    }

    pub async fn get_listing(&self, listing_id: Uuid) -> ListingResult<Listing> {
        self.listings
            .find_by_id(listing_id)
            .await?
            .ok_or(ListingError::ListingNotFound(listing_id))
    }

    /// Listings matching `filter`, newest first.
    pub async fn list_listings(&self, filter: ListingFilter) -> ListingResult<Vec<Listing>> {
        let zero = BigDecimal::from(0);
        for (name, bound) in [("minPrice", &filter.min_price), ("maxPrice", &filter.max_price)] {
            if bound.as_ref().is_some_and(|value| value < &zero) {
                return Err(ListingError::InvalidArgument(format!(
                    "{name} cannot be negative"
                )));
            }
        }
        if let (Some(min), Some(max)) = (&filter.min_price, &filter.max_price) {
            if min > max {
                return Err(ListingError::InvalidArgument(format!(
                    "minPrice {min} is greater than maxPrice {max}"
                )));
            }
        }

        debug!(?filter, "searching listings");
        Ok(self.listings.find_by_filters(&filter).await?)
    }

    /// Apply a partial edit in any status. Every field is validated before
    /// the single versioned write; a rejected field leaves the stored
    /// listing untouched.
    pub async fn update_listing(
        &self,
        listing_id: Uuid,
        cmd: UpdateListing,
    ) -> ListingResult<Listing> {
        if cmd.is_empty() {
            return Err(ListingError::InvalidArgument(
                "update must change at least one field".into(),
            ));
        }

        let mut listing = self.get_listing(listing_id).await?;
        if let Some(title) = &cmd.title {
            listing.update_title(title)?;
        }
        if let Some(description) = &cmd.description {
            listing.update_description(Some(description))?;
        }
        if cmd.price_amount.is_some() || cmd.price_currency.is_some() {
            let amount = cmd
                .price_amount
                .unwrap_or_else(|| listing.price().amount().clone());
            let currency = cmd.price_currency.unwrap_or(listing.price().currency());
            listing.update_price(Money::new(amount, currency)?);
        }
        if let Some(category) = cmd.category {
            listing.update_category(category);
        }

        let updated = self.listings.save(&listing).await?;
        info!(%listing_id, version = updated.version(), "listing updated");
        Ok(updated)
    }

    /// Publish a draft listing.
    ///
    /// A token that is live in the idempotency store is rejected with
    /// `IdempotencyConflict`, whichever listing it was bound to. Version
    /// conflicts are returned to the caller, never retried here.
    pub async fn publish_listing(
        &self,
        listing_id: Uuid,
        token: Option<&str>,
    ) -> ListingResult<Listing> {
        debug!(%listing_id, token, "publishing listing");

        let token = match token.map(str::trim) {
            Some("") => {
                return Err(ListingError::InvalidArgument(
                    "idempotency key cannot be blank".into(),
                ));
            }
            other => other,
        };

        if let Some(token) = token {
            if let Some(existing) = self.idempotency.lookup(token).await? {
                warn!(token, bound_to = %existing.listing_id, "idempotency key reused");
                return Err(ListingError::IdempotencyConflict {
                    token: token.to_string(),
                    listing_id: existing.listing_id,
                });
            }
        }

        let mut listing = self.get_listing(listing_id).await?;
        listing.publish()?;
        let published = self.listings.save(&listing).await?;

        self.audit
            .emit_best_effort(&DomainEvent::ListingPublished {
                listing_id: published.id(),
                title: published.title().to_string(),
                published_at: Utc::now(),
            })
            .await;

        if let Some(token) = token {
            self.idempotency
                .record(token, published.id(), PUBLISH_STATUS_CODE)
                .await
                .map_err(|err| ListingError::IdempotencyRecordFailed {
                    listing_id: published.id(),
                    token: token.to_string(),
                    reason: err.to_string(),
                })?;
        }

        info!(listing_id = %published.id(), version = published.version(), "listing published");
        Ok(published)
    }

    pub async fn archive_listing(&self, listing_id: Uuid) -> ListingResult<Listing> {
        let mut listing = self.get_listing(listing_id).await?;
        listing.archive()?;
        let archived = self.listings.save(&listing).await?;
        info!(%listing_id, "listing archived");
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::listing::ListingStatus;
    use crate::services::audit_service::tests::BrokenAuditStore;
    use crate::services::ports::{IdempotencyStore, StoreResult};
    use crate::services::test_support::{
        Harness, RacingListingStore, ReadOnlyIdempotencyStore, create_cmd, jpegs,
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use std::str::FromStr;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn create_listing_starts_as_draft() {
        let h = Harness::new().await;
        let listing = h
            .listings
            .create_listing(create_cmd("MacBook Pro", "2499.00"))
            .await
            .unwrap();

        assert_eq!(listing.status(), ListingStatus::Draft);
        assert_eq!(listing.photo_count(), 0);
        assert_eq!(listing.version(), Some(0));
    }

    #[tokio::test]
    async fn price_survives_reload_with_two_decimals() {
        let h = Harness::new().await;
        let created = h
            .listings
            .create_listing(create_cmd("Headphones", "19.99"))
            .await
            .unwrap();

        let reloaded = h.listings.get_listing(created.id()).await.unwrap();
        assert_eq!(reloaded.price().amount(), &BigDecimal::from_str("19.99").unwrap());
        assert_eq!(reloaded.price().amount().as_bigint_and_exponent().1, 2);
        assert_eq!(reloaded.price().currency(), Currency::Usd);
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_writing() {
        let h = Harness::new().await;
        let err = h
            .listings
            .create_listing(create_cmd("ok", "10"))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));

        let err = h
            .listings
            .create_listing(create_cmd("Negative price", "-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn publish_without_token_then_again_fails() {
        let h = Harness::new().await;
        let listing = h.draft().await;

        let published = h.listings.publish_listing(listing.id(), None).await.unwrap();
        assert_eq!(published.status(), ListingStatus::Published);
        assert_eq!(published.version(), Some(1));

        let err = h
            .listings
            .publish_listing(listing.id(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn reused_token_conflicts_for_any_listing() {
        let h = Harness::new().await;
        let first = h.draft().await;
        let second = h.draft().await;

        h.listings
            .publish_listing(first.id(), Some("T"))
            .await
            .unwrap();

        let err = h
            .listings
            .publish_listing(first.id(), Some("T"))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            ListingError::IdempotencyConflict { token, listing_id } if token == "T" && *listing_id == first.id()
        ));

        let err = h
            .listings
            .publish_listing(second.id(), Some("T"))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::IdempotencyConflict { .. }));
        let untouched = h.listings.get_listing(second.id()).await.unwrap();
        assert_eq!(untouched.status(), ListingStatus::Draft);

        let published = h
            .listings
            .publish_listing(second.id(), Some("T2"))
            .await
            .unwrap();
        assert_eq!(published.status(), ListingStatus::Published);
    }

    #[tokio::test]
    async fn expired_token_executes_fresh() {
        let h = Harness::new().await;
        let first = h.draft().await;
        let second = h.draft().await;

        let expired = crate::models::idempotency::IdempotencyRecord::new(
            "old-key",
            first.id(),
            "{}".into(),
            200,
            Utc::now() - Duration::hours(30),
            Duration::hours(24),
        )
        .unwrap();
        h.store.save_record(&expired).await.unwrap();

        let published = h
            .listings
            .publish_listing(second.id(), Some("old-key"))
            .await
            .unwrap();
        assert_eq!(published.status(), ListingStatus::Published);

        let record = h.store.find_by_key("old-key").await.unwrap().unwrap();
        assert_eq!(record.listing_id, second.id());
    }

    #[tokio::test]
    async fn blank_token_is_invalid_argument() {
        let h = Harness::new().await;
        let listing = h.draft().await;
        let err = h
            .listings
            .publish_listing(listing.id(), Some("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let h = Harness::new().await;
        let id = Uuid::new_v4();
        let err = h.listings.publish_listing(id, Some("k")).await.unwrap_err();
        assert!(matches!(err, ListingError::ListingNotFound(missing) if missing == id));
        assert!(h.store.find_by_key("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publish_writes_one_audit_entry() {
        let h = Harness::new().await;
        let listing = h.draft().await;
        h.listings.publish_listing(listing.id(), None).await.unwrap();

        let entries = h.store.audit_entries(listing.id()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "LISTING_PUBLISHED");
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_publish() {
        let h = Harness::new().await;
        let audit = AuditEmitter::new(Arc::new(BrokenAuditStore));
        let service = ListingService::new(
            Arc::new(h.store.clone()),
            IdempotencyCoordinator::with_default_ttl(Arc::new(h.store.clone())),
            audit.clone(),
        );
        let listing = h.draft().await;

        let published = service.publish_listing(listing.id(), Some("k")).await.unwrap();
        assert_eq!(published.status(), ListingStatus::Published);
        assert_eq!(audit.failure_count(), 1);
        assert!(h.store.find_by_key("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn token_bookkeeping_failure_is_distinct_and_publish_stays_committed() {
        let h = Harness::new().await;
        let service = ListingService::new(
            Arc::new(h.store.clone()),
            IdempotencyCoordinator::with_default_ttl(Arc::new(ReadOnlyIdempotencyStore(
                h.store.clone(),
            ))),
            AuditEmitter::new(Arc::new(h.store.clone())),
        );
        let listing = h.draft().await;

        let err = service
            .publish_listing(listing.id(), Some("k"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ListingError::IdempotencyRecordFailed { listing_id, .. } if listing_id == listing.id()
        ));

        let reloaded = h.listings.get_listing(listing.id()).await.unwrap();
        assert_eq!(reloaded.status(), ListingStatus::Published);
    }

    /// Listing store whose reads rendezvous before returning, so two
    /// concurrent workflows both observe the same version.
    struct RendezvousListingStore {
        inner: crate::services::sqlite_store::SqliteStore,
        barrier: Barrier,
    }

    #[async_trait]
    impl ListingStore for RendezvousListingStore {
        async fn save(&self, listing: &Listing) -> StoreResult<Listing> {
            self.inner.save(listing).await
        }

        async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Listing>> {
            let found = self.inner.find_by_id(id).await;
            self.barrier.wait().await;
            found
        }

        async fn find_by_filters(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
            self.inner.find_by_filters(filter).await
        }
    }

    #[tokio::test]
    async fn concurrent_publishes_yield_one_success_and_one_conflict() {
        let h = Harness::new().await;
        let listing = h.draft().await;
        let service = ListingService::new(
            Arc::new(RendezvousListingStore {
                inner: h.store.clone(),
                barrier: Barrier::new(2),
            }),
            IdempotencyCoordinator::with_default_ttl(Arc::new(h.store.clone())),
            AuditEmitter::new(Arc::new(h.store.clone())),
        );

        let (a, b) = tokio::join!(
            service.publish_listing(listing.id(), None),
            service.publish_listing(listing.id(), None),
        );

        let outcomes = [a, b];
        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(ListingError::ConcurrentModification(_))))
            .count();
        assert_eq!((successes, conflicts), (1, 1));

        // the loser never reached the audit step
        assert_eq!(h.store.audit_entries(listing.id()).await.len(), 1);
        let stored = h.listings.get_listing(listing.id()).await.unwrap();
        assert_eq!(stored.version(), Some(1));
    }

    #[tokio::test]
    async fn draft_to_published_with_photo_and_reused_key() {
        let h = Harness::new().await;
        let mut cmd = create_cmd("MacBook Pro", "2499.00");
        cmd.description = Some(String::new());
        let listing = h.listings.create_listing(cmd).await.unwrap();
        assert_eq!(listing.status(), ListingStatus::Draft);
        assert_eq!(listing.photo_count(), 0);

        h.photos
            .upload_photos(listing.id(), jpegs(listing.id(), 1))
            .await
            .unwrap();
        let reloaded = h.listings.get_listing(listing.id()).await.unwrap();
        assert_eq!(reloaded.photo_count(), 1);

        let published = h
            .listings
            .publish_listing(listing.id(), Some("key-1"))
            .await
            .unwrap();
        assert_eq!(published.status(), ListingStatus::Published);
        assert_eq!(published.photo_count(), 1);

        let err = h
            .listings
            .publish_listing(listing.id(), Some("key-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::IdempotencyConflict { .. }));
    }

    #[tokio::test]
    async fn archive_only_from_published() {
        let h = Harness::new().await;
        let listing = h.draft().await;

        let err = h.listings.archive_listing(listing.id()).await.unwrap_err();
        assert!(matches!(err, ListingError::InvalidStateTransition { .. }));

        h.listings.publish_listing(listing.id(), None).await.unwrap();
        let archived = h.listings.archive_listing(listing.id()).await.unwrap();
        assert_eq!(archived.status(), ListingStatus::Archived);

        let err = h.listings.publish_listing(listing.id(), None).await.unwrap_err();
        assert!(matches!(err, ListingError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn update_applies_only_given_fields_and_bumps_version() {
        let h = Harness::new().await;
        let listing = h.draft().await;

        let updated = h
            .listings
            .update_listing(
                listing.id(),
                UpdateListing {
                    title: Some("  MacBook Pro 16  ".into()),
                    price_amount: Some(BigDecimal::from_str("2299.5").unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title(), "MacBook Pro 16");
        assert_eq!(updated.price().amount(), &BigDecimal::from_str("2299.50").unwrap());
        assert_eq!(updated.price().currency(), Currency::Usd);
        assert_eq!(updated.description(), "16-inch, M3 Pro");
        assert_eq!(updated.category(), Category::Electronics);
        assert_eq!(updated.version(), Some(1));

        let recategorized = h
            .listings
            .update_listing(
                listing.id(),
                UpdateListing {
                    description: Some(String::new()),
                    price_currency: Some(Currency::Eur),
                    category: Some(Category::Other),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(recategorized.description(), "");
        assert_eq!(recategorized.price().currency(), Currency::Eur);
        assert_eq!(recategorized.price().amount(), &BigDecimal::from_str("2299.50").unwrap());
        assert_eq!(recategorized.category(), Category::Other);
    }

    #[tokio::test]
    async fn rejected_update_writes_nothing() {
        let h = Harness::new().await;
        let listing = h.draft().await;

        let err = h
            .listings
            .update_listing(
                listing.id(),
                UpdateListing {
                    title: Some("Renamed".into()),
                    description: Some("x".repeat(5001)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));

        let err = h
            .listings
            .update_listing(listing.id(), UpdateListing::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));

        let stored = h.listings.get_listing(listing.id()).await.unwrap();
        assert_eq!(stored.title(), "MacBook Pro");
        assert_eq!(stored.version(), Some(0));
    }

    #[tokio::test]
    async fn update_is_allowed_after_archive_and_unknown_listing_is_not_found() {
        let h = Harness::new().await;
        let listing = h.draft().await;
        h.listings.publish_listing(listing.id(), None).await.unwrap();
        h.listings.archive_listing(listing.id()).await.unwrap();

        let cmd = UpdateListing {
            title: Some("Sold out".into()),
            ..Default::default()
        };
        let updated = h.listings.update_listing(listing.id(), cmd.clone()).await.unwrap();
        assert_eq!(updated.status(), ListingStatus::Archived);
        assert_eq!(updated.title(), "Sold out");

        let missing = Uuid::new_v4();
        let err = h.listings.update_listing(missing, cmd).await.unwrap_err();
        assert!(matches!(err, ListingError::ListingNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn stale_update_is_a_concurrent_modification() {
        let h = Harness::new().await;
        let listing = h.draft().await;
        let service = ListingService::new(
            Arc::new(RacingListingStore(h.store.clone())),
            IdempotencyCoordinator::with_default_ttl(Arc::new(h.store.clone())),
            h.audit.clone(),
        );

        let err = service
            .update_listing(
                listing.id(),
                UpdateListing {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::ConcurrentModification(id) if id == listing.id()));
    }

    #[tokio::test]
    async fn list_listings_filters_by_status_and_price() {
        let h = Harness::new().await;
        let cheap = h
            .listings
            .create_listing(create_cmd("Phone case", "9.99"))
            .await
            .unwrap();
        let laptop = h.draft().await;
        h.listings.publish_listing(laptop.id(), None).await.unwrap();

        let all = h.listings.list_listings(ListingFilter::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(Listing::id).collect();
        assert_eq!(ids, [laptop.id(), cheap.id()]);

        let published = h
            .listings
            .list_listings(ListingFilter {
                status: Some(ListingStatus::Published),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id(), laptop.id());

        let under_ten = h
            .listings
            .list_listings(ListingFilter {
                max_price: Some(BigDecimal::from(10)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(under_ten.len(), 1);
        assert_eq!(under_ten[0].title(), "Phone case");
    }

    #[tokio::test]
    async fn list_listings_rejects_bad_price_bounds() {
        let h = Harness::new().await;
        let negative = ListingFilter {
            min_price: Some(BigDecimal::from(-1)),
            ..Default::default()
        };
        let err = h.listings.list_listings(negative).await.unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(msg) if msg.contains("minPrice")));

        let inverted = ListingFilter {
            min_price: Some(BigDecimal::from(100)),
            max_price: Some(BigDecimal::from(10)),
            ..Default::default()
        };
        let err = h.listings.list_listings(inverted).await.unwrap_err();
        assert!(matches!(err, ListingError::InvalidArgument(_)));
    }
}
