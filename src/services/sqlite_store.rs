//! src/services/sqlite_store.rs
//!
//! SqliteStore: listing, photo, idempotency and audit records in SQLite.
//! Listing writes are compare-and-swap on the `version` column; the listing
//! row and any new photo rows commit in one transaction.

use crate::models::{
    audit::AuditLog,
    idempotency::IdempotencyRecord,
    listing::{Listing, ListingParts, Money},
    photo::{ListingPhoto, PhotoMetadata},
};
use crate::services::ports::{
    AuditStore, IdempotencyStore, ListingFilter, ListingStore, PhotoStore, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::{collections::HashSet, str::FromStr, sync::Arc};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const LISTING_COLUMNS: &str = "id, title, description, price_amount, price_currency, category, \
                               status, created_at, updated_at, version";
const PHOTO_COLUMNS: &str =
    "id, listing_id, filename, content_type, size_bytes, storage_path, created_at";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct ListingRow {
    id: Uuid,
    title: String,
    description: String,
    price_amount: String,
    price_currency: String,
    category: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

#[derive(FromRow)]
struct PhotoRow {
    id: Uuid,
    listing_id: Uuid,
    filename: String,
    content_type: String,
    size_bytes: i64,
    storage_path: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct IdempotencyRow {
    id: Uuid,
    idempotency_key: String,
    listing_id: Uuid,
    result_json: String,
    status_code: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn corrupt(err: impl ToString) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

impl ListingRow {
    fn into_listing(self, photos: Vec<ListingPhoto>) -> StoreResult<Listing> {
        let amount = BigDecimal::from_str(&self.price_amount).map_err(corrupt)?;
        let currency = self.price_currency.parse().map_err(corrupt)?;
        Listing::reconstitute(ListingParts {
            id: self.id,
            title: self.title,
            description: self.description,
            price: Money::new(amount, currency).map_err(corrupt)?,
            category: self.category.parse().map_err(corrupt)?,
            status: self.status.parse().map_err(corrupt)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            photos,
        })
        .map_err(corrupt)
    }
}

impl PhotoRow {
    fn into_photo(self) -> StoreResult<ListingPhoto> {
        let size = u64::try_from(self.size_bytes).map_err(corrupt)?;
        let metadata = PhotoMetadata::new(&self.filename, &self.content_type, size).map_err(corrupt)?;
        ListingPhoto::reconstitute(
            self.id,
            self.listing_id,
            metadata,
            self.storage_path,
            self.created_at,
        )
        .map_err(corrupt)
    }
}

impl IdempotencyRow {
    fn into_record(self) -> StoreResult<IdempotencyRecord> {
        Ok(IdempotencyRecord {
            id: self.id,
            key: self.idempotency_key,
            listing_id: self.listing_id,
            result_json: self.result_json,
            status_code: u16::try_from(self.status_code).map_err(corrupt)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

impl SqliteStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> StoreResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    /// Cheap connectivity probe used by readiness checks.
    pub async fn ping(&self) -> StoreResult<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&*self.db).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(corrupt(format!("unexpected probe result {one}")))
        }
    }

    /// Single-connection in-memory database with the schema applied.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let store = Self::new(Arc::new(pool));
        store.migrate().await.expect("schema applies");
        store
    }

    #[cfg(test)]
    pub async fn audit_entries(&self, listing_id: Uuid) -> Vec<(String, String)> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT event_type, payload_json FROM audit_logs WHERE listing_id = ? ORDER BY rowid",
        )
        .bind(listing_id)
        .fetch_all(&*self.db)
        .await
        .expect("audit query")
    }
}

async fn load_photos(conn: &mut SqliteConnection, listing_id: Uuid) -> StoreResult<Vec<ListingPhoto>> {
    let rows = sqlx::query_as::<_, PhotoRow>(&format!(
        "SELECT {PHOTO_COLUMNS} FROM listing_photos WHERE listing_id = ? ORDER BY position ASC"
    ))
    .bind(listing_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(PhotoRow::into_photo).collect()
}

async fn load_listing(conn: &mut SqliteConnection, id: Uuid) -> StoreResult<Option<Listing>> {
    let row = sqlx::query_as::<_, ListingRow>(&format!(
        "SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let photos = load_photos(conn, id).await?;
    row.into_listing(photos).map(Some)
}

/// Escape `LIKE` wildcards so user text matches literally under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

async fn insert_photo(
    conn: &mut SqliteConnection,
    photo: &ListingPhoto,
    position: i64,
) -> StoreResult<()> {
    let size = i64::try_from(photo.metadata().size_bytes()).map_err(corrupt)?;
    sqlx::query(
        "INSERT INTO listing_photos (
            id, listing_id, position, filename, content_type, size_bytes, storage_path, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(photo.id())
    .bind(photo.listing_id())
    .bind(position)
    .bind(photo.metadata().filename())
    .bind(photo.metadata().content_type())
    .bind(size)
    .bind(photo.storage_path())
    .bind(photo.created_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn save(&self, listing: &Listing) -> StoreResult<Listing> {
        let mut tx = self.db.begin().await?;

        match listing.version() {
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO listings (
                        id, title, description, price_amount, price_currency, category,
                        status, created_at, updated_at, version
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
                )
                .bind(listing.id())
                .bind(listing.title())
                .bind(listing.description())
                .bind(listing.price().amount().to_string())
                .bind(listing.price().currency().as_str())
                .bind(listing.category().as_str())
                .bind(listing.status().as_str())
                .bind(listing.created_at())
                .bind(listing.updated_at())
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => {}
                    Err(err) if is_unique_violation(&err) => {
                        return Err(StoreError::DuplicateKey(listing.id().to_string()));
                    }
                    Err(err) => return Err(StoreError::Sqlx(err)),
                }
            }
            Some(version) => {
                let result = sqlx::query(
                    "UPDATE listings SET
                        title = ?, description = ?, price_amount = ?, price_currency = ?,
                        category = ?, status = ?, updated_at = ?, version = version + 1
                     WHERE id = ? AND version = ?",
                )
                .bind(listing.title())
                .bind(listing.description())
                .bind(listing.price().amount().to_string())
                .bind(listing.price().currency().as_str())
                .bind(listing.category().as_str())
                .bind(listing.status().as_str())
                .bind(listing.updated_at())
                .bind(listing.id())
                .bind(version)
                .execute(&mut *tx)
                .await?;

                // dropping `tx` rolls back
                if result.rows_affected() == 0 {
                    return Err(StoreError::ConcurrentModification(listing.id()));
                }
            }
        }

        // photos are append-only; only the ones not yet on disk are written
        let persisted: HashSet<Uuid> =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM listing_photos WHERE listing_id = ?")
                .bind(listing.id())
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
        for (position, photo) in listing.photos().iter().enumerate() {
            if persisted.contains(&photo.id()) {
                continue;
            }
            let position = i64::try_from(position).map_err(corrupt)?;
            insert_photo(&mut tx, photo, position).await?;
        }

        let saved = load_listing(&mut tx, listing.id())
            .await?
            .ok_or_else(|| corrupt(format!("listing `{}` vanished during save", listing.id())))?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Listing>> {
        // listing row and photo rows must come from the same snapshot
        let mut tx = self.db.begin().await?;
        let listing = load_listing(&mut tx, id).await?;
        tx.commit().await?;
        Ok(listing)
    }

    async fn find_by_filters(&self, filter: &ListingFilter) -> StoreResult<Vec<Listing>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {LISTING_COLUMNS} FROM listings WHERE 1 = 1"));

        let text = filter.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
        if let Some(text) = text {
            // SQLite LOWER only folds ASCII
            let pattern = format!("%{}%", escape_like(&text.to_ascii_lowercase()));
            builder
                .push(" AND (LOWER(title) LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR LOWER(description) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(min) = &filter.min_price {
            builder
                .push(" AND CAST(price_amount AS REAL) >= CAST(")
                .push_bind(min.to_string())
                .push(" AS REAL)");
        }
        if let Some(max) = &filter.max_price {
            builder
                .push(" AND CAST(price_amount AS REAL) <= CAST(")
                .push_bind(max.to_string())
                .push(" AS REAL)");
        }
        builder.push(" ORDER BY created_at DESC, id ASC");

        let mut tx = self.db.begin().await?;
        let rows = builder.build_query_as::<ListingRow>().fetch_all(&mut *tx).await?;
        let mut listings = Vec::with_capacity(rows.len());
        for row in rows {
            let photos = load_photos(&mut tx, row.id).await?;
            listings.push(row.into_listing(photos)?);
        }
        tx.commit().await?;
        debug!("Filter {:?} matched {} listings", filter, listings.len());
        Ok(listings)
    }
}

#[async_trait]
impl PhotoStore for SqliteStore {
    async fn find_by_listing_id(&self, listing_id: Uuid) -> StoreResult<Vec<ListingPhoto>> {
        let mut conn = self.db.acquire().await?;
        load_photos(&mut conn, listing_id).await
    }
}

#[async_trait]
impl IdempotencyStore for SqliteStore {
    async fn save_record(&self, record: &IdempotencyRecord) -> StoreResult<IdempotencyRecord> {
        let mut tx = self.db.begin().await?;

        // an expired row may still be physically present until the sweep runs
        sqlx::query("DELETE FROM idempotency_records WHERE idempotency_key = ? AND expires_at <= ?")
            .bind(&record.key)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO idempotency_records (
                id, idempotency_key, listing_id, result_json, status_code, created_at, expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.key)
        .bind(record.listing_id)
        .bind(&record.result_json)
        .bind(i64::from(record.status_code))
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::DuplicateKey(record.key.clone()));
            }
            Err(err) => return Err(StoreError::Sqlx(err)),
        }

        tx.commit().await?;
        Ok(record.clone())
    }

    async fn find_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        sqlx::query_as::<_, IdempotencyRow>(
            "SELECT id, idempotency_key, listing_id, result_json, status_code, created_at, expires_at
             FROM idempotency_records WHERE idempotency_key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .map(IdempotencyRow::into_record)
        .transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= ?")
            .bind(now)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append(&self, entry: &AuditLog) -> StoreResult<AuditLog> {
        sqlx::query(
            "INSERT INTO audit_logs (id, event_type, listing_id, payload_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(&entry.event_type)
        .bind(entry.listing_id)
        .bind(&entry.payload_json)
        .bind(entry.created_at)
        .execute(&*self.db)
        .await?;
        Ok(entry.clone())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
