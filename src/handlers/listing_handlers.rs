//! HTTP handlers for the listing lifecycle.

use crate::{
    errors::AppError,
    handlers::photo_handlers::PhotoResponse,
    models::listing::{Category, Currency, Listing, ListingStatus},
    services::{
        listing_service::{CreateListing, UpdateListing},
        ports::ListingFilter,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request header carrying the client's publish token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Decimal string, always two fractional digits.
    pub price_amount: String,
    pub price_currency: Currency,
    pub category: Category,
    pub status: ListingStatus,
    pub photo_count: usize,
    pub photos: Vec<PhotoResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: Option<i64>,
}

impl From<&Listing> for ListingResponse {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id(),
            title: listing.title().to_string(),
            description: listing.description().to_string(),
            price_amount: listing.price().amount().to_string(),
            price_currency: listing.price().currency(),
            category: listing.category(),
            status: listing.status(),
            photo_count: listing.photo_count(),
            photos: listing.photos().iter().map(PhotoResponse::from).collect(),
            created_at: listing.created_at(),
            updated_at: listing.updated_at(),
            version: listing.version(),
        }
    }
}

/// Query string of `GET /listings`; every parameter is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    pub query: Option<String>,
    pub category: Option<Category>,
    pub status: Option<ListingStatus>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
}

impl From<ListingQuery> for ListingFilter {
    fn from(q: ListingQuery) -> Self {
        Self {
            query: q.query,
            category: q.category,
            status: q.status,
            min_price: q.min_price,
            max_price: q.max_price,
        }
    }
}

/// `GET /listings`
pub async fn list_listings(
    State(state): State<AppState>,
    query: Result<Query<ListingQuery>, QueryRejection>,
) -> Result<Json<Vec<ListingResponse>>, AppError> {
    let Query(query) = query.map_err(|err| AppError::bad_request(err.body_text()))?;
    let listings = state.listings.list_listings(query.into()).await?;
    Ok(Json(listings.iter().map(ListingResponse::from).collect()))
}

/// `POST /listings`
pub async fn create_listing(
    State(state): State<AppState>,
    body: Result<Json<CreateListing>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(cmd) = body.map_err(|err| AppError::bad_request(err.body_text()))?;
    let listing = state.listings.create_listing(cmd).await?;
    Ok((StatusCode::CREATED, Json(ListingResponse::from(&listing))))
}

/// `GET /listings/{id}`
pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ListingResponse>, AppError> {
    let listing = state.listings.get_listing(listing_id).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// `PATCH /listings/{id}`
pub async fn update_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    body: Result<Json<UpdateListing>, JsonRejection>,
) -> Result<Json<ListingResponse>, AppError> {
    let Json(cmd) = body.map_err(|err| AppError::bad_request(err.body_text()))?;
    let listing = state.listings.update_listing(listing_id, cmd).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// `POST /listings/{id}/publish`
///
/// The optional `Idempotency-Key` header makes the publish single-use per
/// key for the key's lifetime.
pub async fn publish_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ListingResponse>, AppError> {
    let token = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::bad_request("Idempotency-Key must be visible ASCII"))
        })
        .transpose()?;

    let listing = state.listings.publish_listing(listing_id, token).await?;
    Ok(Json(ListingResponse::from(&listing)))
}

/// `POST /listings/{id}/archive`
pub async fn archive_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<ListingResponse>, AppError> {
    let listing = state.listings.archive_listing(listing_id).await?;
    Ok(Json(ListingResponse::from(&listing)))
}
