//! Routes for the listing lifecycle and listing photos.
//!
//! - `GET  /healthz`, `GET /readyz`: probes
//! - `POST /listings`: create a draft listing
//! - `GET  /listings`: search by text, category, status and price range
//! - `GET  /listings/{id}`: read a listing with its photos
//! - `PATCH /listings/{id}`: edit title, description, price or category
//! - `POST /listings/{id}/publish`: publish (optional `Idempotency-Key`)
//! - `POST /listings/{id}/archive`: archive a published listing
//! - `POST /listings/{id}/photos`: multipart batch upload (`files` parts)
//! - `GET  /listings/{id}/photos`: list photos in position order

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        listing_handlers::{
            archive_listing, create_listing, get_listing, list_listings, publish_listing,
            update_listing,
        },
        photo_handlers::{list_photos, upload_photos},
    },
    models::{listing::MAX_PHOTOS, photo::MAX_PHOTO_BYTES},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart framing around a full batch.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Largest upload body: a full batch of maximum-size photos.
fn photo_body_limit() -> usize {
    MAX_PHOTOS * MAX_PHOTO_BYTES as usize + MULTIPART_OVERHEAD
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/listings", post(create_listing).get(list_listings))
        .route("/listings/{id}", get(get_listing).patch(update_listing))
        .route("/listings/{id}/publish", post(publish_listing))
        .route("/listings/{id}/archive", post(archive_listing))
        .route(
            "/listings/{id}/photos",
            post(upload_photos)
                .get(list_photos)
                .layer(DefaultBodyLimit::max(photo_body_limit())),
        )
}
