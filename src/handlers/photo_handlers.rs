//! HTTP handlers for listing photos.
//! Multipart parts named `files` make up one upload batch; everything else in
//! the form is ignored.

use crate::{
    errors::AppError,
    models::photo::ListingPhoto,
    services::photo_service::PhotoUpload,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Form field carrying photo files.
const FILES_FIELD: &str = "files";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ListingPhoto> for PhotoResponse {
    fn from(photo: &ListingPhoto) -> Self {
        Self {
            id: photo.id(),
            listing_id: photo.listing_id(),
            filename: photo.metadata().filename().to_string(),
            content_type: photo.metadata().content_type().to_string(),
            size_bytes: photo.metadata().size_bytes(),
            storage_path: photo.storage_path().to_string(),
            created_at: photo.created_at(),
        }
    }
}

/// `POST /listings/{id}/photos`
pub async fn upload_photos(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("could not read `{filename}`: {err}")))?;

        files.push(PhotoUpload {
            listing_id,
            filename,
            content_type,
            bytes,
        });
    }

    let photos = state.photos.upload_photos(listing_id, files).await?;
    let body: Vec<PhotoResponse> = photos.iter().map(PhotoResponse::from).collect();
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /listings/{id}/photos`
pub async fn list_photos(
    State(state): State<AppState>,
    Path(listing_id): Path<Uuid>,
) -> Result<Json<Vec<PhotoResponse>>, AppError> {
    let photos = state.photos.list_photos(listing_id).await?;
    Ok(Json(photos.iter().map(PhotoResponse::from).collect()))
}
