use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

use crate::error::{AppError, Result};
use crate::storage::BlobId;
use crate::AppState;

/// Stream a stored media file
/// GET /api/media/:file_id
///
/// Transmission starts as soon as the first chunk is read; a chunk failure
/// mid-stream aborts the connection instead of ending a 200 early.
pub async fn get_media(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let blob_id = BlobId::parse(&file_id)?;
    let (file, reader) = state.blobs.open_read(blob_id).await?;

    let fallback_name = file.filename.replace(['"', '\\'], "_");
    let encoded_name = urlencoding::encode(&file.filename).into_owned();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.content_type)
        .header(header::CONTENT_LENGTH, file.length)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "inline; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        .body(Body::from_stream(reader.into_stream()))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
