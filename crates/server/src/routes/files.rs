use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::storage::content_type_for;
use crate::AppState;

/// GET /api/files/{id}/{fileName}
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path((id, file_name)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let path = state.files.path_of(&id, &file_name)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| AppError::NotFound("File"))?;

    let content_type = content_type_for(&file_name);
    let disposition = if content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
    {
        "inline".to_string()
    } else {
        format!("attachment; filename=\"{}\"", file_name)
    };

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        body,
    ))
}
