//! Image uploads into object storage

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{created, ApiStatusResult, AppState};
use crate::api::extract::{ApiPath, AuthUser};
use crate::api::types::ImageUploadResponse;
use crate::core::validation::is_owned_upload;
use crate::models::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{image_extension, user_upload_prefix};

const FILE_FIELD: &str = "file";

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(ErrorCode::UploadTooLarge, "Upload exceeds the size limit")
    } else {
        AppError::bad_request(err.body_text())
    }
}

/// Accept one image in the multipart field `file`
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiStatusResult<ImageUploadResponse> {
    let mut multipart = multipart.map_err(|e| AppError::bad_request(e.body_text()))?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let ext = image_extension(&content_type).ok_or_else(|| {
            AppError::new(
                ErrorCode::UploadUnsupportedType,
                format!("Unsupported image type '{}'; use JPEG, PNG or WebP", content_type),
            )
        })?;

        let data = field.bytes().await.map_err(multipart_error)?;
        check_size(&data, state.config.max_upload_bytes)?;

        let key = format!("{}{}.{}", user_upload_prefix(&auth.id()), Uuid::new_v4(), ext);
        let size = data.len();
        state.storage.put(&key, data, &content_type).await?;
        info!(user = %auth.id(), key = %key, size, "🖼️  Image uploaded");

        let url = state.storage.public_url(&key);
        return created(ImageUploadResponse { key, url });
    }

    Err(AppError::bad_request("Multipart field 'file' is required"))
}

fn check_size(data: &Bytes, max: usize) -> AppResult<()> {
    if data.is_empty() {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }
    if data.len() > max {
        return Err(AppError::new(
            ErrorCode::UploadTooLarge,
            format!("Upload exceeds the {} byte limit", max),
        ));
    }
    Ok(())
}

/// Delete one of the caller's unreferenced uploads
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(key): ApiPath<String>,
) -> AppResult<StatusCode> {
    let key = key.trim_start_matches('/');

    if !is_owned_upload(&user_upload_prefix(&auth.id()), key) {
        return Err(AppError::forbidden("You can only delete your own uploads"));
    }
    if !state.storage.exists(key).await? {
        return Err(AppError::not_found("Image"));
    }
    if state.store.referenced_object_keys().await?.contains(key) {
        return Err(AppError::conflict("Image is still used by a listing or avatar"));
    }

    state.storage.delete(key).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_size() {
        assert!(check_size(&Bytes::from_static(b"abc"), 3).is_ok());
        assert_eq!(check_size(&Bytes::new(), 3).unwrap_err().code, ErrorCode::ApiBadRequest);
        assert_eq!(
            check_size(&Bytes::from_static(b"abcd"), 3).unwrap_err().code,
            ErrorCode::UploadTooLarge
        );
    }
}
