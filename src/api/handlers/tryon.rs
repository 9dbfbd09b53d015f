//! Virtual try-on proxy

use axum::extract::State;
use std::sync::Arc;
use tracing::info;

use super::{ok, ApiResult, AppState};
use crate::api::extract::{ApiJson, AuthUser};
use crate::api::types::{TryOnRequest, TryOnResponse};
use crate::models::{AppError, AppResult, ErrorCode};

/// Strip an optional `data:<mime>;base64,` prefix and check the payload decodes
/// to a non-empty image of at most `max_bytes`
pub fn decode_person_image(raw: &str, max_bytes: usize) -> AppResult<&str> {
    let raw = raw.trim();
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| AppError::bad_request("Malformed data URL in person_image"))?;
            if !header.ends_with(";base64") {
                return Err(AppError::bad_request("person_image data URL must be base64 encoded"));
            }
            data
        }
        None => raw,
    };

    let decoded = base64::decode(payload)
        .map_err(|_| AppError::bad_request("person_image is not valid base64"))?;

    if decoded.is_empty() {
        return Err(AppError::bad_request("person_image is empty"));
    }
    if decoded.len() > max_bytes {
        return Err(AppError::new(
            ErrorCode::UploadTooLarge,
            format!("person_image exceeds the {} byte limit", max_bytes),
        ));
    }

    Ok(payload)
}

pub async fn try_on(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<TryOnRequest>,
) -> ApiResult<TryOnResponse> {
    let client = state
        .tryon
        .as_ref()
        .ok_or_else(|| AppError::new(ErrorCode::TryOnDisabled, "Virtual try-on is not configured"))?;

    let person_image = decode_person_image(&req.person_image, state.config.max_upload_bytes)?;

    let listing = state
        .store
        .find_listing(req.listing_id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing"))?;

    let index = req.image_index.unwrap_or(0);
    let garment_key = listing.image_keys.get(index).ok_or_else(|| {
        AppError::bad_request(format!(
            "image_index {} is out of range; the listing has {} images",
            index,
            listing.image_keys.len()
        ))
    })?;

    let garment = state
        .storage
        .get(garment_key)
        .await?
        .ok_or_else(|| AppError::not_found("Garment image"))?;

    let (allowed, _, reset) = state.tryon_limiter.check(&auth.id().to_string());
    if !allowed {
        return Err(AppError::rate_limited(reset));
    }

    let result = client
        .render(person_image, &base64::encode(&garment), &listing.category)
        .await?;
    info!(user = %auth.id(), listing = %listing.id, "👗 Try-on rendered");

    ok(TryOnResponse {
        listing_id: listing.id,
        image: result.image,
        image_url: result.image_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_person_image() {
        let encoded = base64::encode(b"jpeg-bytes");
        assert_eq!(decode_person_image(&encoded, 100).unwrap(), encoded);

        let data_url = format!("data:image/jpeg;base64,{}", encoded);
        assert_eq!(decode_person_image(&data_url, 100).unwrap(), encoded);
    }

    #[test]
    fn test_decode_person_image_rejects() {
        assert_eq!(
            decode_person_image("not base64!!", 100).unwrap_err().code,
            ErrorCode::ApiBadRequest
        );
        assert_eq!(
            decode_person_image("data:image/png,abc", 100).unwrap_err().code,
            ErrorCode::ApiBadRequest
        );
        assert_eq!(decode_person_image("", 100).unwrap_err().code, ErrorCode::ApiBadRequest);

        let big = base64::encode(vec![0u8; 101]);
        assert_eq!(
            decode_person_image(&big, 100).unwrap_err().code,
            ErrorCode::UploadTooLarge
        );
    }
}
