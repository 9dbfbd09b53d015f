//! Virtual Try-On Client
//!
//! Forwards a person photo and a garment photo to the external generative
//! image API and returns its rendering. Both images travel base64 encoded.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{AppError, AppResult, ErrorCode, TryOnConfig};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

#[derive(Debug, Serialize)]
pub struct TryOnUpstreamRequest<'a> {
    pub person_image: &'a str,
    pub garment_image: &'a str,
    pub category: &'a str,
}

/// Upstream answer; at least one field must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TryOnResult {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl TryOnResult {
    fn is_empty(&self) -> bool {
        self.image.as_deref().map_or(true, str::is_empty)
            && self.image_url.as_deref().map_or(true, str::is_empty)
    }
}

pub struct TryOnClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl TryOnClient {
    pub fn new(config: &TryOnConfig) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        info!("👗 Try-on upstream configured (key hidden)");

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Render `garment_image` onto `person_image`
    pub async fn render(
        &self,
        person_image: &str,
        garment_image: &str,
        category: &str,
    ) -> AppResult<TryOnResult> {
        let mut request = self.client.post(&self.api_url).json(&TryOnUpstreamRequest {
            person_image,
            garment_image,
            category,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status.as_u16(), "Try-on upstream failed: {}", truncate(&body, 200));
            return Err(AppError::new(
                ErrorCode::TryOnUpstreamError,
                format!("Try-on service returned HTTP {}", status.as_u16()),
            ));
        }

        let result: TryOnResult = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AppError::from(e)
            } else {
                AppError::tryon_upstream(format!("Unreadable try-on response: {}", e))
            }
        })?;

        if result.is_empty() {
            return Err(AppError::tryon_upstream("Try-on service returned no image"));
        }

        Ok(result)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
