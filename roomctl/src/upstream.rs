//! Outbound calls to the image-editing API.
//!
//! [`UpstreamClient`] sends a shaped [`UpstreamRequest`] as a multipart POST authenticated with
//! an `x-api-key` header, and either returns the image bytes or classifies the failure.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use tracing::{debug, instrument};

use crate::{
    config::UpstreamConfig,
    errors::{Endpoint, Error, Result, upstream_error_detail},
    translate::UpstreamRequest,
};

/// Content type assumed when the upstream omits one
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
}

/// A successful upstream response, relayed to the browser unchanged.
#[derive(Debug, Clone)]
pub struct UpstreamImage {
    pub media_type: String,
    pub bytes: Bytes,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create upstream HTTP client: {}", e))?;
        Ok(Self { client })
    }

    /// Sends one request. Exactly one upstream call is made; there are no retries.
    #[instrument(skip_all, fields(endpoint = ?endpoint, url = %request.url, bytes = request.bytes.len()))]
    pub async fn send(&self, endpoint: Endpoint, api_key: &str, request: UpstreamRequest) -> Result<UpstreamImage> {
        let UpstreamRequest {
            url,
            file_field,
            filename,
            media_type,
            bytes,
            fields,
        } = request;

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str(&media_type)
            .map_err(|source| Error::Network { endpoint, source })?;

        let form = fields
            .into_iter()
            .fold(Form::new().part(file_field, part), |form, (name, value)| form.text(name, value));

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|source| Error::Network { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!(error = %e, "Failed to read upstream error body");
                String::new()
            });
            debug!(status = status.as_u16(), body_len = body.len(), "Upstream returned an error status");
            return Err(Error::Upstream {
                endpoint,
                status: status.as_u16(),
                detail: upstream_error_detail(&body),
            });
        }

        let media_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE)
            .to_string();

        let bytes = response.bytes().await.map_err(|source| Error::Network { endpoint, source })?;
        debug!(media_type = %media_type, bytes = bytes.len(), "Upstream returned an image");

        Ok(UpstreamImage { media_type, bytes })
    }
}

impl IntoResponse for UpstreamImage {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, self.media_type),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            self.bytes,
        )
            .into_response()
    }
}
