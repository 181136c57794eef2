//! HTTP handlers for the image upload endpoints.
//!
//! Both handlers follow the same pipeline: check the API key, read the multipart form, validate the
//! upload, shape the upstream request and relay the upstream's answer. Validation failures return
//! before any upstream call is made.

use std::collections::HashMap;

use axum::extract::{
    Multipart, State,
    multipart::{MultipartError, MultipartRejection},
};
use tracing::{debug, instrument};

use crate::{
    AppState,
    errors::{Endpoint, Error, Result},
    translate::{self, Variant},
    upload::{self, UploadedImage},
    upstream::UpstreamImage,
};

/// Multipart field carrying the image on both endpoints
pub const IMAGE_FIELD: &str = "image_file";
pub const OUTPUT_VARIANT_FIELD: &str = "output_variant";
pub const BACKGROUND_COLOR_FIELD: &str = "background_color";

/// A parsed upload form: the first `image_file` part plus every text field.
#[derive(Debug, Default)]
struct UploadForm {
    image: Option<UploadedImage>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn take_image(&mut self) -> Result<UploadedImage> {
        self.image.take().ok_or(Error::MissingImageFile)
    }
}

/// Reads the whole form into memory. The router's body limit bounds how much that can be.
async fn read_form(multipart: std::result::Result<Multipart, MultipartRejection>, max_upload_bytes: u64) -> Result<UploadForm> {
    let mut multipart = multipart.map_err(|e| Error::InvalidMultipart { message: e.body_text() })?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_upload_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == IMAGE_FIELD {
            if form.image.is_some() {
                debug!("Ignoring repeated {} part", IMAGE_FIELD);
                continue;
            }
            let content_type = field.content_type().unwrap_or_default().to_string();
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_upload_bytes))?;
            form.image = Some(UploadedImage::new(bytes.to_vec(), content_type, filename));
        } else {
            let value = field.text().await.map_err(|e| multipart_error(e, max_upload_bytes))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// A body cut off by the size limit is still an oversized upload.
fn multipart_error(error: MultipartError, max_upload_bytes: u64) -> Error {
    if error.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        Error::FileTooLarge {
            max_bytes: max_upload_bytes,
        }
    } else {
        Error::InvalidMultipart {
            message: error.body_text(),
        }
    }
}

/// `POST /api/remove-bg`
///
/// Accepts a multipart form with an `image_file` part (HEIC/HEIF included) and returns the
/// background-removed image from the segment API.
#[instrument(skip_all)]
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<UpstreamImage> {
    let config = state.config.as_ref();
    let api_key = config.upstream_api_key()?;

    let mut form = read_form(multipart, config.max_upload_bytes).await?;
    let image = form.take_image()?;

    upload::check_not_empty(&image)?;
    upload::check_remove_bg(&image)?;
    upload::check_size(&image, config.max_upload_bytes)?;

    debug!(
        filename = %image.filename,
        content_type = %image.declared_content_type,
        bytes = image.len(),
        "Forwarding remove-background upload"
    );

    let request = translate::remove_background(config, image);
    state.upstream.send(Endpoint::RemoveBackground, api_key, request).await
}

/// `POST /api/advanced-edit`
///
/// Accepts `image_file`, an optional `output_variant` (default `ghost_mannequin`) and an optional
/// `background_color` used only by ghost mannequin. HEIC/HEIF is rejected on this path.
#[instrument(skip_all)]
pub async fn advanced_edit(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<UpstreamImage> {
    let config = state.config.as_ref();
    let api_key = config.upstream_api_key()?;

    let mut form = read_form(multipart, config.max_upload_bytes).await?;
    let image = form.take_image()?;

    let variant = match form.text(OUTPUT_VARIANT_FIELD) {
        Some(value) => value.parse::<Variant>()?,
        None => Variant::default(),
    };

    upload::check_not_empty(&image)?;
    upload::check_advanced(&image)?;
    upload::check_size(&image, config.max_upload_bytes)?;

    let prompt = translate::load_prompt(&config.prompts_dir, variant).await;
    let requested_color = form.text(BACKGROUND_COLOR_FIELD).unwrap_or_default();

    debug!(
        variant = %variant,
        filename = %image.filename,
        bytes = image.len(),
        "Forwarding advanced edit upload"
    );

    let request = translate::advanced_edit(config, variant, requested_color, prompt, image)?;
    state.upstream.send(Endpoint::AdvancedEdit, api_key, request).await
}

#[cfg(test)]
mod tests {
    use crate::{
        config::ApiKey,
        errors::ErrorEnvelope,
        test_utils::{create_test_app, create_test_config},
    };
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    fn image_part(bytes: &[u8], file_name: &str, mime: &str) -> Part {
        Part::bytes(bytes.to_vec()).file_name(file_name).mime_type(mime)
    }

    fn png_form() -> MultipartForm {
        MultipartForm::new().add_part("image_file", image_part(PNG_BYTES, "shirt.png", "image/png"))
    }

    /// Mounts an upstream that fails the test if it is ever called.
    async fn untouched_upstream() -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[test_log::test(tokio::test)]
    async fn test_remove_bg_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/segment"))
            .and(header("x-api-key", "sandbox_test_key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"cutout".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let response = server.post("/api/remove-bg").multipart(png_form()).await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.header("content-type"), "image/png");
        assert_eq!(response.header("cache-control"), "no-store");
        assert_eq!(response.as_bytes().as_ref(), b"cutout");
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_api_key_makes_no_upstream_call() {
        let mock_server = untouched_upstream().await;
        let mut config = create_test_config(&mock_server.uri());
        config.api_key = None;
        let server = create_test_app(config);

        for route in ["/api/remove-bg", "/api/advanced-edit"] {
            let response = server.post(route).multipart(png_form()).await;

            response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            let envelope: ErrorEnvelope = response.json();
            assert_eq!(envelope.error, "missing_api_key");
            assert_eq!(envelope.message, "PHOTOROOM_API_KEY is missing in .env.");
        }
    }

    #[tokio::test]
    async fn test_live_key_rejected_in_sandbox_mode() {
        let mock_server = untouched_upstream().await;
        let mut config = create_test_config(&mock_server.uri());
        config.api_key = Some(ApiKey::new("live_key"));
        let server = create_test_app(config);

        let response = server.post("/api/remove-bg").multipart(png_form()).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "sandbox_key_required");
        assert!(envelope.detail.is_some());
    }

    #[tokio::test]
    async fn test_remove_bg_accepts_heic_without_image_mime() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/segment"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let form = MultipartForm::new().add_part(
            "image_file",
            image_part(b"heic-bytes", "IMG_0420.HEIC", "application/octet-stream"),
        );
        let response = server.post("/api/remove-bg").multipart(form).await;

        response.assert_status(StatusCode::OK);

        let received = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains(r#"name="image_file"; filename="IMG_0420.HEIC""#));
        assert!(body.to_ascii_lowercase().contains("content-type: image/heic"));
    }

    #[tokio::test]
    async fn test_remove_bg_rejects_non_image() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let form = MultipartForm::new().add_part("image_file", image_part(b"%PDF", "doc.pdf", "application/pdf"));
        let response = server.post("/api/remove-bg").multipart(form).await;

        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "invalid_file_type");
        assert_eq!(envelope.message, "Only image files are supported (including HEIC/HEIF).");
    }

    #[tokio::test]
    async fn test_empty_upload() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let form = MultipartForm::new().add_part("image_file", image_part(b"", "empty.png", "image/png"));
        let response = server.post("/api/remove-bg").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "empty_upload");
    }

    #[tokio::test]
    async fn test_empty_non_image_is_empty_upload_on_both_routes() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        for route in ["/api/remove-bg", "/api/advanced-edit"] {
            let form = MultipartForm::new().add_part("image_file", image_part(b"", "notes.txt", "text/plain"));
            let response = server.post(route).multipart(form).await;

            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json::<ErrorEnvelope>().error, "empty_upload", "route {route}");
        }
    }

    #[tokio::test]
    async fn test_remove_bg_accepts_known_extension_without_image_mime() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/segment"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let form = MultipartForm::new().add_part(
            "image_file",
            image_part(PNG_BYTES, "shirt.png", "application/octet-stream"),
        );
        let response = server.post("/api/remove-bg").multipart(form).await;

        response.assert_status(StatusCode::OK);

        let received = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.to_ascii_lowercase().contains("content-type: image/png"));
    }

    #[tokio::test]
    async fn test_file_too_large() {
        let mock_server = untouched_upstream().await;
        let mut config = create_test_config(&mock_server.uri());
        config.max_upload_bytes = 1024 * 1024;
        let server = create_test_app(config);

        let oversized = vec![0u8; 1024 * 1024 + 1];
        let form = MultipartForm::new().add_part("image_file", image_part(&oversized, "big.png", "image/png"));
        let response = server.post("/api/remove-bg").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "file_too_large");
        assert_eq!(envelope.message, "File is too large. Max allowed size is 1 MB.");
    }

    #[tokio::test]
    async fn test_missing_image_part() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let form = MultipartForm::new().add_text("output_variant", "ghost_mannequin");
        let response = server.post("/api/advanced-edit").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "missing_image_file");
    }

    #[tokio::test]
    async fn test_non_multipart_body() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let response = server.post("/api/remove-bg").text("not a form").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "invalid_multipart");
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_passed_through() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let response = server.post("/api/remove-bg").multipart(png_form()).await;

        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "photoroom_error");
        assert_eq!(envelope.message, "Photoroom API rate limit reached. Try again shortly.");
        assert_eq!(envelope.detail.as_deref(), Some("slow down"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = create_test_app(create_test_config(&format!("http://127.0.0.1:{port}")));
        let response = server.post("/api/remove-bg").multipart(png_form()).await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "network_error");
        assert_eq!(envelope.message, "Could not reach Photoroom API.");
    }

    #[test_log::test(tokio::test)]
    async fn test_advanced_ghost_mannequin_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/edit"))
            .and(header("x-api-key", "sandbox_test_key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"ghost".to_vec()),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let form = png_form()
            .add_text("output_variant", "ghost_mannequin")
            .add_text("background_color", "#f2f4f7");
        let response = server.post("/api/advanced-edit").multipart(form).await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.as_bytes().as_ref(), b"ghost");

        let received = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains(r#"name="imageFile"; filename="shirt.png""#));
        assert!(body.contains(r#"name="removeBackground""#));
        assert!(body.contains("F2F4F7"));
        assert!(body.contains("subjectBox"));
    }

    #[tokio::test]
    async fn test_advanced_defaults_to_ghost_mannequin() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/edit"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let response = server.post("/api/advanced-edit").multipart(png_form()).await;

        response.assert_status(StatusCode::OK);

        let received = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains(r#"name="background.color""#));
        assert!(body.contains("FFFFFF"));
    }

    #[tokio::test]
    async fn test_advanced_lifestyle_staging_ignores_color() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/edit"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"scene".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let form = png_form()
            .add_text("output_variant", "lifestyle_staging")
            .add_text("background_color", "#000000");
        let response = server.post("/api/advanced-edit").multipart(form).await;

        response.assert_status(StatusCode::OK);

        let received = mock_server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(!body.contains(r#"name="background.color""#));
        assert!(body.contains("Create a realistic lifestyle product scene"));
    }

    #[tokio::test]
    async fn test_advanced_rejects_heic() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let form = MultipartForm::new().add_part("image_file", image_part(b"heic", "coat.heic", "image/heic"));
        let response = server.post("/api/advanced-edit").multipart(form).await;

        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(response.json::<ErrorEnvelope>().error, "unsupported_advanced_format");
    }

    #[tokio::test]
    async fn test_advanced_invalid_variant_checked_before_file_type() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let form = MultipartForm::new()
            .add_part("image_file", image_part(b"heic", "coat.heic", "image/heic"))
            .add_text("output_variant", "flat_lay");
        let response = server.post("/api/advanced-edit").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "invalid_output_variant");
    }

    #[tokio::test]
    async fn test_advanced_color_errors() {
        let mock_server = untouched_upstream().await;
        let server = create_test_app(create_test_config(&mock_server.uri()));

        let response = server
            .post("/api/advanced-edit")
            .multipart(png_form().add_text("background_color", "#12345"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "invalid_background_color");

        let response = server
            .post("/api/advanced-edit")
            .multipart(png_form().add_text("background_color", "#000000"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorEnvelope>().error, "unsupported_background_color");
    }

    #[tokio::test]
    async fn test_advanced_payment_required_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({ "message": "Upgrade required" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let server = create_test_app(create_test_config(&mock_server.uri()));
        let response = server.post("/api/advanced-edit").multipart(png_form()).await;

        response.assert_status(StatusCode::PAYMENT_REQUIRED);
        let envelope: ErrorEnvelope = response.json();
        assert_eq!(envelope.error, "photoroom_error");
        assert!(envelope.message.contains("Plus plan"));
        assert_eq!(envelope.detail.as_deref(), Some("Upgrade required"));
    }
}
