//! Upload validation: file type classification, size limits and outbound media type.

use std::path::Path;

use mime_guess::mime::{self, Mime};

use crate::errors::{Endpoint, Error, Result};

pub const HEIC_CONTENT_TYPES: &[&str] = &["image/heic", "image/heif", "image/heic-sequence", "image/heif-sequence"];
pub const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];
/// Extensions accepted on the advanced edit path when the content type is not an image type
pub const COMMON_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "avif", "tif", "tiff", "bmp", "gif"];

/// Filename sent upstream when the browser did not provide one
pub const FALLBACK_FILENAME: &str = "upload-image";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// An image received from the browser. Lives for a single request.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Lowercased `Content-Type` of the multipart part, empty if none was sent
    pub declared_content_type: String,
    /// Client-side filename, empty if none was sent
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Heic,
    GenericImage,
    Unsupported,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, declared_content_type: impl AsRef<str>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            declared_content_type: declared_content_type.as_ref().trim().to_ascii_lowercase(),
            filename: filename.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased filename extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    pub fn kind(&self) -> UploadKind {
        if self.is_heic() {
            UploadKind::Heic
        } else if self.has_image_content_type() || self.has_extension(COMMON_IMAGE_EXTENSIONS) {
            UploadKind::GenericImage
        } else {
            UploadKind::Unsupported
        }
    }

    pub fn is_heic(&self) -> bool {
        HEIC_CONTENT_TYPES.contains(&self.declared_content_type.as_str()) || self.has_extension(HEIC_EXTENSIONS)
    }

    /// Media type for the outbound part: the declared type when it is a valid image type,
    /// otherwise looked up from the extension.
    pub fn effective_media_type(&self) -> String {
        if self.has_valid_image_mime() {
            return self.declared_content_type.clone();
        }
        let media_type = match self.extension().as_deref() {
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            Some("avif") => "image/avif",
            Some("tif" | "tiff") => "image/tiff",
            Some("bmp") => "image/bmp",
            Some("gif") => "image/gif",
            Some("heic") => "image/heic",
            Some("heif") => "image/heif",
            _ => FALLBACK_MEDIA_TYPE,
        };
        media_type.to_string()
    }

    pub fn upstream_filename(&self) -> &str {
        if self.filename.is_empty() { FALLBACK_FILENAME } else { &self.filename }
    }

    fn has_valid_image_mime(&self) -> bool {
        self.declared_content_type
            .parse::<Mime>()
            .is_ok_and(|parsed| parsed.type_() == mime::IMAGE && !parsed.subtype().as_str().is_empty())
    }

    fn has_image_content_type(&self) -> bool {
        self.declared_content_type.starts_with("image/")
    }

    fn has_extension(&self, allowed: &[&str]) -> bool {
        self.extension().is_some_and(|ext| allowed.contains(&ext.as_str()))
    }
}

/// File type check for the remove-background path, which accepts HEIC/HEIF and generic images.
pub fn check_remove_bg(image: &UploadedImage) -> Result<()> {
    match image.kind() {
        UploadKind::Heic | UploadKind::GenericImage => Ok(()),
        UploadKind::Unsupported => Err(invalid_file_type(Endpoint::RemoveBackground, image)),
    }
}

/// File type check for the advanced edit path, which rejects HEIC/HEIF outright.
pub fn check_advanced(image: &UploadedImage) -> Result<()> {
    match image.kind() {
        UploadKind::Heic => Err(Error::UnsupportedAdvancedFormat),
        UploadKind::GenericImage => Ok(()),
        UploadKind::Unsupported => Err(invalid_file_type(Endpoint::AdvancedEdit, image)),
    }
}

/// Runs before the file type checks: an empty part is `empty_upload` whatever its type.
pub fn check_not_empty(image: &UploadedImage) -> Result<()> {
    if image.is_empty() {
        return Err(Error::EmptyUpload);
    }
    Ok(())
}

pub fn check_size(image: &UploadedImage, max_bytes: u64) -> Result<()> {
    if image.len() as u64 > max_bytes {
        return Err(Error::FileTooLarge { max_bytes });
    }
    Ok(())
}

fn invalid_file_type(endpoint: Endpoint, image: &UploadedImage) -> Error {
    Error::InvalidFileType {
        endpoint,
        content_type: image.declared_content_type.clone(),
        filename: image.filename.clone(),
    }
}
