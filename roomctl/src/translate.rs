//! Request translation: shapes a validated upload into the upstream API's multipart request.
//!
//! The remove-background call sends a single `image_file` part. The advanced edit call sends an
//! `imageFile` part plus a form-data map whose fields depend on the chosen [`Variant`]:
//!
//! | field                                | ghost_mannequin          | lifestyle_staging        |
//! |--------------------------------------|--------------------------|--------------------------|
//! | `describeAnyChange.mode`             | `ai.auto`                | `ai.auto`                |
//! | `describeAnyChange.prompt`           | prompt file or default   | prompt file or default   |
//! | `export.format`                      | configured               | configured               |
//! | `removeBackground`                   | `true`                   | `false`                  |
//! | `outputSize`                         | configured               | configured (staging)     |
//! | `background.color`                   | validated swatch         |                          |
//! | `referenceBox`, alignments, padding, margin, `ignorePaddingAndSnapOnCroppedSides` | configured | |

use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::debug;
use url::Url;

use crate::{
    config::Config,
    errors::{Error, Result},
    upload::UploadedImage,
};

/// Light swatches the UI offers for the ghost mannequin background
pub const ALLOWED_BACKGROUND_COLORS: &[&str] = &["FFFFFF", "F2F4F7", "EAF7EE", "FFEAF4", "EAF2FF"];

pub const REMOVE_BG_FILE_FIELD: &str = "image_file";
pub const ADVANCED_EDIT_FILE_FIELD: &str = "imageFile";
pub const DESCRIBE_ANY_CHANGE_MODE: &str = "ai.auto";

const DEFAULT_GHOST_MANNEQUIN_PROMPT: &str = "Transform the main clothing item into a realistic ghost mannequin product photo. \
     Keep natural worn volume and fabric structure, front-facing and clean. \
     No person or mannequin should be visible. \
     Show only the main garment with ecommerce-quality sharpness. \
     Reduce visible wrinkles when possible.";

const DEFAULT_LIFESTYLE_STAGING_PROMPT: &str = "Create a realistic lifestyle product scene featuring the garment in a natural context. \
     Keep the item as the hero, with clean composition and premium commercial photography quality. \
     The final image should look like an ecommerce campaign visual, believable and brand-safe.";

/// Output style for the advanced edit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    #[default]
    GhostMannequin,
    LifestyleStaging,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::GhostMannequin, Variant::LifestyleStaging];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::GhostMannequin => "ghost_mannequin",
            Variant::LifestyleStaging => "lifestyle_staging",
        }
    }

    pub fn default_prompt(&self) -> &'static str {
        match self {
            Variant::GhostMannequin => DEFAULT_GHOST_MANNEQUIN_PROMPT,
            Variant::LifestyleStaging => DEFAULT_LIFESTYLE_STAGING_PROMPT,
        }
    }

    /// `<prompts_dir>/<variant>.txt`
    pub fn prompt_path(&self, prompts_dir: &Path) -> PathBuf {
        prompts_dir.join(format!("{}.txt", self.as_str()))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Variant::ALL
            .into_iter()
            .find(|variant| variant.as_str() == normalized)
            .ok_or_else(|| Error::InvalidOutputVariant { value: s.to_string() })
    }
}

/// A normalized six-digit uppercase hex color, without the leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BackgroundColor(String);

impl BackgroundColor {
    /// Trims, strips leading `#` and uppercases. Returns `None` unless exactly six hex digits remain.
    pub fn normalize(value: &str) -> Option<Self> {
        let normalized = value.trim().trim_start_matches('#').to_ascii_uppercase();
        if normalized.len() != 6 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_allowed_swatch(&self) -> bool {
        ALLOWED_BACKGROUND_COLORS.contains(&self.0.as_str())
    }

    /// Resolves the color for a ghost mannequin request. A blank request falls back to
    /// `fallback`; the result must be one of [`ALLOWED_BACKGROUND_COLORS`].
    pub fn resolve(requested: &str, fallback: &BackgroundColor) -> Result<Self> {
        let color = if requested.trim().is_empty() {
            fallback.clone()
        } else {
            Self::normalize(requested).ok_or_else(|| Error::InvalidBackgroundColor {
                value: requested.to_string(),
            })?
        };

        if !color.is_allowed_swatch() {
            return Err(Error::UnsupportedBackgroundColor { color: color.0 });
        }
        Ok(color)
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self("FFFFFF".to_string())
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Environment values like `123456` arrive as integers, so both shapes are accepted.
impl<'de> Deserialize<'de> for BackgroundColor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Clone, Copy)]
        struct ColorVisitor;

        impl de::Visitor<'_> for ColorVisitor {
            type Value = BackgroundColor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a six digit hex color such as #FFFFFF")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                BackgroundColor::normalize(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                BackgroundColor::normalize(&format!("{v:06}")).ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(ColorVisitor)
    }
}

/// A fully shaped outbound multipart request, independent of the HTTP client.
#[derive(Clone)]
pub struct UpstreamRequest {
    pub url: Url,
    pub file_field: &'static str,
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
    /// Text form fields in the order they are sent
    pub fields: Vec<(&'static str, String)>,
}

impl UpstreamRequest {
    fn new(url: Url, file_field: &'static str, image: UploadedImage, fields: Vec<(&'static str, String)>) -> Self {
        Self {
            url,
            file_field,
            filename: image.upstream_filename().to_string(),
            media_type: image.effective_media_type(),
            bytes: image.bytes,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| *key == name).map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("url", &self.url.as_str())
            .field("file_field", &self.file_field)
            .field("filename", &self.filename)
            .field("media_type", &self.media_type)
            .field("bytes", &self.bytes.len())
            .field("fields", &self.fields.iter().map(|(key, _)| *key).collect::<Vec<_>>())
            .finish()
    }
}

/// Shapes a remove-background request for the segment API.
pub fn remove_background(config: &Config, image: UploadedImage) -> UpstreamRequest {
    UpstreamRequest::new(config.upstream.segment_url.clone(), REMOVE_BG_FILE_FIELD, image, Vec::new())
}

/// Shapes an advanced edit request for one variant.
///
/// Fails with `invalid_background_color` / `unsupported_background_color` for ghost mannequin
/// requests whose color does not resolve to an allowed swatch. `requested_color` is ignored for
/// lifestyle staging.
pub fn advanced_edit(
    config: &Config,
    variant: Variant,
    requested_color: &str,
    prompt: String,
    image: UploadedImage,
) -> Result<UpstreamRequest> {
    let advanced = &config.advanced;

    let mut fields = vec![
        ("describeAnyChange.mode", DESCRIBE_ANY_CHANGE_MODE.to_string()),
        ("describeAnyChange.prompt", prompt),
        ("export.format", advanced.export_format.as_str().to_string()),
    ];

    match variant {
        Variant::GhostMannequin => {
            let color = BackgroundColor::resolve(requested_color, &advanced.background_color)?;
            fields.extend([
                ("removeBackground", "true".to_string()),
                ("background.color", color.to_string()),
                ("referenceBox", advanced.reference_box.as_str().to_string()),
                ("outputSize", advanced.output_size.clone()),
                ("horizontalAlignment", advanced.horizontal_alignment.as_str().to_string()),
                ("verticalAlignment", advanced.vertical_alignment.as_str().to_string()),
                ("padding", advanced.padding_field()),
                ("margin", advanced.margin_field()),
                ("ignorePaddingAndSnapOnCroppedSides", advanced.ignore_padding_and_snap.to_string()),
            ]);
        }
        Variant::LifestyleStaging => {
            fields.extend([
                ("removeBackground", "false".to_string()),
                ("outputSize", advanced.staging_output_size.clone()),
            ]);
        }
    }

    Ok(UpstreamRequest::new(
        config.upstream.edit_url.clone(),
        ADVANCED_EDIT_FILE_FIELD,
        image,
        fields,
    ))
}

/// Prompt text for a variant: the prompt file when it exists and is non-blank, otherwise the
/// built-in default.
pub async fn load_prompt(prompts_dir: &Path, variant: Variant) -> String {
    let path = variant.prompt_path(prompts_dir);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            debug!(path = %path.display(), "Prompt file is empty, using built-in prompt");
            variant.default_prompt().to_string()
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Prompt file not readable, using built-in prompt");
            variant.default_prompt().to_string()
        }
    }
}
