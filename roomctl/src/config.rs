//! Application configuration management.
//!
//! Configuration is resolved once at startup into a [`Config`] that handlers receive through
//! [`crate::AppState`]; nothing re-reads the environment per request. The configuration file path
//! defaults to `config.yaml` but can be specified via `-f` flag or `ROOMCTL_CONFIG` environment
//! variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **Built-in defaults** - see the `Default` implementations below
//! 2. **YAML config file** - optional (default: `config.yaml`)
//! 3. **Environment variables** - variables prefixed with `ROOMCTL_` override YAML values
//! 4. **Legacy variables** - the `PHOTOROOM_*` / `APP_*` names used by earlier deployments, each
//!    mapped onto its config path. Blank legacy values are ignored so the default applies.
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `ROOMCTL_UPSTREAM__TIMEOUT_SECS=30` sets the `upstream.timeout_secs` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Upstream credentials (sandbox keys are required unless require_sandbox is false)
//! PHOTOROOM_API_KEY=sandbox_abc123
//! ROOMCTL_API_KEY=sandbox_abc123
//!
//! # Override server port
//! ROOMCTL_PORT=8080
//!
//! # Advanced edit positioning
//! ROOMCTL_ADVANCED__OUTPUT_SIZE=2000x2500
//! PHOTOROOM_ADVANCED_PADDING=0.05
//! ```

use std::{fmt, path::PathBuf, time::Duration};

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;
use crate::translate::BackgroundColor;

pub const DEFAULT_SEGMENT_URL: &str = "https://sdk.photoroom.com/v1/segment";
pub const DEFAULT_EDIT_URL: &str = "https://image-api.photoroom.com/v2/edit";
pub const DEFAULT_OUTPUT_SIZE: &str = "1200x1500";
/// Live keys lack this prefix
pub const SANDBOX_KEY_PREFIX: &str = "sandbox_";

/// Legacy environment variable names and the config paths they override.
pub const LEGACY_ENV_VARS: &[(&str, &str)] = &[
    ("PHOTOROOM_API_KEY", "api_key"),
    ("PHOTOROOM_REQUIRE_SANDBOX", "require_sandbox"),
    ("PHOTOROOM_SEGMENT_URL", "upstream.segment_url"),
    ("PHOTOROOM_EDIT_URL", "upstream.edit_url"),
    ("PHOTOROOM_TIMEOUT_SECONDS", "upstream.timeout_secs"),
    ("APP_MAX_UPLOAD_BYTES", "max_upload_bytes"),
    ("PHOTOROOM_ADVANCED_OUTPUT_SIZE", "advanced.output_size"),
    ("PHOTOROOM_ADVANCED_STAGING_OUTPUT_SIZE", "advanced.staging_output_size"),
    ("PHOTOROOM_ADVANCED_HORIZONTAL_ALIGNMENT", "advanced.horizontal_alignment"),
    ("PHOTOROOM_ADVANCED_VERTICAL_ALIGNMENT", "advanced.vertical_alignment"),
    ("PHOTOROOM_ADVANCED_PADDING", "advanced.padding"),
    ("PHOTOROOM_ADVANCED_MARGIN", "advanced.margin"),
    ("PHOTOROOM_ADVANCED_REFERENCE_BOX", "advanced.reference_box"),
    ("PHOTOROOM_ADVANCED_EXPORT_FORMAT", "advanced.export_format"),
    ("PHOTOROOM_ADVANCED_BACKGROUND_COLOR", "advanced.background_color"),
    ("PHOTOROOM_ADVANCED_IGNORE_PADDING_SNAP", "advanced.ignore_padding_and_snap"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ROOMCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults matching the upstream's documented behaviour, so an empty config
/// file plus an API key is a working setup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Upstream API key, sent as `x-api-key`
    pub api_key: Option<ApiKey>,
    /// Refuse live keys: the API key must start with `sandbox_`
    pub require_sandbox: bool,
    pub upstream: UpstreamConfig,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,
    /// Directory holding `<variant>.txt` prompt overrides
    pub prompts_dir: PathBuf,
    /// Advanced edit form-data defaults
    pub advanced: AdvancedEditConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Upstream API endpoints and call behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Remove-background endpoint
    pub segment_url: Url,
    /// Advanced image editing endpoint
    pub edit_url: Url,
    /// Timeout for a whole upstream call, in seconds
    pub timeout_secs: u64,
}

/// Form-data defaults for `POST /api/advanced-edit`. Every field is sent as-is to the upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdvancedEditConfig {
    /// `outputSize` for ghost mannequin, `<width>x<height>`
    pub output_size: String,
    /// `outputSize` for lifestyle staging, `<width>x<height>`
    pub staging_output_size: String,
    pub horizontal_alignment: HorizontalAlignment,
    pub vertical_alignment: VerticalAlignment,
    /// Fraction of the output left around the subject
    pub padding: f64,
    pub margin: f64,
    pub reference_box: ReferenceBox,
    pub export_format: ExportFormat,
    /// Used when the browser sends no background color
    pub background_color: BackgroundColor,
    /// `ignorePaddingAndSnapOnCroppedSides`
    pub ignore_padding_and_snap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceBox {
    SubjectBox,
    OriginalImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Jpg,
    Webp,
}

/// Upstream API key. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_sandbox(&self) -> bool {
        self.0.starts_with(SANDBOX_KEY_PREFIX)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl HorizontalAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
        }
    }
}

impl VerticalAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerticalAlignment::Top => "top",
            VerticalAlignment::Center => "center",
            VerticalAlignment::Bottom => "bottom",
        }
    }
}

impl ReferenceBox {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceBox::SubjectBox => "subjectBox",
            ReferenceBox::OriginalImage => "originalImage",
        }
    }
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Jpg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            api_key: None,
            require_sandbox: true,
            upstream: UpstreamConfig::default(),
            max_upload_bytes: 10 * 1024 * 1024,
            prompts_dir: PathBuf::from("prompts"),
            advanced: AdvancedEditConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            segment_url: Url::parse(DEFAULT_SEGMENT_URL).expect("default segment URL is valid"),
            edit_url: Url::parse(DEFAULT_EDIT_URL).expect("default edit URL is valid"),
            timeout_secs: 60,
        }
    }
}

impl Default for AdvancedEditConfig {
    fn default() -> Self {
        Self {
            output_size: DEFAULT_OUTPUT_SIZE.to_string(),
            staging_output_size: DEFAULT_OUTPUT_SIZE.to_string(),
            horizontal_alignment: HorizontalAlignment::Center,
            vertical_alignment: VerticalAlignment::Center,
            padding: 0.02,
            margin: 0.0,
            reference_box: ReferenceBox::SubjectBox,
            export_format: ExportFormat::Png,
            background_color: BackgroundColor::default(),
            ignore_padding_and_snap: false,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AdvancedEditConfig {
    /// `padding` as sent upstream, e.g. `0.02`
    pub fn padding_field(&self) -> String {
        format_ratio(self.padding)
    }

    /// `margin` as sent upstream, e.g. `0.00`
    pub fn margin_field(&self) -> String {
        format_ratio(self.margin)
    }
}

/// Two decimals unless that would lose precision.
fn format_ratio(value: f64) -> String {
    let fixed = format!("{value:.2}");
    if fixed.parse::<f64>().is_ok_and(|parsed| parsed == value) {
        fixed
    } else {
        value.to_string()
    }
}

fn is_valid_output_size(size: &str) -> bool {
    size.split_once('x').is_some_and(|(width, height)| {
        [width, height]
            .iter()
            .all(|dim| !dim.is_empty() && dim.chars().all(|c| c.is_ascii_digit()) && dim.parse::<u32>().is_ok_and(|d| d > 0))
    })
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;
        config.apply_blank_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        let mut figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ROOMCTL_").ignore(&["config"]).split("__"));

        // Legacy names, only when set to something non-blank
        for &(var, path) in LEGACY_ENV_VARS {
            if std::env::var(var).is_ok_and(|value| !value.trim().is_empty()) {
                figment = figment.merge(Env::raw().only(&[var]).map(move |_| path.into()));
            }
        }

        figment
    }

    /// Blank strings fall back to their defaults, matching how unset values behave.
    fn apply_blank_defaults(&mut self) {
        let defaults = Config::default();

        if self.host.trim().is_empty() {
            self.host = defaults.host;
        }
        if self.prompts_dir.as_os_str().is_empty() {
            self.prompts_dir = defaults.prompts_dir;
        }
        self.api_key = self
            .api_key
            .take()
            .map(|key| ApiKey::new(key.expose().trim()))
            .filter(|key| !key.expose().is_empty());

        let advanced = &mut self.advanced;
        for size in [&mut advanced.output_size, &mut advanced.staging_output_size] {
            let trimmed = size.trim();
            *size = if trimmed.is_empty() {
                DEFAULT_OUTPUT_SIZE.to_string()
            } else {
                trimmed.to_string()
            };
        }
    }

    /// Validate the configuration for consistency and required fields.
    ///
    /// A missing API key is not a startup error; requests answer `missing_api_key` instead.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.upstream.timeout_secs == 0 {
            return Err("Config validation: upstream.timeout_secs must be at least 1".into());
        }

        if self.max_upload_bytes == 0 {
            return Err("Config validation: max_upload_bytes must be positive (default: 10485760 = 10 MB)".into());
        }

        if !self.advanced.background_color.is_allowed_swatch() {
            return Err(format!(
                "Config validation: advanced.background_color {} is not one of the allowed swatches",
                self.advanced.background_color
            )
            .into());
        }

        for (name, size) in [
            ("advanced.output_size", &self.advanced.output_size),
            ("advanced.staging_output_size", &self.advanced.staging_output_size),
        ] {
            if !is_valid_output_size(size) {
                return Err(format!("Config validation: {name} must look like 1200x1500, got {size:?}").into());
            }
        }

        for (name, value) in [("advanced.padding", self.advanced.padding), ("advanced.margin", self.advanced.margin)] {
            if !(0.0..=0.49).contains(&value) {
                return Err(format!("Config validation: {name} must be between 0 and 0.49, got {value}").into());
            }
        }

        Ok(())
    }

    /// The API key to forward upstream, or the configuration error that blocks the call.
    pub fn upstream_api_key(&self) -> Result<&str, Error> {
        let key = self.api_key.as_ref().ok_or(Error::MissingApiKey)?;
        if self.require_sandbox && !key.is_sandbox() {
            return Err(Error::SandboxKeyRequired);
        }
        Ok(key.expose())
    }

    /// Request body ceiling for the upload routes. Leaves headroom for multipart framing so that
    /// files slightly over the limit still reach validation and get a `file_too_large` envelope.
    pub fn request_body_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes.saturating_add(1024 * 1024)).unwrap_or(usize::MAX)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
