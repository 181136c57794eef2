//! Response model for `GET /api/demo-info`.
//!
//! Describes the proxy's current wiring so the UI can show which upstream endpoints, defaults and
//! credentials mode are in effect. Field names mirror the upstream's form-data keys where they
//! describe a forwarded value.

use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    translate::{ALLOWED_BACKGROUND_COLORS, Variant},
};

pub const DOCS_API_REFERENCE_URL: &str = "https://docs.photoroom.com/getting-started/api-reference-openapi";
pub const DOCS_SEGMENT_QUICKSTART_URL: &str = "https://docs.photoroom.com/remove-background-api-basic-plan";
pub const DOCS_DESCRIBE_ANY_CHANGE_URL: &str = "https://docs.photoroom.com/image-editing-api-plus-plan/alpha-describe-any-change";
pub const DOCS_POSITIONING_URL: &str = "https://docs.photoroom.com/image-editing-api-plus-plan/positioning";

pub const AUTH_HEADER: &str = "x-api-key";
const SANDBOX_NOTE: &str = "Sandbox mode for /v1/segment uses the same endpoint with an API key prefixed by sandbox_.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoInfo {
    pub local_endpoint: LocalEndpoint,
    pub advanced_local_endpoint: LocalEndpoint,
    pub provider_endpoint: ProviderEndpoint,
    pub advanced_provider_endpoint: ProviderEndpoint,
    pub provider_docs: ProviderDocs,
    pub auth_header: String,
    pub sandbox_mode: SandboxMode,
    pub advanced_variants: AdvancedVariants,
    #[serde(rename = "export.format")]
    pub export_format: String,
    pub request_format: String,
    pub advanced_request_format: String,
    pub response_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalEndpoint {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub method: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDocs {
    pub api_reference: String,
    pub segment_quickstart: String,
    pub describe_any_change: String,
    pub positioning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxMode {
    pub required: bool,
    pub api_key_is_sandbox: bool,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedVariants {
    pub ghost_mannequin: GhostMannequinInfo,
    pub lifestyle_staging: LifestyleStagingInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostMannequinInfo {
    #[serde(rename = "prompt_file")]
    pub prompt_file: String,
    #[serde(rename = "background.color.allowed")]
    pub background_color_allowed: Vec<String>,
    #[serde(rename = "background.color.default")]
    pub background_color_default: String,
    pub reference_box: String,
    pub output_size: String,
    pub horizontal_alignment: String,
    pub vertical_alignment: String,
    pub padding: String,
    pub margin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifestyleStagingInfo {
    #[serde(rename = "prompt_file")]
    pub prompt_file: String,
    pub output_size: String,
}

impl LocalEndpoint {
    fn post(path: &str) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
        }
    }
}

impl ProviderEndpoint {
    fn post(url: &url::Url) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.to_string(),
        }
    }
}

impl From<&Config> for DemoInfo {
    fn from(config: &Config) -> Self {
        let advanced = &config.advanced;

        let mut allowed_colors: Vec<String> = ALLOWED_BACKGROUND_COLORS.iter().map(|c| c.to_string()).collect();
        allowed_colors.sort();

        Self {
            local_endpoint: LocalEndpoint::post("/api/remove-bg"),
            advanced_local_endpoint: LocalEndpoint::post("/api/advanced-edit"),
            provider_endpoint: ProviderEndpoint::post(&config.upstream.segment_url),
            advanced_provider_endpoint: ProviderEndpoint::post(&config.upstream.edit_url),
            provider_docs: ProviderDocs {
                api_reference: DOCS_API_REFERENCE_URL.to_string(),
                segment_quickstart: DOCS_SEGMENT_QUICKSTART_URL.to_string(),
                describe_any_change: DOCS_DESCRIBE_ANY_CHANGE_URL.to_string(),
                positioning: DOCS_POSITIONING_URL.to_string(),
            },
            auth_header: AUTH_HEADER.to_string(),
            sandbox_mode: SandboxMode {
                required: config.require_sandbox,
                api_key_is_sandbox: config.api_key.as_ref().is_some_and(|key| key.is_sandbox()),
                note: SANDBOX_NOTE.to_string(),
            },
            advanced_variants: AdvancedVariants {
                ghost_mannequin: GhostMannequinInfo {
                    prompt_file: Variant::GhostMannequin.prompt_path(&config.prompts_dir).display().to_string(),
                    background_color_allowed: allowed_colors,
                    background_color_default: advanced.background_color.to_string(),
                    reference_box: advanced.reference_box.as_str().to_string(),
                    output_size: advanced.output_size.clone(),
                    horizontal_alignment: advanced.horizontal_alignment.as_str().to_string(),
                    vertical_alignment: advanced.vertical_alignment.as_str().to_string(),
                    padding: advanced.padding_field(),
                    margin: advanced.margin_field(),
                },
                lifestyle_staging: LifestyleStagingInfo {
                    prompt_file: Variant::LifestyleStaging.prompt_path(&config.prompts_dir).display().to_string(),
                    output_size: advanced.staging_output_size.clone(),
                },
            },
            export_format: advanced.export_format.as_str().to_string(),
            request_format: "multipart/form-data with image_file".to_string(),
            advanced_request_format: "multipart/form-data with image_file + output_variant (ghost_mannequin|lifestyle_staging) + \
                                      optional background_color (#RRGGBB, ghost_mannequin only)"
                .to_string(),
            response_format: "binary image".to_string(),
        }
    }
}
