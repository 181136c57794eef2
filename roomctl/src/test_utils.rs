//! Test utilities for handler and upstream tests.

use axum_test::TestServer;
use url::Url;

use crate::config::{ApiKey, Config};

/// reqwest is built without a default TLS provider; install one once per test process.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// A config pointing both upstream endpoints at `upstream_uri`, with a sandbox key and a short
/// timeout. Prompt files are looked up in a directory that does not exist, so the built-in
/// prompts are used.
pub fn create_test_config(upstream_uri: &str) -> Config {
    let mut config = Config {
        api_key: Some(ApiKey::new("sandbox_test_key")),
        prompts_dir: std::env::temp_dir().join(format!("roomctl-test-prompts-{}", std::process::id())),
        ..Default::default()
    };
    config.upstream.segment_url = Url::parse(&format!("{upstream_uri}/v1/segment")).expect("valid test segment URL");
    config.upstream.edit_url = Url::parse(&format!("{upstream_uri}/v2/edit")).expect("valid test edit URL");
    config.upstream.timeout_secs = 5;
    config
}

pub fn create_test_app(config: Config) -> TestServer {
    install_crypto_provider();
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}
