//! dofinder.toml 통합 설정 테스트
//!
//! - dofinder.toml.example 파싱 테스트
//! - 파일 로딩 + 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use std::io::Write;

use dofinder_core::config::DofinderConfig;
use dofinder_core::error::{ConfigError, DofinderError};
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../dofinder.toml.example");

#[test]
fn example_config_parses_successfully() {
    let config = DofinderConfig::parse(EXAMPLE).expect("example config should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn example_config_passes_validation() {
    let config = DofinderConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_topic_topology() {
    let config = DofinderConfig::parse(EXAMPLE).expect("should parse");
    assert_eq!(config.broker.exchange, "dofinder");
    assert_eq!(config.broker.queue, "images");
    assert_eq!(config.broker.route_key, "images.scan");
    assert_eq!(config.broker.test_queue, "test");
    assert_eq!(config.broker.test_route_key, "images.test");
}

#[test]
fn example_config_matches_defaults() {
    let config = DofinderConfig::parse(EXAMPLE).expect("should parse");
    let defaults = DofinderConfig::default();
    assert_eq!(config.registry.hub_url, defaults.registry.hub_url);
    assert_eq!(config.catalog.images_url, defaults.catalog.images_url);
    assert_eq!(config.crawler.max_images, defaults.crawler.max_images);
    assert_eq!(
        config.scanner.probe_timeout_secs,
        defaults.scanner.probe_timeout_secs
    );
    assert!(config.catalog.probes_file.is_empty());
}

#[tokio::test]
#[serial]
async fn load_applies_env_overrides_over_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[scanner]\nworkers = 2\n").expect("write config");

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("DOFINDER_SCANNER_WORKERS", "6") };
    let config = DofinderConfig::load(file.path()).await;
    unsafe { std::env::remove_var("DOFINDER_SCANNER_WORKERS") };

    let config = config.expect("config should load");
    assert_eq!(config.scanner.workers, 6);
}

#[tokio::test]
#[serial]
async fn load_rejects_env_override_that_fails_validation() {
    let file = tempfile::NamedTempFile::new().expect("temp file");

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("DOFINDER_GENERAL_LOG_FORMAT", "xml") };
    let result = DofinderConfig::load(file.path()).await;
    unsafe { std::env::remove_var("DOFINDER_GENERAL_LOG_FORMAT") };

    let err = result.expect_err("xml log format must be rejected");
    assert!(matches!(
        err,
        DofinderError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn from_file_reports_parse_errors() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[scanner\nworkers = ").expect("write config");

    let err = DofinderConfig::from_file(file.path())
        .await
        .expect_err("broken toml must fail");
    assert!(matches!(
        err,
        DofinderError::Config(ConfigError::ParseFailed { .. })
    ));
}
