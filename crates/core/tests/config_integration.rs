//! logflume.toml 통합 설정 테스트
//!
//! - logflume.toml.example 파싱 테스트
//! - 파일 로딩 및 에러 경로 테스트
//! - 환경변수 우선순위 테스트

use logflume_core::config::{FlumeConfig, SinkKind};
use logflume_core::error::{ConfigError, FlumeError};
use logflume_core::types::{Level, StackTracePolicy};

// =============================================================================
// logflume.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../logflume.toml.example");
    let config = FlumeConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.pipeline.min_level, Level::INFO);
    assert_eq!(
        config.pipeline.stack_traces,
        StackTracePolicy::FromLevel(Level::ERROR)
    );
    assert_eq!(config.pipeline.sample_max_per_window, Some(100));
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../logflume.toml.example");
    let config = FlumeConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_declares_sinks_in_order() {
    let content = include_str!("../../../logflume.toml.example");
    let config = FlumeConfig::parse(content).expect("should parse");

    let names: Vec<&str> = config.sinks.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["stdout", "errors"]);
    assert_eq!(config.sinks[0].kind, SinkKind::Console);
    assert_eq!(config.sinks[1].kind, SinkKind::File);
    assert_eq!(config.sinks[1].level, Some(Level::ERROR));
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
async fn load_missing_file_returns_not_found() {
    let err = FlumeConfig::load("/nonexistent/logflume.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlumeError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn load_from_temp_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("logflume.toml");
    tokio::fs::write(&path, "[pipeline]\nmin_level = \"debug\"\nbatch_size = 5\n")
        .await
        .expect("failed to write config");

    let config = FlumeConfig::from_file(&path).await.expect("should load");
    assert_eq!(config.pipeline.min_level, Level::DEBUG);
    assert_eq!(config.pipeline.batch_size, 5);
}

#[tokio::test]
async fn load_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("logflume.toml");
    tokio::fs::write(&path, "[pipeline]\nbatch_size = 0\n")
        .await
        .expect("failed to write config");

    let err = FlumeConfig::from_file(&path).await.unwrap_err();
    assert!(matches!(
        err,
        FlumeError::Config(ConfigError::InvalidValue { .. })
    ));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[pipeline]
min_level = "info"
"#;

    let original = std::env::var("LOGFLUME_PIPELINE_MIN_LEVEL").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGFLUME_PIPELINE_MIN_LEVEL", "error");
    }

    let mut config = FlumeConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.pipeline.min_level;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGFLUME_PIPELINE_MIN_LEVEL", val),
            None => std::env::remove_var("LOGFLUME_PIPELINE_MIN_LEVEL"),
        }
    }

    assert_eq!(result, Level::ERROR);
}

#[test]
#[serial_test::serial]
fn env_override_redact_paths_csv() {
    let original = std::env::var("LOGFLUME_PIPELINE_REDACT_PATHS").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGFLUME_PIPELINE_REDACT_PATHS", "secret, auth.token");
    }

    let mut config = FlumeConfig::default();
    config.apply_env_overrides();
    let result = config.pipeline.redact_paths.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGFLUME_PIPELINE_REDACT_PATHS", val),
            None => std::env::remove_var("LOGFLUME_PIPELINE_REDACT_PATHS"),
        }
    }

    assert_eq!(result, vec!["secret".to_owned(), "auth.token".to_owned()]);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_is_ignored() {
    let original = std::env::var("LOGFLUME_PIPELINE_BATCH_SIZE").ok();
    // SAFETY: serial_test로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("LOGFLUME_PIPELINE_BATCH_SIZE", "lots");
    }

    let mut config = FlumeConfig::default();
    config.apply_env_overrides();
    let result = config.pipeline.batch_size;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("LOGFLUME_PIPELINE_BATCH_SIZE", val),
            None => std::env::remove_var("LOGFLUME_PIPELINE_BATCH_SIZE"),
        }
    }

    assert_eq!(result, 50);
}
