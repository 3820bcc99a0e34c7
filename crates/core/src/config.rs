//! 설정 관리 -- logflume.toml 파싱 및 런타임 설정
//!
//! [`FlumeConfig`]는 모든 섹션의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGFLUME_PIPELINE_MIN_LEVEL=warn` 형식)
//! 3. 설정 파일 (`logflume.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logflume_core::error::FlumeError> {
//! use logflume_core::config::FlumeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FlumeConfig::load("logflume.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FlumeConfig::parse("[pipeline]\nmin_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FlumeError};
use crate::record::Fields;
use crate::types::{Level, StackTracePolicy};

/// logflume 통합 설정
///
/// `logflume.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlumeConfig {
    /// 일반 설정 (내부 tracing 출력)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파이프라인 설정
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// 출력 대상 목록
    #[serde(default)]
    pub sinks: Vec<SinkSpec>,
}

impl FlumeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FlumeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FlumeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlumeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FlumeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FlumeError> {
        toml::from_str(toml_str).map_err(|e| {
            FlumeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGFLUME_{SECTION}_{FIELD}`
    /// 예: `LOGFLUME_PIPELINE_MIN_LEVEL=warn`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGFLUME_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGFLUME_GENERAL_LOG_FORMAT");

        // Pipeline
        override_level(&mut self.pipeline.min_level, "LOGFLUME_PIPELINE_MIN_LEVEL");
        override_csv(
            &mut self.pipeline.redact_paths,
            "LOGFLUME_PIPELINE_REDACT_PATHS",
        );
        override_opt_u32(
            &mut self.pipeline.sample_max_per_window,
            "LOGFLUME_PIPELINE_SAMPLE_MAX_PER_WINDOW",
        );
        override_u64(
            &mut self.pipeline.sample_window_ms,
            "LOGFLUME_PIPELINE_SAMPLE_WINDOW_MS",
        );
        override_usize(&mut self.pipeline.batch_size, "LOGFLUME_PIPELINE_BATCH_SIZE");
        override_opt_u64(
            &mut self.pipeline.flush_interval_ms,
            "LOGFLUME_PIPELINE_FLUSH_INTERVAL_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlumeError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.pipeline.sample_max_per_window == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.sample_max_per_window".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.pipeline.sample_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.sample_window_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.batch_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.pipeline.flush_interval_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.flush_interval_ms".to_owned(),
                reason: "must be greater than 0 when set".to_owned(),
            }
            .into());
        }

        if self.pipeline.redact_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.redact_paths".to_owned(),
                reason: "redaction paths must not be empty".to_owned(),
            }
            .into());
        }

        // sink 이름 중복 및 종류별 필수 필드 검증
        let mut names = HashSet::new();
        for sink in &self.sinks {
            if sink.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "sinks.name".to_owned(),
                    reason: "sink name must not be empty".to_owned(),
                }
                .into());
            }
            if !names.insert(sink.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "sinks.name".to_owned(),
                    reason: format!("duplicate sink name '{}'", sink.name),
                }
                .into());
            }
            match sink.kind {
                SinkKind::File if sink.path.as_deref().is_none_or(str::is_empty) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("sinks.{}.path", sink.name),
                        reason: "file sink requires a path".to_owned(),
                    }
                    .into());
                }
                SinkKind::Webhook if sink.url.as_deref().is_none_or(str::is_empty) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("sinks.{}.url", sink.name),
                        reason: "webhook sink requires a url".to_owned(),
                    }
                    .into());
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 내부 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 내부 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// 최소 레벨 (이보다 낮은 레코드는 체인에 들어가기 전에 드롭)
    pub min_level: Level,
    /// 모든 레코드에 기본으로 붙는 bound context
    pub default_context: Fields,
    /// 마스킹할 필드 경로 (점 구분, 예: "user.password")
    pub redact_paths: Vec<String>,
    /// 스택 트레이스 포함 정책
    pub stack_traces: StackTracePolicy,
    /// 샘플링: 윈도우당 최대 레코드 수 (None이면 샘플링 비활성화)
    pub sample_max_per_window: Option<u32>,
    /// 샘플링 윈도우 (밀리초)
    pub sample_window_ms: u64,
    /// 배치 sink 기본 배치 크기
    pub batch_size: usize,
    /// 배치 sink 기본 플러시 간격 (밀리초, None이면 타이머 비활성화)
    pub flush_interval_ms: Option<u64>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            default_context: Fields::new(),
            redact_paths: Vec::new(),
            stack_traces: StackTracePolicy::Always,
            sample_max_per_window: None,
            sample_window_ms: 60_000,
            batch_size: 50,
            flush_interval_ms: Some(1_000),
        }
    }
}

/// sink 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// 표준 출력 (JSON lines)
    #[default]
    Console,
    /// 파일 (JSON lines, append)
    File,
    /// HTTP webhook (POST JSON)
    Webhook,
}

/// 설정 파일의 `[[sinks]]` 항목
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSpec {
    /// 고유 이름
    pub name: String,
    /// sink 종류
    pub kind: SinkKind,
    /// 최소 레벨 (None이면 모든 레코드)
    pub level: Option<Level>,
    /// 파일 경로 (file 전용)
    pub path: Option<String>,
    /// webhook URL (webhook 전용)
    pub url: Option<String>,
    /// 배치 전송 wrapper 적용 여부
    pub batched: bool,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_level(target: &mut Level, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<Level>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse level from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_u32(target: &mut Option<u32>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        if val.is_empty() || val.eq_ignore_ascii_case("none") {
            *target = None;
            return;
        }
        match val.parse::<u32>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_u64(target: &mut Option<u64>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        if val.is_empty() || val.eq_ignore_ascii_case("none") {
            *target = None;
            return;
        }
        match val.parse::<u64>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
