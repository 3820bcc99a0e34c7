//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 엔진 구성과 생명주기에서 발생하는 에러를 표현합니다.
//! `From<PipelineError> for FlumeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 레코드 단위 실패([`StageError`], [`AlertError`], sink 전송 실패)는
//! `emit` 호출자에게 돌아가지 않고 진단 채널로만 보고됩니다.

use std::fmt;

use logflume_core::error::{FlumeError, SinkError};

/// 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 설정 에러 (생성 시점에 즉시 실패)
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 같은 이름의 sink가 이미 등록됨
    #[error("sink '{0}' is already registered")]
    DuplicateSink(String),

    /// 등록되지 않은 sink
    #[error("sink '{0}' is not registered")]
    UnknownSink(String),

    /// 엔진이 이미 닫힘
    #[error("pipeline is closed")]
    Closed,

    /// tokio 런타임 밖에서 엔진을 생성함
    #[error("no tokio runtime available: {0}")]
    Runtime(String),

    /// flush/close 중 하나 이상의 sink가 실패함
    #[error("{} sink(s) failed: {}", .0.len(), SinkFailureList(.0))]
    SinkFailures(Vec<SinkFailure>),
}

impl PipelineError {
    /// 설정 에러를 생성합니다.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<PipelineError> for FlumeError {
    fn from(err: PipelineError) -> Self {
        FlumeError::Pipeline(err.to_string())
    }
}

/// 개별 sink 실패
#[derive(Debug)]
pub struct SinkFailure {
    /// sink 이름
    pub sink: String,
    /// 실패 원인
    pub error: SinkError,
}

struct SinkFailureList<'a>(&'a [SinkFailure]);

impl fmt::Display for SinkFailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.sink, failure.error)?;
        }
        Ok(())
    }
}

/// 미들웨어 스테이지 실패
#[derive(Debug, Clone, thiserror::Error)]
#[error("stage '{stage}' failed: {reason}")]
pub struct StageError {
    /// 스테이지 이름
    pub stage: String,
    /// 실패 사유
    pub reason: String,
}

impl StageError {
    /// 스테이지 실패를 생성합니다.
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// 알림 콜백 실패
#[derive(Debug, Clone, thiserror::Error)]
#[error("alert handler failed: {0}")]
pub struct AlertError(pub String);

impl AlertError {
    /// 알림 콜백 실패를 생성합니다.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = PipelineError::config("threshold", "must be greater than 0");
        let msg = err.to_string();
        assert!(msg.contains("threshold"));
        assert!(msg.contains("greater than 0"));
    }

    #[test]
    fn converts_to_flume_error() {
        let err = PipelineError::DuplicateSink("stdout".to_owned());
        let flume_err: FlumeError = err.into();
        assert!(matches!(flume_err, FlumeError::Pipeline(_)));
        assert!(flume_err.to_string().contains("stdout"));
    }

    #[test]
    fn sink_failures_display_lists_every_sink() {
        let err = PipelineError::SinkFailures(vec![
            SinkFailure {
                sink: "file".to_owned(),
                error: SinkError::delivery("file", "disk full"),
            },
            SinkFailure {
                sink: "hook".to_owned(),
                error: SinkError::Closed("hook".to_owned()),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 sink(s) failed"));
        assert!(msg.contains("disk full"));
        assert!(msg.contains("'hook' is closed"));
    }

    #[test]
    fn stage_error_display() {
        let err = StageError::new("enrich", "missing tenant");
        assert_eq!(err.to_string(), "stage 'enrich' failed: missing tenant");
    }
}
