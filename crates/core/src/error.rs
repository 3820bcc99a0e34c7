//! 에러 타입 -- 도메인별 에러 정의

/// logflume 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FlumeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Sink 전송 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Sink 전송 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 레코드 전송 실패
    #[error("delivery to '{sink}' failed: {reason}")]
    Delivery { sink: String, reason: String },

    /// 이미 닫힌 sink
    #[error("sink '{0}' is closed")]
    Closed(String),

    /// 직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// 전송 실패 에러를 생성합니다.
    pub fn delivery(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}
