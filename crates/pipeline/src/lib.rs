//! logflume 파이프라인 엔진
//!
//! 레코드를 미들웨어 체인에 통과시킨 뒤 등록된 sink로 fan-out 합니다.
//!
//! # 모듈 구성
//!
//! - [`engine`]: [`PipelineEngine`]과 빌더
//! - [`middleware`]: 스테이지 trait과 체인
//! - [`sampling`]: 고정 윈도우 속도 제한 스테이지
//! - [`alert`]: 임계치 알림 스테이지
//! - [`redact`]: 민감 필드 마스킹 스테이지
//! - [`batch`]: 배치 전송 래퍼
//! - [`sink`]: 기본 제공 sink
//! - [`diagnostics`]: 내부 실패 보고 채널
//! - [`config`]: 엔진 설정
//! - [`error`]: 에러 타입
//!
//! # 사용 예시
//! ```ignore
//! use logflume_core::{Level, Scope};
//! use logflume_pipeline::{PipelineEngineBuilder, sink::ConsoleSink};
//!
//! let mut engine = PipelineEngineBuilder::new()
//!     .sink(ConsoleSink::stdout("stdout"))
//!     .build()?;
//!
//! let scope = Scope::root("app");
//! engine.log(&scope, Level::INFO, "service started", ());
//! engine.close().await?;
//! ```

pub mod alert;
pub mod batch;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod redact;
pub mod sampling;
pub mod sink;
mod worker;

pub use alert::{Alert, AlertHandler, AlertRule, ThresholdAlerter};
pub use batch::{BatchConfig, BatchingSink};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use diagnostics::{Diagnostic, Diagnostics, FailureKind};
pub use engine::{PipelineEngine, PipelineEngineBuilder};
pub use error::{AlertError, PipelineError, SinkFailure, StageError};
pub use middleware::{Chain, Middleware, Next, StageContext};
pub use redact::Redactor;
pub use sampling::{RateLimiter, SamplingConfig};
