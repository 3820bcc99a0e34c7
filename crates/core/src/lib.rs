//! logflume 공통 타입, trait, 에러, 설정
//!
//! # 모듈 구성
//!
//! - [`types`]: 심각도 [`Level`]과 스택 트레이스 정책
//! - [`record`]: 파이프라인을 흐르는 [`LogRecord`]와 부가 정보
//! - [`scope`]: bound context를 가진 child logger [`Scope`]
//! - [`clock`]: 주입 가능한 논리 시계
//! - [`pipeline`]: 출력 대상 [`Sink`] trait
//! - [`config`]: logflume.toml 설정
//! - [`metrics`]: 메트릭 이름 상수
//! - [`error`]: 도메인 에러 타입

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod scope;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, FlumeError, SinkError};

// 설정
pub use config::FlumeConfig;

// 레코드
pub use record::{Attachment, ErrorInfo, Fields, LogRecord};

// 스코프
pub use scope::Scope;

// 시계
pub use clock::{Clock, ManualClock, SystemClock};

// Sink trait
pub use pipeline::{BoxFuture, Sink};

// 도메인 타입
pub use types::{Level, StackTracePolicy};
