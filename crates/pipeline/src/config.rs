//! 파이프라인 엔진 설정
//!
//! [`PipelineConfig`]는 core의 [`PipelineSection`](logflume_core::config::PipelineSection)을
//! 기반으로 엔진 전용 설정(sink 큐 용량)을 추가합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logflume_core::config::FlumeConfig;
//! use logflume_pipeline::config::PipelineConfig;
//!
//! let core_config = FlumeConfig::default();
//! let config = PipelineConfig::from_core(&core_config.pipeline);
//! ```

use serde::{Deserialize, Serialize};

use logflume_core::config::PipelineSection;
use logflume_core::record::Fields;
use logflume_core::types::{Level, StackTracePolicy};

use crate::batch::BatchConfig;
use crate::error::PipelineError;
use crate::redact::Redactor;
use crate::sampling::SamplingConfig;

/// sink 작업 큐 기본 용량
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 10_000;

/// 파이프라인 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 최소 레벨
    pub min_level: Level,
    /// 모든 레코드에 적용되는 기본 bound context
    pub default_context: Fields,
    /// 마스킹 경로
    pub redact_paths: Vec<String>,
    /// 스택 트레이스 정책
    pub stack_traces: StackTracePolicy,
    /// 샘플링 (None이면 비활성)
    pub sampling: Option<SamplingConfig>,
    /// `batched_sink`에 적용되는 배치 설정
    pub batch: BatchConfig,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// sink별 작업 큐 용량. 가득 차면 해당 sink에 대한 레코드는 드롭됩니다.
    pub sink_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&PipelineSection::default())
    }
}

impl PipelineConfig {
    /// core의 `PipelineSection`에서 엔진 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &PipelineSection) -> Self {
        Self {
            min_level: core.min_level,
            default_context: core.default_context.clone(),
            redact_paths: core.redact_paths.clone(),
            stack_traces: core.stack_traces,
            sampling: core.sample_max_per_window.map(|max_per_window| SamplingConfig {
                max_per_window,
                window_ms: core.sample_window_ms,
            }),
            batch: BatchConfig {
                batch_size: core.batch_size,
                flush_interval_ms: core.flush_interval_ms,
            },
            sink_queue_capacity: DEFAULT_SINK_QUEUE_CAPACITY,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        const MAX_SINK_QUEUE_CAPACITY: usize = 10_000_000;

        if self.sink_queue_capacity == 0 || self.sink_queue_capacity > MAX_SINK_QUEUE_CAPACITY {
            return Err(PipelineError::config(
                "sink_queue_capacity",
                format!("must be 1-{MAX_SINK_QUEUE_CAPACITY}"),
            ));
        }
        if let Some(sampling) = &self.sampling {
            sampling.validate()?;
        }
        self.batch.validate()?;
        Redactor::new(&self.redact_paths)?;
        Ok(())
    }
}

/// 파이프라인 설정 빌더
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 최소 레벨을 설정합니다.
    pub fn min_level(mut self, level: Level) -> Self {
        self.config.min_level = level;
        self
    }

    /// 기본 bound context에 필드를 추가합니다.
    pub fn context_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.config.default_context.insert(key.into(), value.into());
        self
    }

    /// 마스킹 경로를 추가합니다.
    pub fn redact_path(mut self, path: impl Into<String>) -> Self {
        self.config.redact_paths.push(path.into());
        self
    }

    /// 스택 트레이스 정책을 설정합니다.
    pub fn stack_traces(mut self, policy: StackTracePolicy) -> Self {
        self.config.stack_traces = policy;
        self
    }

    /// 샘플링을 활성화합니다.
    pub fn sampling(mut self, max_per_window: u32, window_ms: u64) -> Self {
        self.config.sampling = Some(SamplingConfig {
            max_per_window,
            window_ms,
        });
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch.batch_size = size;
        self
    }

    /// 배치 플러시 간격(밀리초)을 설정합니다.
    pub fn flush_interval_ms(mut self, interval: Option<u64>) -> Self {
        self.config.batch.flush_interval_ms = interval;
        self
    }

    /// sink 큐 용량을 설정합니다.
    pub fn sink_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.sink_queue_capacity = capacity;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
