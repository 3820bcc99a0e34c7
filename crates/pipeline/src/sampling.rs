//! 샘플링 -- 고정 윈도우 속도 제한 스테이지
//!
//! [`RateLimiter`]는 키(기본값: 메시지 텍스트)별로 윈도우당 최대 레코드 수를 제한합니다.
//! 윈도우는 벽시계 경계가 아니라, 이전 윈도우가 만료된 뒤 처음 관측된 레코드의
//! 타임스탬프에 고정됩니다 (sliding window가 아님).
//!
//! # 메모리 상한
//! 버킷 수가 [`SWEEP_THRESHOLD`]를 넘으면, 윈도우가 끝난 지 한 윈도우 이상 지난
//! (`now - window_start >= 2 * window_ms`) 버킷을 정리합니다.

use std::collections::HashMap;

use logflume_core::metrics as m;
use logflume_core::record::LogRecord;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, StageError};
use crate::middleware::{Middleware, Next};

/// 버킷 정리를 시작하는 버킷 수
pub const SWEEP_THRESHOLD: usize = 10_000;

/// 속도 제한 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// 윈도우당 최대 통과 레코드 수
    pub max_per_window: u32,
    /// 윈도우 길이 (밀리초)
    pub window_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_per_window: 100,
            window_ms: 60_000,
        }
    }
}

impl SamplingConfig {
    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_per_window == 0 {
            return Err(PipelineError::config(
                "max_per_window",
                "must be greater than 0",
            ));
        }
        if self.window_ms == 0 {
            return Err(PipelineError::config("window_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 키별 카운터 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    count: u32,
    window_start: u64,
}

type KeyFn = Box<dyn Fn(&LogRecord) -> String + Send>;

/// 고정 윈도우 속도 제한기
pub struct RateLimiter {
    config: SamplingConfig,
    key_fn: KeyFn,
    /// 키 -> (윈도우 내 관측 수, 윈도우 시작 시각)
    buckets: HashMap<String, Bucket>,
    /// 통과시킨 레코드 수
    admitted: u64,
    /// 드롭한 레코드 수
    dropped: u64,
}

impl RateLimiter {
    /// 메시지 텍스트를 키로 사용하는 속도 제한기를 생성합니다.
    pub fn new(config: SamplingConfig) -> Result<Self, PipelineError> {
        Self::with_key(config, |record| record.message().to_owned())
    }

    /// 사용자 정의 키 추출 함수로 속도 제한기를 생성합니다.
    pub fn with_key<F>(config: SamplingConfig, key_fn: F) -> Result<Self, PipelineError>
    where
        F: Fn(&LogRecord) -> String + Send + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            key_fn: Box::new(key_fn),
            buckets: HashMap::new(),
            admitted: 0,
            dropped: 0,
        })
    }

    /// 레코드 통과 여부를 결정하고 카운터를 갱신합니다.
    ///
    /// `now`는 레코드의 타임스탬프입니다.
    pub fn admit(&mut self, record: &LogRecord) -> bool {
        let key = (self.key_fn)(record);
        self.admit_key(key, record.timestamp())
    }

    fn admit_key(&mut self, key: String, now: u64) -> bool {
        let window = self.config.window_ms;

        if !self.buckets.contains_key(&key) && self.buckets.len() >= SWEEP_THRESHOLD {
            self.sweep(now);
        }

        let bucket = self.buckets.entry(key).or_insert(Bucket {
            count: 0,
            window_start: now,
        });

        if now.saturating_sub(bucket.window_start) >= window {
            // 새 윈도우 시작
            *bucket = Bucket {
                count: 0,
                window_start: now,
            };
        }

        bucket.count = bucket.count.saturating_add(1);

        if bucket.count <= self.config.max_per_window {
            self.admitted += 1;
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    /// 윈도우가 끝난 지 한 윈도우 이상 지난 버킷을 정리합니다.
    pub fn sweep(&mut self, now: u64) {
        let retain_for = self.config.window_ms.saturating_mul(2);
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_sub(bucket.window_start) < retain_for);
        tracing::debug!(
            removed = before - self.buckets.len(),
            remaining = self.buckets.len(),
            "swept expired sampling buckets"
        );
    }

    /// 현재 버킷 수
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 통과시킨 레코드 수
    pub fn admitted(&self) -> u64 {
        self.admitted
    }

    /// 드롭한 레코드 수
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 설정
    pub fn config(&self) -> SamplingConfig {
        self.config
    }
}

impl Middleware for RateLimiter {
    fn name(&self) -> &str {
        "sampling"
    }

    fn handle(&mut self, record: LogRecord, next: Next<'_>) -> Result<(), StageError> {
        if self.admit(&record) {
            return next.proceed(record);
        }
        metrics::counter!(m::SAMPLING_DROPPED_TOTAL).increment(1);
        tracing::trace!(record_id = record.id(), "record dropped by sampling");
        Ok(())
    }
}
