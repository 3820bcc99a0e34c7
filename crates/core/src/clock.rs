//! 시계 추상화 -- 논리적 이벤트 시각 공급
//!
//! 파이프라인 로직은 벽시계를 직접 읽지 않고 [`Clock`]을 통해 시각을 얻습니다.
//! 테스트에서는 [`ManualClock`]으로 시간을 결정적으로 제어할 수 있습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 밀리초 단위 시각을 공급하는 trait
pub trait Clock: Send + Sync {
    /// 현재 시각 (밀리초)
    fn now_millis(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn now_millis(&self) -> u64 {
        self()
    }
}

/// UNIX epoch 기준 시스템 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// 수동으로 조작하는 시계
///
/// 복제본끼리 같은 시각을 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// 지정 시각에서 시작하는 시계를 생성합니다.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// 시각을 설정합니다.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// 시각을 앞으로 이동합니다.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
