//! 진단 채널 -- 파이프라인 내부 실패를 레코드 흐름과 분리하여 보고합니다.
//!
//! 스테이지 실패, sink 전송 실패, 알림 콜백 실패는 `emit` 호출자에게 돌아가지 않고
//! [`Diagnostics`]로만 보고됩니다. 보고 경로는 세 가지입니다.
//!
//! - `tracing::warn!` (target: `logflume::diagnostics`)
//! - `metrics` 카운터 ([`DIAGNOSTICS_TOTAL`](logflume_core::metrics::DIAGNOSTICS_TOTAL))
//! - `tokio::sync::broadcast` 구독자
//!
//! 진단은 같은 파이프라인으로 다시 기록되지 않습니다. 호스트가 `tracing` 출력을
//! logflume으로 연결하는 경우 `logflume::diagnostics` target을 제외해야 합니다.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::broadcast;

use logflume_core::metrics::{DIAGNOSTICS_TOTAL, LABEL_KIND};

/// 진단 broadcast 채널 용량
const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 256;

/// 실패 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 미들웨어 스테이지 실패 (레코드 드롭)
    Stage,
    /// sink 전송/flush/close 실패
    Delivery,
    /// 알림 콜백 실패
    AlertCallback,
}

impl FailureKind {
    /// 메트릭 레이블 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Delivery => "delivery",
            Self::AlertCallback => "alert_callback",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 진단 이벤트
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// 실패 분류
    pub kind: FailureKind,
    /// 실패한 컴포넌트 (스테이지, sink, 규칙 이름)
    pub source: String,
    /// 실패 사유
    pub message: String,
    /// 관련 레코드 ID (있을 경우)
    pub record_id: Option<String>,
}

impl Diagnostic {
    /// 새 진단 이벤트를 생성합니다.
    pub fn new(kind: FailureKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            message: message.into(),
            record_id: None,
        }
    }

    /// 관련 레코드 ID를 설정합니다.
    pub fn with_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.source, self.message)
    }
}

/// 진단 보고 핸들
///
/// 복제본은 같은 broadcast 채널을 공유합니다.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<Diagnostic>,
}

impl Diagnostics {
    /// 새 진단 채널을 생성합니다.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// 진단 이벤트를 보고합니다.
    ///
    /// 구독자가 없어도 실패하지 않습니다.
    pub fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            target: "logflume::diagnostics",
            kind = %diagnostic.kind,
            source = %diagnostic.source,
            record_id = diagnostic.record_id.as_deref().unwrap_or("-"),
            "{}",
            diagnostic.message
        );
        metrics::counter!(DIAGNOSTICS_TOTAL, LABEL_KIND => diagnostic.kind.as_str()).increment(1);
        let _ = self.tx.send(diagnostic);
    }

    /// 진단 이벤트 구독자를 생성합니다.
    ///
    /// 구독 이후에 보고된 이벤트만 수신합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// panic payload에서 메시지를 꺼냅니다.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

/// future를 실행하고, poll 도중의 panic을 메시지로 바꿔 반환합니다.
///
/// 동기 구간의 panic까지 잡으려면 호출을 `async` 블록 안에 넣어 전달해야 합니다.
pub(crate) async fn catch_panic<F: Future>(future: F) -> Result<F::Output, String> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()).to_owned())
}
