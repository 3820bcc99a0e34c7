//! 배치 전송 -- sink를 감싸 레코드를 버퍼링하고 크기/시간 조건으로 플러시합니다.
//!
//! [`BatchingSink`]는 내부 sink 앞에 인메모리 버퍼를 둡니다.
//!
//! # 플러시 조건
//! - 버퍼가 `batch_size`에 도달하면 `deliver`가 반환되기 전에 플러시합니다.
//! - `flush_interval_ms`가 설정되어 있으면, 빈 버퍼에 첫 레코드가 들어올 때 타이머를 겁니다.
//!   모든 플러시는 타이머를 해제합니다.
//! - `close()`는 남은 레코드를 전송한 뒤 내부 sink를 닫습니다. 이후의 `deliver`는
//!   [`SinkError::Closed`]로 실패합니다.
//!
//! 개별 레코드 전송 실패는 호출자에게 반환되지 않고 진단 채널로 보고되며,
//! 이후 레코드의 전송을 막지 않습니다.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use logflume_core::error::SinkError;
use logflume_core::metrics as m;
use logflume_core::pipeline::{BoxFuture, Sink};
use logflume_core::record::LogRecord;
use logflume_core::types::Level;

use crate::diagnostics::{Diagnostic, Diagnostics, FailureKind, catch_panic};
use crate::error::PipelineError;

/// 배치 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// 플러시를 유발하는 버퍼 크기
    pub batch_size: usize,
    /// 시간 기반 플러시 간격 (밀리초, `None`이면 비활성)
    pub flush_interval_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_ms: None,
        }
    }
}

impl BatchConfig {
    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size", "must be greater than 0"));
        }
        if self.flush_interval_ms == Some(0) {
            return Err(PipelineError::config(
                "flush_interval_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 버퍼, 내부 sink, 타이머 상태
struct BatchState<S> {
    inner: S,
    buffer: Vec<Arc<LogRecord>>,
    closed: bool,
    /// 타이머 세대. 해제/재설정마다 증가하여 오래된 타이머의 발화를 무효화합니다.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl<S> BatchState<S> {
    fn disarm(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// 배치 전송 래퍼
pub struct BatchingSink<S> {
    name: String,
    level: Option<Level>,
    config: BatchConfig,
    state: Arc<Mutex<BatchState<S>>>,
    diagnostics: Diagnostics,
}

impl<S: Sink + 'static> BatchingSink<S> {
    /// 내부 sink를 감싸는 배치 래퍼를 생성합니다.
    ///
    /// 이름과 레벨 필터는 내부 sink의 것을 사용합니다.
    pub fn new(inner: S, config: BatchConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            name: inner.name().to_owned(),
            level: inner.level(),
            config,
            state: Arc::new(Mutex::new(BatchState {
                inner,
                buffer: Vec::with_capacity(config.batch_size.min(1024)),
                closed: false,
                generation: 0,
                timer: None,
            })),
            diagnostics: Diagnostics::new(),
        })
    }

    /// 전송 실패를 보고할 진단 채널을 지정합니다.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// 설정
    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// 현재 버퍼에 있는 레코드 수
    pub async fn pending(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    fn arm(&self, state: &mut BatchState<S>) {
        let Some(interval) = self.config.flush_interval_ms else {
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(sink = %self.name, "no tokio runtime, flush timer not armed");
            return;
        };

        state.disarm();
        let generation = state.generation;
        let weak: Weak<Mutex<BatchState<S>>> = Arc::downgrade(&self.state);
        let name = self.name.clone();
        let diagnostics = self.diagnostics.clone();

        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(interval)).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut state = shared.lock().await;
            if state.closed || state.generation != generation {
                return;
            }
            // 자기 자신을 abort하지 않도록 핸들을 먼저 분리
            state.timer.take();
            let flushed = drain(&mut *state, &name, &diagnostics).await;
            tracing::debug!(sink = %name, flushed, "batch flushed by timer");
        }));
    }
}

/// 버퍼를 비우고 내부 sink로 순서대로 전송합니다.
///
/// 타이머를 해제하고, 전송한 레코드 수를 반환합니다.
async fn drain<S: Sink>(state: &mut BatchState<S>, name: &str, diagnostics: &Diagnostics) -> usize {
    state.disarm();
    let records = std::mem::take(&mut state.buffer);
    let count = records.len();
    if count == 0 {
        return 0;
    }

    for record in records {
        let outcome = catch_panic(async { state.inner.deliver(Arc::clone(&record)).await })
            .await
            .unwrap_or_else(|panic| Err(SinkError::delivery(name, format!("deliver panicked: {panic}"))));
        if let Err(e) = outcome {
            diagnostics.report(
                Diagnostic::new(FailureKind::Delivery, name, e.to_string()).with_record(record.id()),
            );
        }
    }
    metrics::counter!(m::BATCH_FLUSHES_TOTAL, m::LABEL_SINK => name.to_owned()).increment(1);
    count
}

impl<S: Sink + 'static> Sink for BatchingSink<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn level(&self) -> Option<Level> {
        self.level
    }

    fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(SinkError::Closed(self.name.clone()));
            }

            let was_empty = state.buffer.is_empty();
            state.buffer.push(record);

            if state.buffer.len() >= self.config.batch_size {
                let flushed = drain(&mut *state, &self.name, &self.diagnostics).await;
                tracing::trace!(sink = %self.name, flushed, "batch flushed by size");
            } else if was_empty {
                self.arm(&mut *state);
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            drain(&mut *state, &self.name, &self.diagnostics).await;
            state.inner.flush().await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            let flushed = drain(&mut *state, &self.name, &self.diagnostics).await;
            state.closed = true;
            tracing::debug!(sink = %self.name, flushed, "batching sink closed");
            state.inner.close().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Deliver(String),
        Flush,
        Close,
    }

    /// 호출 순서를 기록하는 테스트 sink
    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<StdMutex<Vec<Call>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn delivered(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Deliver(m) => Some(m),
                    _ => None,
                })
                .collect()
        }
    }

    impl Sink for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn level(&self) -> Option<Level> {
            Some(Level::WARN)
        }

        fn deliver(&mut self, record: Arc<LogRecord>) -> BoxFuture<'_, Result<(), SinkError>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push(Call::Deliver(record.message().to_owned()));
                if record.message() == "bad" {
                    return Err(SinkError::delivery("recorder", "rejected"));
                }
                if record.message() == "explode" {
                    panic!("recorder exploded");
                }
                Ok(())
            })
        }

        fn flush(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(Call::Flush);
                Ok(())
            })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<(), SinkError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(Call::Close);
                Ok(())
            })
        }
    }

    fn rec(message: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord::new(Level::ERROR, message, 0))
    }

    fn batching(recorder: &Recorder, batch_size: usize, interval: Option<u64>) -> BatchingSink<Recorder> {
        BatchingSink::new(
            recorder.clone(),
            BatchConfig {
                batch_size,
                flush_interval_ms: interval,
            },
        )
        .unwrap()
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn rejects_zero_batch_size() {
        let result = BatchingSink::new(
            Recorder::default(),
            BatchConfig {
                batch_size: 0,
                flush_interval_ms: None,
            },
        );
        assert!(matches!(result, Err(PipelineError::Config { .. })));
    }

    #[test]
    fn inherits_inner_name_and_level() {
        let sink = batching(&Recorder::default(), 2, None);
        assert_eq!(sink.name(), "recorder");
        assert_eq!(sink.level(), Some(Level::WARN));
    }

    #[tokio::test]
    async fn size_trigger_delivers_in_order_before_returning() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 2, None);

        sink.deliver(rec("one")).await.unwrap();
        assert!(recorder.calls().is_empty());

        sink.deliver(rec("two")).await.unwrap();
        assert_eq!(recorder.delivered(), vec!["one", "two"]);
        assert_eq!(sink.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_flushes_partial_batch() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 10, Some(100));

        sink.deliver(rec("lonely")).await.unwrap();
        sleep_ms(50).await;
        assert!(recorder.delivered().is_empty());

        sleep_ms(100).await;
        assert_eq!(recorder.delivered(), vec!["lonely"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_is_armed_only_for_first_record_in_empty_buffer() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 10, Some(100));

        sink.deliver(rec("first")).await.unwrap();
        sleep_ms(60).await;
        sink.deliver(rec("second")).await.unwrap();

        // 첫 레코드 기준 t=100에 두 레코드 모두 플러시
        sleep_ms(50).await;
        assert_eq!(recorder.delivered(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_disarms_pending_timer() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 10, Some(100));

        sink.deliver(rec("a")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(recorder.calls(), vec![Call::Deliver("a".into()), Call::Flush]);

        sleep_ms(50).await;
        sink.deliver(rec("b")).await.unwrap();

        // 해제된 첫 타이머(t=100)는 b를 플러시하지 않음
        sleep_ms(60).await;
        assert_eq!(recorder.delivered(), vec!["a"]);

        // b의 타이머는 t=150에 발화
        sleep_ms(50).await;
        assert_eq!(recorder.delivered(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_before_inner_close_and_stops_timer() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 10, Some(100));

        sink.deliver(rec("buffered")).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(
            recorder.calls(),
            vec![Call::Deliver("buffered".into()), Call::Close]
        );

        sleep_ms(500).await;
        assert_eq!(recorder.calls().len(), 2);

        let err = sink.deliver(rec("late")).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(name) if name == "recorder"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let recorder = Recorder::default();
        let mut sink = batching(&recorder, 10, None);
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(recorder.calls(), vec![Call::Close]);
    }

    #[tokio::test]
    async fn inner_failure_is_isolated_and_reported() {
        let recorder = Recorder::default();
        let diagnostics = Diagnostics::new();
        let mut diag_rx = diagnostics.subscribe();
        let mut sink = batching(&recorder, 3, None).with_diagnostics(diagnostics);

        sink.deliver(rec("a")).await.unwrap();
        sink.deliver(rec("bad")).await.unwrap();
        sink.deliver(rec("c")).await.unwrap();

        assert_eq!(recorder.delivered(), vec!["a", "bad", "c"]);
        let diagnostic = diag_rx.recv().await.unwrap();
        assert_eq!(diagnostic.kind, FailureKind::Delivery);
        assert_eq!(diagnostic.source, "recorder");
        assert!(diag_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn inner_panic_is_reported_and_rest_of_batch_delivered() {
        let recorder = Recorder::default();
        let diagnostics = Diagnostics::new();
        let mut diag_rx = diagnostics.subscribe();
        let mut sink = batching(&recorder, 3, None).with_diagnostics(diagnostics);

        sink.deliver(rec("a")).await.unwrap();
        sink.deliver(rec("explode")).await.unwrap();
        sink.deliver(rec("c")).await.unwrap();

        assert_eq!(recorder.delivered(), vec!["a", "explode", "c"]);
        let diagnostic = diag_rx.recv().await.unwrap();
        assert_eq!(diagnostic.kind, FailureKind::Delivery);
        assert!(diagnostic.message.contains("deliver panicked: recorder exploded"));

        // 다음 배치도 정상 동작
        sink.deliver(rec("d")).await.unwrap();
        sink.flush().await.unwrap();
        assert!(recorder.delivered().ends_with(&["d".to_owned()]));
    }
}
