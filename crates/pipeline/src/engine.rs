//! 파이프라인 엔진 -- 미들웨어 체인 실행과 sink fan-out을 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! emit -> min_level -> default context -> [user middleware] -> alert -> sampling -> redact
//!      -> stack trace policy -> Arc<LogRecord> -> SinkWorker queue (sink마다 하나)
//! ```
//!
//! `emit`은 동기 함수이며 체인 상태는 엔진이 단독으로 소유합니다.
//! `emit_wait`은 같은 체인을 거친 뒤 sink 큐에 자리가 날 때까지 기다립니다.
//! 체인 안의 실패(에러 또는 panic)는 호출자에게 전파되지 않고 진단 채널로만 보고됩니다.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use logflume_core::clock::{Clock, SystemClock};
use logflume_core::metrics as m;
use logflume_core::pipeline::Sink;
use logflume_core::record::{Attachment, LogRecord};
use logflume_core::scope::Scope;
use logflume_core::types::{Level, StackTracePolicy};

use crate::alert::{AlertRule, ThresholdAlerter};
use crate::batch::BatchingSink;
use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, FailureKind, panic_message};
use crate::error::{PipelineError, SinkFailure};
use crate::middleware::{Chain, Middleware, StageContext};
use crate::redact::Redactor;
use crate::sampling::RateLimiter;
use crate::worker::{PendingAck, SinkWorker};

/// 엔진 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// 레코드 수신 중
    Running,
    /// 닫힘 (이후 emit은 무시됨)
    Closed,
}

/// 파이프라인 엔진
///
/// # 사용 예시
/// ```ignore
/// use logflume_pipeline::{PipelineEngineBuilder, sink::ConsoleSink};
///
/// let mut engine = PipelineEngineBuilder::new()
///     .config(config)
///     .sink(ConsoleSink::stdout("stdout"))
///     .build()?;
///
/// engine.log(&scope, Level::INFO, "ready", ());
/// engine.close().await?;
/// ```
pub struct PipelineEngine {
    config: PipelineConfig,
    state: EngineState,
    clock: Arc<dyn Clock>,
    chain: Chain,
    ctx: StageContext,
    diagnostics: Diagnostics,
    runtime: Handle,
    /// 등록 순서 = fan-out 순서
    sinks: Vec<SinkWorker>,
    emitted_count: u64,
    dropped_count: u64,
}

impl PipelineEngine {
    /// 레코드를 파이프라인에 넣습니다.
    ///
    /// 레코드가 체인을 통과해 fan-out 되었으면 `true`, 드롭되었거나 엔진이 닫혔으면
    /// `false`를 반환합니다. sink 큐가 가득 차 있으면 해당 sink에 대한 전송은 드롭되고
    /// 진단으로 보고됩니다.
    pub fn emit(&mut self, record: LogRecord) -> bool {
        match self.prepare(record) {
            Some(record) => {
                self.dispatch(record);
                true
            }
            None => false,
        }
    }

    /// [`emit`](Self::emit)과 같지만, 가득 찬 sink 큐에 자리가 날 때까지 기다립니다.
    ///
    /// 입력 속도를 sink 처리 속도에 맞춰야 하는 생산자(예: 파일 tail)에서 사용합니다.
    pub async fn emit_wait(&mut self, record: LogRecord) -> bool {
        let Some(record) = self.prepare(record) else {
            return false;
        };
        self.count_emitted();
        for worker in &self.sinks {
            if !worker.admits(record.level()) {
                continue;
            }
            if let Err(e) = worker.deliver_wait(Arc::clone(&record)).await {
                self.diagnostics.report(
                    Diagnostic::new(FailureKind::Delivery, worker.name(), e.to_string())
                        .with_record(record.id()),
                );
            }
        }
        true
    }

    /// 체인을 실행하고 fan-out 할 레코드를 반환합니다. 드롭되면 `None`입니다.
    fn prepare(&mut self, mut record: LogRecord) -> Option<Arc<LogRecord>> {
        if self.state == EngineState::Closed {
            tracing::trace!(record_id = record.id(), "emit after close ignored");
            return None;
        }

        if !self.config.min_level.admits(record.level()) {
            self.record_drop("min_level");
            return None;
        }

        record.inherit_context(&self.config.default_context);
        let record_id = record.id().to_owned();

        let chain = &mut self.chain;
        let ctx = &self.ctx;
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || chain.run(record, ctx)));

        let mut record = match outcome {
            Ok(Ok(Some(record))) => record,
            Ok(Ok(None)) => {
                self.record_drop("chain");
                return None;
            }
            Ok(Err(e)) => {
                self.diagnostics.report(
                    Diagnostic::new(FailureKind::Stage, &e.stage, e.reason).with_record(record_id),
                );
                self.record_drop("stage_error");
                return None;
            }
            Err(payload) => {
                self.diagnostics.report(
                    Diagnostic::new(
                        FailureKind::Stage,
                        "chain",
                        format!("stage panicked: {}", panic_message(payload.as_ref())),
                    )
                    .with_record(record_id),
                );
                self.record_drop("stage_panic");
                return None;
            }
        };

        apply_stack_policy(&mut record, self.config.stack_traces);
        Some(Arc::new(record))
    }

    /// 스코프의 context로 레코드를 만들어 emit 합니다.
    pub fn log(
        &mut self,
        scope: &Scope,
        level: Level,
        message: impl Into<String>,
        attachment: impl Into<Attachment>,
    ) -> bool {
        let record = scope.record(self.clock.as_ref(), level, message, attachment);
        self.emit(record)
    }

    /// [`log`](Self::log)의 대기 버전입니다. [`emit_wait`](Self::emit_wait)을 사용합니다.
    pub async fn log_wait(
        &mut self,
        scope: &Scope,
        level: Level,
        message: impl Into<String>,
        attachment: impl Into<Attachment>,
    ) -> bool {
        let record = scope.record(self.clock.as_ref(), level, message, attachment);
        self.emit_wait(record).await
    }

    fn count_emitted(&mut self) {
        self.emitted_count += 1;
        metrics::counter!(m::RECORDS_EMITTED_TOTAL).increment(1);
    }

    fn dispatch(&mut self, record: Arc<LogRecord>) {
        self.count_emitted();

        for worker in &self.sinks {
            if !worker.admits(record.level()) {
                continue;
            }
            if let Err(e) = worker.try_deliver(Arc::clone(&record)) {
                self.diagnostics.report(
                    Diagnostic::new(FailureKind::Delivery, worker.name(), e.to_string())
                        .with_record(record.id()),
                );
            }
        }
    }

    fn record_drop(&mut self, stage: &'static str) {
        self.dropped_count += 1;
        metrics::counter!(m::RECORDS_DROPPED_TOTAL, m::LABEL_STAGE => stage).increment(1);
    }

    /// sink를 추가합니다. 같은 이름의 sink가 있으면 실패합니다.
    pub fn add_sink(&mut self, sink: impl Sink + 'static) -> Result<(), PipelineError> {
        self.register(Box::new(sink))
    }

    /// sink를 엔진 배치 설정으로 감싸 추가합니다.
    pub fn add_batched_sink(&mut self, sink: impl Sink + 'static) -> Result<(), PipelineError> {
        let batched = BatchingSink::new(sink, self.config.batch)?
            .with_diagnostics(self.diagnostics.clone());
        self.register(Box::new(batched))
    }

    fn register(&mut self, sink: Box<dyn Sink>) -> Result<(), PipelineError> {
        if self.state == EngineState::Closed {
            return Err(PipelineError::Closed);
        }
        let name = sink.name().to_owned();
        if name.is_empty() {
            return Err(PipelineError::config("sink.name", "must not be empty"));
        }
        if self.sinks.iter().any(|w| w.name() == name) {
            return Err(PipelineError::DuplicateSink(name));
        }
        let worker = SinkWorker::spawn(
            &self.runtime,
            sink,
            self.config.sink_queue_capacity,
            self.diagnostics.clone(),
        );
        self.sinks.push(worker);
        tracing::info!(sink = %name, total = self.sinks.len(), "sink registered");
        Ok(())
    }

    /// sink를 제거합니다. 대기 중인 레코드를 전송한 뒤 sink를 닫습니다.
    pub async fn remove_sink(&mut self, name: &str) -> Result<(), PipelineError> {
        let Some(position) = self.sinks.iter().position(|w| w.name() == name) else {
            return Err(PipelineError::UnknownSink(name.to_owned()));
        };
        let worker = self.sinks.remove(position);
        let result = worker.request_close().await.wait().await;
        worker.join().await;
        tracing::info!(sink = %name, "sink removed");

        result.map_err(|error| {
            PipelineError::SinkFailures(vec![SinkFailure {
                sink: name.to_owned(),
                error,
            }])
        })
    }

    /// 모든 sink를 flush 합니다.
    ///
    /// 모든 요청을 먼저 보낸 뒤 응답을 기다리며, 실패는 하나의 에러로 모읍니다.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        if self.state == EngineState::Closed {
            return Err(PipelineError::Closed);
        }
        let mut pending = Vec::with_capacity(self.sinks.len());
        for worker in &self.sinks {
            pending.push(worker.request_flush().await);
        }
        let result = collect_failures(pending).await;
        tracing::debug!(sinks = self.sinks.len(), ok = result.is_ok(), "pipeline flushed");
        result
    }

    /// 엔진을 닫습니다.
    ///
    /// 큐에 남은 레코드를 전송하고 모든 sink를 닫은 뒤 작업 태스크를 정리합니다.
    /// 이후의 `emit`은 `false`를 반환합니다. 두 번째 호출은 아무 일도 하지 않습니다.
    pub async fn close(&mut self) -> Result<(), PipelineError> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        self.state = EngineState::Closed;
        tracing::info!(sinks = self.sinks.len(), "closing pipeline");

        let workers = std::mem::take(&mut self.sinks);
        let mut pending = Vec::with_capacity(workers.len());
        for worker in &workers {
            pending.push(worker.request_close().await);
        }
        let result = collect_failures(pending).await;
        for worker in workers {
            worker.join().await;
        }

        tracing::info!(
            emitted = self.emitted_count,
            dropped = self.dropped_count,
            "pipeline closed"
        );
        result
    }

    /// 진단 핸들
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// 진단 이벤트를 구독합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.diagnostics.subscribe()
    }

    /// 엔진 시계
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 설정
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// fan-out 된 레코드 수
    pub fn emitted_count(&self) -> u64 {
        self.emitted_count
    }

    /// 레벨 필터, 미들웨어, 스테이지 실패로 드롭된 레코드 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// 등록 순서대로 sink 이름을 반환합니다.
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|w| w.name()).collect()
    }

    /// 등록 순서대로 스테이지 이름을 반환합니다.
    pub fn stage_names(&self) -> Vec<&str> {
        self.chain.stage_names()
    }

    /// 엔진이 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.state == EngineState::Closed
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Running => "running",
            EngineState::Closed => "closed",
        }
    }
}

async fn collect_failures(pending: Vec<PendingAck>) -> Result<(), PipelineError> {
    let mut failures = Vec::new();
    for ack in pending {
        let sink = ack.sink.clone();
        if let Err(error) = ack.wait().await {
            failures.push(SinkFailure { sink, error });
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SinkFailures(failures))
    }
}

fn apply_stack_policy(record: &mut LogRecord, policy: StackTracePolicy) {
    let level = record.level();
    if let Some(error) = record.error.as_mut()
        && !policy.keeps_stack(level)
    {
        error.stack = None;
    }
}

/// 등록 대기 중인 sink
enum PendingSink {
    Plain(Box<dyn Sink>),
    Batched(Box<dyn Sink>),
}

/// 파이프라인 엔진 빌더
///
/// 체인 순서: 사용자 미들웨어 -> 알림 -> 샘플링 -> 마스킹.
pub struct PipelineEngineBuilder {
    config: PipelineConfig,
    clock: Option<Arc<dyn Clock>>,
    runtime: Option<Handle>,
    diagnostics: Option<Diagnostics>,
    middleware: Vec<Box<dyn Middleware>>,
    alert_rules: Vec<AlertRule>,
    sinks: Vec<PendingSink>,
}

impl PipelineEngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            clock: None,
            runtime: None,
            diagnostics: None,
            middleware: Vec::new(),
            alert_rules: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 시계를 지정합니다. 기본값은 [`SystemClock`]입니다.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// sink 작업 태스크와 알림 핸들러를 실행할 런타임을 지정합니다.
    ///
    /// 지정하지 않으면 `build()` 시점의 현재 런타임을 사용합니다.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 진단 채널을 지정합니다.
    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// 미들웨어를 추가합니다.
    pub fn middleware(mut self, stage: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(stage));
        self
    }

    /// 알림 규칙을 추가합니다.
    pub fn alert_rule(mut self, rule: AlertRule) -> Self {
        self.alert_rules.push(rule);
        self
    }

    /// sink를 추가합니다.
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(PendingSink::Plain(Box::new(sink)));
        self
    }

    /// 배치 래퍼로 감싼 sink를 추가합니다.
    pub fn batched_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(PendingSink::Batched(Box::new(sink)));
        self
    }

    /// 엔진을 빌드합니다.
    ///
    /// 런타임을 지정하지 않았다면 tokio 런타임 안에서 호출해야 합니다.
    pub fn build(self) -> Result<PipelineEngine, PipelineError> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| PipelineError::Runtime(e.to_string()))?,
        };
        let diagnostics = self.diagnostics.unwrap_or_default();

        let mut chain = Chain::new();
        for stage in self.middleware {
            chain.push_boxed(stage);
        }
        if !self.alert_rules.is_empty() {
            chain.push(ThresholdAlerter::with_rules(self.alert_rules)?);
        }
        if let Some(sampling) = self.config.sampling {
            chain.push(RateLimiter::new(sampling)?);
        }
        if !self.config.redact_paths.is_empty() {
            chain.push(Redactor::new(&self.config.redact_paths)?);
        }

        let mut engine = PipelineEngine {
            ctx: StageContext::with_runtime(diagnostics.clone(), runtime.clone()),
            config: self.config,
            state: EngineState::Running,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            chain,
            diagnostics,
            runtime,
            sinks: Vec::new(),
            emitted_count: 0,
            dropped_count: 0,
        };

        for pending in self.sinks {
            match pending {
                PendingSink::Plain(sink) => engine.register(sink)?,
                PendingSink::Batched(sink) => engine.add_batched_sink(sink)?,
            }
        }

        tracing::info!(
            min_level = %engine.config.min_level,
            stages = ?engine.chain.stage_names(),
            sinks = ?engine.sink_names(),
            "pipeline engine built"
        );
        Ok(engine)
    }
}

impl Default for PipelineEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
